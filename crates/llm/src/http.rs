use futures::StreamExt;
use reqwest::Client;
use snafu::{ResultExt, ensure};
use tokio_util::sync::CancellationToken;

use super::transport::{
    BoxFuture, BuildClientSnafu, CompletionTransport, EndpointConfig, InterruptedSnafu,
    MissingApiKeySnafu, ReadBodySnafu, SendRequestSnafu, TransportResponse, TransportResult,
};
use super::wire::ChatCompletionRequest;

/// `reqwest`-backed transport posting to an OpenAI-compatible chat-completions URL.
pub struct HttpTransport {
    client: Client,
    config: EndpointConfig,
}

impl HttpTransport {
    pub fn new(config: EndpointConfig) -> TransportResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "http-transport-new",
                endpoint: config.endpoint.clone(),
            }
        );

        let client = Client::builder().build().context(BuildClientSnafu {
            stage: "build-client",
        })?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn exchange(
        &self,
        request: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> TransportResult<TransportResponse> {
        let pending = self
            .client
            .post(self.config.endpoint.as_str())
            .bearer_auth(self.config.api_key.as_str())
            .json(request)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Dropping `pending` here closes the connection instead of letting it finish.
                return InterruptedSnafu { stage: "send-request" }.fail();
            }
            response = pending => response.context(SendRequestSnafu {
                stage: "send-request",
            })?,
        };

        let status = response.status().as_u16();
        let mut chunks = response.bytes_stream();
        let mut body = Vec::new();

        loop {
            let next_chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return InterruptedSnafu { stage: "read-body" }.fail();
                }
                next_chunk = chunks.next() => next_chunk,
            };

            match next_chunk {
                Some(chunk) => {
                    let chunk = chunk.context(ReadBodySnafu { stage: "read-body" })?;
                    body.extend_from_slice(&chunk);
                }
                None => break,
            }
        }

        tracing::debug!(
            endpoint = %self.config.endpoint,
            status,
            body_len = body.len(),
            "completion exchange finished"
        );

        Ok(TransportResponse::new(
            status,
            String::from_utf8_lossy(&body).into_owned(),
        ))
    }
}

impl CompletionTransport for HttpTransport {
    fn post<'a>(
        &'a self,
        request: &'a ChatCompletionRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>> {
        Box::pin(self.exchange(request, cancel))
    }
}
