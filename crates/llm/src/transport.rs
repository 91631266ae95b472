use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio_util::sync::CancellationToken;

use crate::wire::ChatCompletionRequest;

/// Where completion requests are posted and which bearer credential they carry.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl EndpointConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
        }
    }
}

// The credential must never end up in logs.
impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EndpointConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Raw status and body of one completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("missing API key for endpoint '{endpoint}'"))]
    MissingApiKey {
        stage: &'static str,
        endpoint: String,
    },
    #[snafu(display("failed to build http client on `{stage}`, {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request failed on `{stage}`, {source}"))]
    SendRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read response body on `{stage}`, {source}"))]
    ReadBody {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request was interrupted on `{stage}`"))]
    Interrupted { stage: &'static str },
}

/// Network boundary for chat completions.
///
/// Implementations should stop touching the network once `cancel` fires; callers
/// additionally drop the returned future, which abandons any in-flight IO.
pub trait CompletionTransport: Send + Sync {
    fn post<'a>(
        &'a self,
        request: &'a ChatCompletionRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>>;
}
