use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::model::CompletionConfig;
use super::transport::{CompletionTransport, TransportResponse};
use super::wire::{ChatCompletionRequest, ChatCompletionResponse, ErrorEnvelope};

pub const NO_RESPONSE_TEXT: &str = "No response";
pub const API_ERROR_TEXT: &str = "API error";
pub const NETWORK_ERROR_TEXT: &str = "network error";

/// Identifier for one submission cycle.
///
/// A fresh token is minted on every submit so late results from a stopped cycle can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(pub u64);

impl RequestToken {
    /// Wraps a raw sequence number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "req-{}", self.0)
    }
}

/// Normalized result of one completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Success(String),
    Failure(String),
    Cancelled,
}

impl CompletionOutcome {
    /// Maps a finished HTTP exchange onto the reply/error contract of the endpoint.
    pub fn from_response(response: &TransportResponse) -> Self {
        if response.is_success() {
            return match serde_json::from_str::<ChatCompletionResponse>(&response.body) {
                Ok(parsed) => Self::Success(
                    parsed
                        .reply_text()
                        .unwrap_or_else(|| NO_RESPONSE_TEXT.to_string()),
                ),
                Err(error) => {
                    tracing::warn!(
                        status = response.status,
                        error = %error,
                        "completion response body is not valid JSON"
                    );
                    Self::Failure(NETWORK_ERROR_TEXT.to_string())
                }
            };
        }

        let body = match serde_json::from_str::<serde_json::Value>(&response.body) {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(
                    status = response.status,
                    error = %error,
                    "error response body is not valid JSON"
                );
                return Self::Failure(NETWORK_ERROR_TEXT.to_string());
            }
        };

        let message = serde_json::from_value::<ErrorEnvelope>(body)
            .ok()
            .and_then(ErrorEnvelope::message)
            .unwrap_or_else(|| API_ERROR_TEXT.to_string());
        Self::Failure(message)
    }
}

/// Issues one cancellable request per call and normalizes the outcome.
pub struct CompletionClient {
    transport: Arc<dyn CompletionTransport>,
    config: CompletionConfig,
}

impl CompletionClient {
    /// Creates a client that posts through `transport` with fixed sampling parameters.
    pub fn new(transport: Arc<dyn CompletionTransport>, config: CompletionConfig) -> Self {
        Self { transport, config }
    }

    /// Returns the model, system prompt and temperature sent with every request.
    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// Sends `text` and resolves to exactly one outcome.
    ///
    /// Whether a failure counts as cancellation is decided by `cancel` alone: once the
    /// signal has fired the result is `Cancelled` no matter what the transport returned.
    pub async fn send(
        &self,
        text: &str,
        token: RequestToken,
        cancel: &CancellationToken,
    ) -> CompletionOutcome {
        if cancel.is_cancelled() {
            tracing::debug!(%token, "request cancelled before dispatch");
            return CompletionOutcome::Cancelled;
        }

        let request = ChatCompletionRequest::single_turn(&self.config, text);
        tracing::debug!(
            %token,
            model = %request.model,
            text_len = text.len(),
            "dispatching completion request"
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.transport.post(&request, cancel) => Some(result),
        };

        if cancel.is_cancelled() {
            tracing::debug!(%token, "request cancelled; outcome discarded");
            return CompletionOutcome::Cancelled;
        }

        match result {
            Some(Ok(response)) => {
                let outcome = CompletionOutcome::from_response(&response);
                if let CompletionOutcome::Failure(reason) = &outcome {
                    tracing::warn!(
                        %token,
                        status = response.status,
                        reason = %reason,
                        "completion request failed"
                    );
                }
                outcome
            }
            Some(Err(error)) => {
                tracing::warn!(%token, error = %error, "completion transport failed");
                CompletionOutcome::Failure(NETWORK_ERROR_TEXT.to_string())
            }
            // Only reachable through the cancelled branch, which returned above.
            None => CompletionOutcome::Cancelled,
        }
    }
}
