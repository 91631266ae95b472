//! Completion endpoint client: wire types, transport seam and outcome normalization.

mod client;
mod http;
mod model;
mod transport;
pub mod wire;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{
    API_ERROR_TEXT, CompletionClient, CompletionOutcome, NETWORK_ERROR_TEXT, NO_RESPONSE_TEXT,
    RequestToken,
};
pub use http::HttpTransport;
pub use model::{
    CompletionConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE,
};
pub use transport::{
    BoxFuture, CompletionTransport, EndpointConfig, TransportError, TransportResponse,
    TransportResult,
};
pub use wire::ChatCompletionRequest;

/// Builds a client that talks HTTP to `endpoint`.
pub fn create_client(
    endpoint: EndpointConfig,
    config: CompletionConfig,
) -> TransportResult<CompletionClient> {
    let transport = HttpTransport::new(endpoint)?;
    tracing::info!(endpoint = %transport.endpoint(), model = %config.model, "completion client ready");
    Ok(CompletionClient::new(std::sync::Arc::new(transport), config))
}
