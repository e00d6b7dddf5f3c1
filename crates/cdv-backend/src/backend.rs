//! The backend seam shared by the HTTP client and the mock.

use cdv_protocol::{ChatRequest, StreamEvent};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error: {0}")]
    Api(String),
    #[error("no API key configured for the hosted backend")]
    MissingApiKey,
}

/// A chat completion service.
///
/// Object safe so the session can hold whichever backend is active behind
/// an `Arc<dyn ChatBackend>` and swap it without touching history.
pub trait ChatBackend: Send + Sync {
    /// Single request, single full-text response.
    fn complete<'a>(&'a self, request: &'a ChatRequest)
        -> BoxFuture<'a, Result<String, BackendError>>;

    /// Ordered text chunks ending in `Done` or `Error`.
    fn stream(&self, request: &ChatRequest) -> BoxStream<'static, StreamEvent>;
}
