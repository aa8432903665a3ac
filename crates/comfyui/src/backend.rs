//! Contract between the dispatcher and a generation backend.

use async_trait::async_trait;

use crate::outputs::OutputRef;

/// Errors a backend call can produce.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached (connect, DNS, timeout).
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered a submission or upload with a non-2xx status.
    #[error("Backend rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The requested output no longer exists on the backend.
    #[error("Artifact missing: {0}")]
    ArtifactMissing(String),

    /// The backend answered with a body we could not interpret.
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::InvalidResponse(e.to_string())
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }
}

/// Adapter to a remote generation service.
///
/// Implementations bound the duration of their own network calls; none of
/// these methods may block indefinitely.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Queue an execution graph. Returns the backend's job handle.
    async fn submit(&self, graph: &serde_json::Value) -> Result<String, BackendError>;

    /// Check a job. `Ok(None)` means "not ready yet"; `Ok(Some(result))`
    /// carries the backend's result payload.
    async fn poll(&self, handle: &str) -> Result<Option<serde_json::Value>, BackendError>;

    /// Download the raw bytes of one output.
    async fn fetch(&self, output: &OutputRef) -> Result<Vec<u8>, BackendError>;

    /// Upload an input asset, overwriting any asset with the same name.
    /// Returns the name the backend stored it under.
    async fn upload_asset(&self, bytes: Vec<u8>, name: &str) -> Result<String, BackendError>;

    /// Cheap liveness probe used by health reporting.
    async fn is_reachable(&self) -> bool;
}
