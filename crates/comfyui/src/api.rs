//! REST client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, history polling, output download, input
//! upload and the liveness probe using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::{BackendClient, BackendError};
use crate::outputs::OutputRef;

/// Timeout for the `/system_stats` liveness probe.
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i32,
}

/// Response returned by `/upload/image`.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    name: Option<String>,
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`], e.g.
    /// one built with a per-call timeout.
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Submit a workflow for execution via `POST /prompt`.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<SubmitResponse, BackendError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json::<SubmitResponse>().await?)
    }

    /// Retrieve execution history via `GET /history/{prompt_id}`.
    ///
    /// A non-2xx answer is treated as "no history yet" and yields an empty
    /// object.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, BackendError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!(prompt_id, status = response.status().as_u16(), "History not available yet");
            return Ok(serde_json::Value::Object(Default::default()));
        }
        Ok(response.json().await?)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or [`BackendError::Rejected`]
    /// with the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl BackendClient for ComfyUIApi {
    async fn submit(&self, graph: &serde_json::Value) -> Result<String, BackendError> {
        let submitted = self.submit_workflow(graph).await?;
        tracing::debug!(prompt_id = %submitted.prompt_id, queue_position = submitted.number, "Workflow queued");
        Ok(submitted.prompt_id)
    }

    async fn poll(&self, handle: &str) -> Result<Option<serde_json::Value>, BackendError> {
        let mut history = self.get_history(handle).await?;
        Ok(history.as_object_mut().and_then(|h| h.remove(handle)))
    }

    async fn fetch(&self, output: &OutputRef) -> Result<Vec<u8>, BackendError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", output.filename.as_str()),
                ("subfolder", output.subfolder.as_str()),
                ("type", output.kind.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::ArtifactMissing(format!(
                "{} ({})",
                output.filename,
                response.status().as_u16()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload_asset(&self, bytes: Vec<u8>, name: &str) -> Result<String, BackendError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(mime_for(name))?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let uploaded: UploadResponse = response.json().await?;
        Ok(uploaded.name.unwrap_or_else(|| name.to_string()))
    }

    async fn is_reachable(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/system_stats", self.api_url))
            .timeout(REACHABILITY_TIMEOUT)
            .send()
            .await;
        matches!(result, Ok(r) if r.status().is_success())
    }
}

fn mime_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
