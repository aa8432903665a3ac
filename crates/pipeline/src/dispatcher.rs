//! Per-task dispatcher units.
//!
//! [`Dispatcher::spawn`] starts one Tokio task per generation task. Each
//! unit waits for an admission permit (at most `max_concurrent_tasks`
//! units talk to the backend at once), then drives its task through:
//!
//! 1. prepare: upload a staged input image, if any
//! 2. build the execution graph
//! 3. submit it
//! 4. poll on a fixed interval within an attempt budget
//! 5. fetch and save every output
//! 6. finalize as `Completed`
//!
//! Any fault, including a panic inside the unit, ends the task as `Failed`
//! with the fault's description. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use batchgen_comfyui::{
    extract_outputs, BackendClient, BackendError, OutputRef, OutputRule, DEFAULT_OUTPUT_RULES,
};
use batchgen_core::naming::{artifact_filename, artifact_url};
use batchgen_core::progress::{
    poll_progress, PROGRESS_BUILDING, PROGRESS_FETCHING, PROGRESS_POLL_START, PROGRESS_PREPARING,
    PROGRESS_SUBMITTING, PROGRESS_UPLOADING,
};
use batchgen_core::request::GenerationRequest;
use batchgen_core::task::TaskPatch;
use batchgen_core::types::TaskId;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::registry::TaskRegistry;
use crate::storage::{ArtifactStore, StorageError};
use crate::workflow::WorkflowBuilder;

/// Default interval between history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default poll budget; with the default interval, five minutes.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 150;

/// Default number of units allowed past admission at once.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub max_concurrent_tasks: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

/// Why a dispatcher unit ended its task as `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Backend unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Backend rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("{0}")]
    ArtifactMissing(String),

    #[error("Generation timeout: no result after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    #[error("Input image not found in staging: {0}")]
    InputAssetMissing(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Workflow build failed: {0}")]
    Workflow(String),

    #[error("Dispatcher unit aborted: {0}")]
    Aborted(String),
}

impl From<BackendError> for DispatchError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unavailable(msg) => DispatchError::UpstreamUnavailable(msg),
            BackendError::Rejected { status, body } => {
                DispatchError::UpstreamRejected(format!("status {status}: {body}"))
            }
            BackendError::ArtifactMissing(msg) => {
                DispatchError::ArtifactMissing(format!("Artifact missing: {msg}"))
            }
            BackendError::InvalidResponse(msg) => {
                DispatchError::UpstreamRejected(format!("invalid response: {msg}"))
            }
        }
    }
}

/// Everything a unit needs, shared by all units.
struct UnitContext {
    registry: Arc<TaskRegistry>,
    backend: Arc<dyn BackendClient>,
    workflow: Arc<dyn WorkflowBuilder>,
    store: Arc<ArtifactStore>,
    output_rules: &'static [OutputRule],
    config: DispatchConfig,
}

/// Spawns and tracks dispatcher units.
pub struct Dispatcher {
    ctx: Arc<UnitContext>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TaskRegistry>,
        backend: Arc<dyn BackendClient>,
        workflow: Arc<dyn WorkflowBuilder>,
        store: Arc<ArtifactStore>,
        config: DispatchConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        Self {
            ctx: Arc::new(UnitContext {
                registry,
                backend,
                workflow,
                store,
                output_rules: DEFAULT_OUTPUT_RULES,
                config,
            }),
            permits,
            tracker: TaskTracker::new(),
        }
    }

    /// Create a task for `request` and start its unit.
    ///
    /// Returns as soon as the task exists; execution may wait for a
    /// permit.
    pub async fn submit(&self, request: GenerationRequest, batch_label: Option<String>) -> TaskId {
        let id = self
            .ctx
            .registry
            .create(request.snapshot(), batch_label)
            .await;
        self.spawn(id, request);
        id
    }

    /// Start the unit for an already created task.
    pub fn spawn(&self, task_id: TaskId, request: GenerationRequest) {
        let ctx = Arc::clone(&self.ctx);
        let permits = Arc::clone(&self.permits);

        self.tracker.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Shutdown closed admission before this unit got in.
                    ctx.fail(
                        task_id,
                        DispatchError::Aborted("shut down before the task was admitted".into()),
                    )
                    .await;
                    return;
                }
            };

            // Run the body in its own task so a panic surfaces as a
            // JoinError here instead of leaving the task Running.
            let body = tokio::spawn({
                let ctx = Arc::clone(&ctx);
                async move { ctx.run(task_id, request).await }
            });

            let outcome = match body.await {
                Ok(outcome) => outcome,
                Err(e) => Err(DispatchError::Aborted(e.to_string())),
            };

            match outcome {
                Ok(count) => tracing::info!(task_id = %task_id, count, "Task completed"),
                Err(e) => ctx.fail(task_id, e).await,
            }
        });
    }

    /// Number of units not yet finished, including those waiting for a
    /// permit.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Close admission and wait up to `grace` for in-flight units.
    ///
    /// Units still waiting for a permit end as `Failed` without touching
    /// the backend; admitted units run on. Returns `true` if every unit
    /// finished within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.permits.close();
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for dispatcher units to finish");
        }
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }
}

impl UnitContext {
    async fn run(&self, id: TaskId, mut request: GenerationRequest) -> Result<usize, DispatchError> {
        self.report(id, TaskPatch::running(PROGRESS_PREPARING, "Preparing input"))
            .await;
        tracing::info!(
            task_id = %id,
            width = request.width,
            height = request.height,
            batch_size = request.batch_size,
            input_image = ?request.input_image,
            "Dispatching task",
        );

        if let Some(name) = request.input_image.clone() {
            self.report(id, TaskPatch::progress(PROGRESS_UPLOADING, "Uploading input image"))
                .await;
            let bytes = self
                .store
                .read_staged(&name)
                .await?
                .ok_or_else(|| DispatchError::InputAssetMissing(name.clone()))?;
            let backend_name = self.backend.upload_asset(bytes, &name).await?;
            tracing::debug!(task_id = %id, staged = %name, backend_name = %backend_name, "Input image uploaded");
            request.input_image = Some(backend_name);
        }

        self.report(id, TaskPatch::progress(PROGRESS_BUILDING, "Building workflow"))
            .await;
        let graph = self
            .workflow
            .build(&request)
            .map_err(|e| DispatchError::Workflow(e.to_string()))?;

        self.report(id, TaskPatch::progress(PROGRESS_SUBMITTING, "Submitting to backend"))
            .await;
        let handle = self.backend.submit(&graph).await?;
        tracing::info!(task_id = %id, prompt_id = %handle, "Workflow submitted");

        self.report(id, TaskPatch::progress(PROGRESS_POLL_START, "Waiting for backend"))
            .await;
        let result = self.wait_for_result(id, &handle).await?;

        self.report(id, TaskPatch::progress(PROGRESS_FETCHING, "Downloading results"))
            .await;
        let (node_id, outputs) = extract_outputs(&result, self.output_rules)
            .map_err(|e| DispatchError::ArtifactMissing(e.to_string()))?;
        tracing::debug!(task_id = %id, node_id, count = outputs.len(), "Outputs located");

        let artifacts = self.save_outputs(id, &outputs).await?;
        let count = artifacts.len();
        self.report(id, TaskPatch::completed(artifacts)).await;
        Ok(count)
    }

    /// Poll until the backend reports a result or the budget runs out.
    async fn wait_for_result(
        &self,
        id: TaskId,
        handle: &str,
    ) -> Result<serde_json::Value, DispatchError> {
        let max_attempts = self.config.max_poll_attempts;
        for attempt in 0..max_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            let progress = poll_progress(attempt, max_attempts);
            self.report(id, TaskPatch::progress(progress, "Generating")).await;
            tracing::debug!(task_id = %id, attempt, progress, "Polling backend");

            if let Some(result) = self.backend.poll(handle).await? {
                return Ok(result);
            }
        }
        Err(DispatchError::Timeout {
            attempts: max_attempts,
        })
    }

    /// Download and save each output in order. Outputs that cannot be
    /// downloaded are skipped; saving none at all is an error.
    async fn save_outputs(
        &self,
        id: TaskId,
        outputs: &[OutputRef],
    ) -> Result<Vec<String>, DispatchError> {
        let mut artifacts = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.iter().enumerate() {
            let bytes = match self.backend.fetch(output).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(task_id = %id, filename = %output.filename, error = %e, "Skipping output that could not be downloaded");
                    continue;
                }
            };
            let filename = artifact_filename(id, &output.filename, index + 1);
            self.store.save_artifact(&filename, &bytes).await?;
            artifacts.push(artifact_url(&filename));
        }

        if artifacts.is_empty() {
            return Err(DispatchError::ArtifactMissing(format!(
                "None of the {} generated images could be downloaded",
                outputs.len()
            )));
        }
        Ok(artifacts)
    }

    /// Apply a patch; a rejected patch is logged and otherwise ignored.
    async fn report(&self, id: TaskId, patch: TaskPatch) {
        if let Err(e) = self.registry.update(id, patch).await {
            tracing::warn!(task_id = %id, error = %e, "Task update rejected");
        }
    }

    async fn fail(&self, id: TaskId, error: DispatchError) {
        tracing::error!(task_id = %id, error = %error, "Task failed");
        self.report(id, TaskPatch::failed(error.to_string())).await;
    }
}
