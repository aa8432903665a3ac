use std::sync::Arc;

use batchgen_comfyui::BackendClient;
use batchgen_events::NotificationHub;
use batchgen_pipeline::{ArtifactStore, Dispatcher, TaskRegistry};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub pool: batchgen_db::DbPool,
    pub registry: Arc<TaskRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub hub: Arc<NotificationHub>,
    pub backend: Arc<dyn BackendClient>,
    pub store: Arc<ArtifactStore>,
}
