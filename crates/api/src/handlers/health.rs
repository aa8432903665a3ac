use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health probe payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store or backend is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    pub api_server: &'static str,
    pub comfyui_server: &'static str,
    pub db_healthy: bool,
    pub active_tasks: usize,
    pub total_tasks: usize,
    pub subscribers: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (db, backend_up) = tokio::join!(
        batchgen_db::health_check(&state.pool),
        state.backend.is_reachable()
    );
    let db_healthy = db.is_ok();

    let status = if db_healthy && backend_up {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        api_server: "online",
        comfyui_server: if backend_up { "online" } else { "offline" },
        db_healthy,
        active_tasks: state.registry.active_count().await,
        total_tasks: state.registry.total_count().await,
        subscribers: state.hub.subscriber_count().await,
    })
}
