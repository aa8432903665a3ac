use axum::routing::get;
use axum::Router;

use crate::handlers::{health, index};
use crate::state::AppState;

/// Root-level routes (NOT under `/api/v1`): service index and health probe.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index::index))
        .route("/health", get(health::health_check))
}
