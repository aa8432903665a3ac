//! Route definitions for generation tasks.
//!
//! ```text
//! GET    /           list_tasks
//! POST   /           create_task
//! POST   /batch      create_batch
//! GET    /{id}       get_task
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route("/batch", post(tasks::create_batch))
        .route("/{id}", get(tasks::get_task))
}
