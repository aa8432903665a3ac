pub mod health;
pub mod tasks;
pub mod uploads;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                     WebSocket task updates
///
/// /tasks                  list, create
/// /tasks/batch            create batch
/// /tasks/{id}             get
///
/// /uploads                stage input image
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/tasks", tasks::router())
        .nest("/uploads", uploads::router())
}
