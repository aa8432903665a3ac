use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::uploads;
use crate::state::AppState;

/// Largest accepted input image.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(uploads::upload_input))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
