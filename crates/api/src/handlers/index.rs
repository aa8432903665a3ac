use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// GET /
pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "Batch image generation API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "GET  /health",
            "GET  /images/{file}",
            "GET  /api/v1/tasks",
            "POST /api/v1/tasks",
            "POST /api/v1/tasks/batch",
            "GET  /api/v1/tasks/{id}",
            "POST /api/v1/uploads",
            "GET  /api/v1/ws",
        ],
    })
}
