//! Input image staging.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use batchgen_core::error::CoreError;
use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Name to pass back as `input_image`.
    pub filename: String,
    pub path: String,
}

/// POST /api/v1/uploads
///
/// Accepts a multipart `file` part whose content type starts with
/// `image/` and stores it in the staging directory under a fresh
/// timestamp-based name.
pub async fn upload_input(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::Core(CoreError::Validation(
                "File must be an image".to_string(),
            )));
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let filename = state
            .store
            .stage_upload(&original_name, &bytes, Utc::now())
            .await?;
        let path = state.store.staging_dir().join(&filename);

        tracing::info!(filename = %filename, size = bytes.len(), "Input image staged");

        return Ok((
            StatusCode::CREATED,
            Json(DataResponse {
                data: UploadResponse {
                    filename,
                    path: path.display().to_string(),
                },
            }),
        ));
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{FILE_FIELD}'"
    )))
}
