//! HTTP error mapping.
//!
//! Handlers return [`AppResult`]; every failure leaves the server as
//! `{"error": <message>, "code": <CODE>}` with a matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use batchgen_core::error::CoreError;
use batchgen_pipeline::StorageError;
use serde_json::json;

/// Message shown in place of any 500 detail.
const SANITISED_MESSAGE: &str = "An internal error occurred";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed transport input (multipart framing, missing parts).
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidName(name) => {
                AppError::Core(CoreError::Validation(format!("Invalid file name '{name}'")))
            }
            other => AppError::InternalError(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Status, machine-readable code and client-facing message.
    ///
    /// Server-side faults are logged here with their detail and reported
    /// to the client with [`SANITISED_MESSAGE`].
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Core(CoreError::NotFound { entity, id }) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity} with id {id} not found"),
            ),
            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Core(CoreError::Conflict(msg)) => {
                (StatusCode::CONFLICT, "CONFLICT", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Core(CoreError::Internal(detail)) | AppError::InternalError(detail) => {
                tracing::error!(error = %detail, "Request failed with internal error");
                sanitised()
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "Request failed with database error");
                sanitised()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.classify();
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

fn sanitised() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        SANITISED_MESSAGE.to_string(),
    )
}
