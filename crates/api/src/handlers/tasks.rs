//! Handlers for generation task submission and inspection.
//!
//! Routes:
//! - `GET   /tasks`: list every known task, newest first
//! - `POST  /tasks`: submit one generation request
//! - `POST  /tasks/batch`: submit several requests under one label
//! - `GET   /tasks/{id}`: current view of one task

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use batchgen_core::error::CoreError;
use batchgen_core::request::{
    validate_batch_request, validate_generation_request, BatchRequest, GenerationRequest,
};
use batchgen_core::types::TaskId;
use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Response for a single submission.
#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: TaskId,
    pub message: &'static str,
}

/// Response for a batch submission.
#[derive(Debug, Serialize)]
pub struct SubmitBatchResponse {
    pub batch_name: String,
    pub task_ids: Vec<TaskId>,
    pub message: String,
}

/// GET /api/v1/tasks
pub async fn list_tasks(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let mut tasks = state.registry.list().await;
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(DataResponse { data: tasks }))
}

/// POST /api/v1/tasks
///
/// Validates the request, creates a `Pending` task and starts its
/// dispatcher unit. Returns before any backend call is made.
pub async fn create_task(
    State(state): State<AppState>,
    Json(mut input): Json<GenerationRequest>,
) -> AppResult<impl IntoResponse> {
    validate_generation_request(&input).map_err(AppError::Core)?;

    // The snapshot records the same label the task carries.
    let label = input
        .batch_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    input.batch_name = label.clone();
    let task_id = state.dispatcher.submit(input, label).await;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmitTaskResponse {
                task_id,
                message: "Task submitted",
            },
        }),
    ))
}

/// POST /api/v1/tasks/batch
///
/// Every request is validated before any task is created, so a batch is
/// either accepted whole or rejected whole.
pub async fn create_batch(
    State(state): State<AppState>,
    Json(input): Json<BatchRequest>,
) -> AppResult<impl IntoResponse> {
    validate_batch_request(&input).map_err(AppError::Core)?;

    let label = input.label(Utc::now());
    let mut task_ids = Vec::with_capacity(input.requests.len());
    for mut request in input.requests {
        request.batch_name = Some(label.clone());
        task_ids.push(state.dispatcher.submit(request, Some(label.clone())).await);
    }

    tracing::info!(batch_name = %label, count = task_ids.len(), "Batch submitted");

    let message = format!("Batch of {} tasks submitted", task_ids.len());
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmitBatchResponse {
                batch_name: label,
                task_ids,
                message,
            },
        }),
    ))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let task = state
        .registry
        .get(task_id)
        .await
        .ok_or_else(|| CoreError::NotFound {
            entity: "Task",
            id: task_id.to_string(),
        })?;
    Ok(Json(DataResponse { data: task }))
}
