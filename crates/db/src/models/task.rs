//! Row model for the `tasks` table.

use batchgen_core::error::CoreError;
use batchgen_core::task::{Task, TaskStatus};
use batchgen_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `tasks` table, as stored.
///
/// JSON-bearing columns (`artifacts`, `request_snapshot`) are kept as text
/// here and decoded in the [`Task`] conversion so that a malformed value
/// degrades one field instead of failing the whole load.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: String,
    pub status: String,
    pub progress: f64,
    pub message: String,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub primary_artifact: Option<String>,
    pub artifacts: Option<String>,
    pub error: Option<String>,
    pub request_snapshot: String,
    pub batch_label: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = uuid::Uuid::parse_str(&row.id)
            .map_err(|e| CoreError::Validation(format!("Invalid task id '{}': {e}", row.id)))?;
        let status: TaskStatus = row.status.parse()?;

        let artifacts = match row.artifacts.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|e| {
                tracing::warn!(task_id = %id, error = %e, "Unreadable artifacts column");
                Vec::new()
            }),
        };

        let request_snapshot = serde_json::from_str(&row.request_snapshot).unwrap_or_else(|e| {
            tracing::warn!(task_id = %id, error = %e, "Unreadable request snapshot column");
            serde_json::Value::Null
        });

        Ok(Task {
            id,
            status,
            progress: row.progress,
            message: row.message,
            created_at: row.created_at,
            completed_at: row.completed_at,
            primary_artifact: row.primary_artifact,
            artifacts,
            error: row.error,
            request_snapshot,
            batch_label: row.batch_label,
        })
    }
}
