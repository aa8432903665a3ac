//! Repository for the `tasks` table.
//!
//! Inserts happen once per task; afterwards only the columns named in a
//! [`TaskPatch`] are written, so a patch never clobbers fields it does not
//! carry.

use batchgen_core::task::{Task, TaskPatch};
use batchgen_core::types::TaskId;

use crate::models::task::TaskRow;
use crate::DbPool;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, status, progress, message, created_at, completed_at, \
    primary_artifact, artifacts, error, request_snapshot, batch_label";

/// Provides persistence operations for tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Persist a newly created task.
    pub async fn insert(pool: &DbPool, task: &Task) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        );
        sqlx::query(&query)
            .bind(task.id.to_string())
            .bind(task.status.as_str())
            .bind(task.progress)
            .bind(&task.message)
            .bind(task.created_at)
            .bind(task.completed_at)
            .bind(&task.primary_artifact)
            .bind(encode_artifacts(&task.artifacts))
            .bind(&task.error)
            .bind(task.request_snapshot.to_string())
            .bind(&task.batch_label)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Persist the fields present in `patch`; absent fields are untouched.
    ///
    /// Returns `false` when no row with `id` exists.
    pub async fn update(pool: &DbPool, id: TaskId, patch: &TaskPatch) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET \
                 status = COALESCE(?2, status), \
                 progress = COALESCE(?3, progress), \
                 message = COALESCE(?4, message), \
                 completed_at = COALESCE(?5, completed_at), \
                 primary_artifact = COALESCE(?6, primary_artifact), \
                 artifacts = COALESCE(?7, artifacts), \
                 error = COALESCE(?8, error) \
             WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.progress)
        .bind(&patch.message)
        .bind(patch.completed_at)
        .bind(&patch.primary_artifact)
        .bind(patch.artifacts.as_deref().map(encode_artifacts))
        .bind(&patch.error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &DbPool, id: TaskId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1");
        let row = sqlx::query_as::<_, TaskRow>(&query)
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;
        Ok(row.and_then(decode_row))
    }

    /// Load the `limit` most recently created tasks, newest first.
    ///
    /// Rows that cannot be decoded are logged and skipped.
    pub async fn load_recent(pool: &DbPool, limit: i64) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             ORDER BY created_at DESC \
             LIMIT ?1"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&query)
            .bind(limit.max(0))
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().filter_map(decode_row).collect())
    }

    /// Total number of stored tasks.
    pub async fn count(pool: &DbPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(pool)
            .await
    }
}

fn encode_artifacts(artifacts: &[String]) -> Option<String> {
    if artifacts.is_empty() {
        None
    } else {
        serde_json::to_string(artifacts).ok()
    }
}

fn decode_row(row: TaskRow) -> Option<Task> {
    let id = row.id.clone();
    match Task::try_from(row) {
        Ok(task) => Some(task),
        Err(e) => {
            tracing::warn!(task_id = %id, error = %e, "Skipping undecodable task row");
            None
        }
    }
}
