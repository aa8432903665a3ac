//! In-memory task index backed by the durable task store.
//!
//! The map held here is authoritative for the running process. The store
//! is its restart log: creation is written before the task becomes
//! visible, and every later patch is written after it has been applied in
//! memory. A failed write is logged and otherwise ignored, so the two views
//! may diverge until restart.
//!
//! Every task has exactly one writer (its dispatcher unit), which keeps
//! the store's per-task write order identical to the in-memory order even
//! though persistence runs outside the lock.

use std::collections::HashMap;
use std::sync::Arc;

use batchgen_core::error::CoreError;
use batchgen_core::task::{Task, TaskPatch};
use batchgen_core::types::TaskId;
use batchgen_db::repositories::TaskRepo;
use batchgen_db::DbPool;
use batchgen_events::NotificationHub;
use chrono::Utc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Illegal task update: {0}")]
    IllegalTransition(String),
}

pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Task>>,
    pool: DbPool,
    hub: Arc<NotificationHub>,
}

impl TaskRegistry {
    pub fn new(pool: DbPool, hub: Arc<NotificationHub>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            pool,
            hub,
        }
    }

    /// Seed the index with the `limit` most recent stored tasks.
    ///
    /// Tasks left `Pending` or `Running` by a previous process are loaded
    /// as they were; they are not resumed.
    pub async fn warm_load(&self, limit: i64) -> Result<usize, sqlx::Error> {
        let recent = TaskRepo::load_recent(&self.pool, limit).await?;
        let count = recent.len();
        let mut tasks = self.tasks.write().await;
        for task in recent {
            tasks.entry(task.id).or_insert(task);
        }
        tracing::info!(count, "Loaded task history");
        Ok(count)
    }

    /// Create a `Pending` task and return its id.
    pub async fn create(
        &self,
        request_snapshot: serde_json::Value,
        batch_label: Option<String>,
    ) -> TaskId {
        let task = Task::new_pending(uuid::Uuid::new_v4(), request_snapshot, batch_label, Utc::now());
        let id = task.id;

        if let Err(e) = TaskRepo::insert(&self.pool, &task).await {
            tracing::error!(task_id = %id, error = %e, "Persistence fault: task insert failed");
        }

        self.tasks.write().await.insert(id, task.clone());
        tracing::info!(task_id = %id, batch_label = ?task.batch_label, "Task created");
        self.hub.broadcast(&task).await;
        id
    }

    /// Apply `patch` to a task and return the resulting record.
    ///
    /// A patch that changes nothing is neither persisted nor broadcast.
    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, RegistryError> {
        let (task, applied) = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
            let applied = task.apply(patch, Utc::now()).map_err(|e| match e {
                CoreError::Conflict(msg) => RegistryError::IllegalTransition(msg),
                other => RegistryError::IllegalTransition(other.to_string()),
            })?;
            (task.clone(), applied)
        };

        if applied.is_empty() {
            return Ok(task);
        }

        match TaskRepo::update(&self.pool, id, &applied).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(task_id = %id, "Persistence fault: task row missing from store")
            }
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "Persistence fault: task update failed")
            }
        }

        self.hub.broadcast(&task).await;
        Ok(task)
    }

    pub async fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Snapshot of every task, in no particular order.
    pub async fn list(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Number of tasks not yet in a terminal state.
    pub async fn active_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| !t.is_terminal())
            .count()
    }

    pub async fn total_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }
}
