//! Task model and lifecycle rules.
//!
//! A [`Task`] moves forward only: `Pending -> Running -> {Completed, Failed}`.
//! Every mutation goes through [`Task::apply`], which enforces the lifecycle
//! and the field invariants tied to it:
//!
//! - `completed_at` is set exactly when the status becomes terminal.
//! - `artifacts` / `primary_artifact` are populated only on `Completed`.
//! - `error` is populated only on `Failed`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{TaskId, Timestamp};

/// Message recorded on a freshly created task.
pub const MSG_TASK_CREATED: &str = "Task created";

/// Error recorded when a task fails without a more specific cause.
pub const UNKNOWN_FAILURE: &str = "Unknown error";

/// Upper bound of the progress scale.
pub const PROGRESS_MAX: f64 = 100.0;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Lowercase name, as stored in the `tasks.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    /// Whether a task in `self` may move to `next`.
    ///
    /// Staying in the same non-terminal status is allowed (progress
    /// updates); skipping forward (e.g. `Pending -> Failed`) is allowed;
    /// moving backwards or leaving a terminal status is not.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown task status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One tracked unit of generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    /// 0-100, non-decreasing while the task is not terminal.
    pub progress: f64,
    /// Short description of the current step.
    pub message: String,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    /// First entry of `artifacts`, kept for single-result clients.
    pub primary_artifact: Option<String>,
    /// Artifact references in generation order.
    pub artifacts: Vec<String>,
    pub error: Option<String>,
    /// Immutable copy of the request that created the task.
    pub request_snapshot: serde_json::Value,
    pub batch_label: Option<String>,
}

impl Task {
    /// Build a new `Pending` task.
    pub fn new_pending(
        id: TaskId,
        request_snapshot: serde_json::Value,
        batch_label: Option<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            progress: 0.0,
            message: MSG_TASK_CREATED.to_string(),
            created_at,
            completed_at: None,
            primary_artifact: None,
            artifacts: Vec::new(),
            error: None,
            request_snapshot,
            batch_label,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a patch, enforcing the lifecycle rules.
    ///
    /// On success returns the *effective* patch: only the fields that
    /// actually changed, with `completed_at` filled in when the task became
    /// terminal. That is the patch the durable store should receive.
    ///
    /// On error the task is left untouched.
    pub fn apply(&mut self, patch: TaskPatch, now: Timestamp) -> Result<TaskPatch, CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Task {} is already {} and cannot change",
                self.id, self.status
            )));
        }

        let next = patch.status.unwrap_or(self.status);
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Task {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        let artifacts = match next {
            TaskStatus::Completed => match patch.artifacts {
                Some(list) if !list.is_empty() => Some(list),
                _ => {
                    return Err(CoreError::Conflict(format!(
                        "Task {} cannot complete without artifacts",
                        self.id
                    )))
                }
            },
            _ => None,
        };

        let mut applied = TaskPatch::default();

        if next != self.status {
            self.status = next;
            applied.status = Some(next);
        }

        if let Some(progress) = patch.progress {
            let mut progress = progress.clamp(0.0, PROGRESS_MAX);
            if !next.is_terminal() {
                progress = progress.max(self.progress);
            }
            if progress != self.progress {
                self.progress = progress;
                applied.progress = Some(progress);
            }
        }

        if let Some(message) = patch.message.filter(|m| !m.is_empty()) {
            if message != self.message {
                self.message = message.clone();
                applied.message = Some(message);
            }
        }

        if let Some(list) = artifacts {
            let primary = patch
                .primary_artifact
                .filter(|p| list.contains(p))
                .or_else(|| list.first().cloned());
            self.primary_artifact = primary.clone();
            self.artifacts = list.clone();
            applied.primary_artifact = primary;
            applied.artifacts = Some(list);
        }

        if next == TaskStatus::Failed {
            let error = patch
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_FAILURE.to_string());
            self.error = Some(error.clone());
            applied.error = Some(error);
        }

        if next.is_terminal() {
            self.completed_at = Some(now);
            applied.completed_at = Some(now);
        }

        Ok(applied)
    }
}

// ---------------------------------------------------------------------------
// TaskPatch
// ---------------------------------------------------------------------------

/// A partial update to a [`Task`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub primary_artifact: Option<String>,
    pub artifacts: Option<Vec<String>>,
    pub error: Option<String>,
    /// Computed by [`Task::apply`]; callers never set it.
    pub completed_at: Option<Timestamp>,
}

impl TaskPatch {
    /// Progress update without a status change.
    pub fn progress(progress: f64, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Move the task to `Running` with the given progress.
    pub fn running(progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Running),
            ..Self::progress(progress, message)
        }
    }

    /// Terminal success with the saved artifacts, in generation order.
    pub fn completed(artifacts: Vec<String>) -> Self {
        let message = match artifacts.len() {
            1 => "Generation complete (1 image)".to_string(),
            n => format!("Generation complete ({n} images)"),
        };
        Self {
            status: Some(TaskStatus::Completed),
            progress: Some(PROGRESS_MAX),
            message: Some(message),
            primary_artifact: artifacts.first().cloned(),
            artifacts: Some(artifacts),
            ..Default::default()
        }
    }

    /// Terminal failure with a descriptive cause.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            message: Some("Generation failed".to_string()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
