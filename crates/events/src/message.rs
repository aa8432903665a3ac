use batchgen_core::task::Task;
use batchgen_core::task_events::MSG_TYPE_TASK_UPDATE;
use serde::{Deserialize, Serialize};

/// Envelope pushed to subscribers on every task change.
///
/// Serializes as `{"type": "task_update", "data": <task>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdateMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub data: Task,
}

impl TaskUpdateMessage {
    pub fn new(task: Task) -> Self {
        Self {
            msg_type: MSG_TYPE_TASK_UPDATE.to_string(),
            data: task,
        }
    }
}
