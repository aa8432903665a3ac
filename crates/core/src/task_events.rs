//! WebSocket message type constants for task push notifications.

/// Full task record pushed after every create or update.
pub const MSG_TYPE_TASK_UPDATE: &str = "task_update";
