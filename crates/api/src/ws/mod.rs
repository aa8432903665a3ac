//! WebSocket push of task updates.
//!
//! Each connection is one [`NotificationHub`](batchgen_events::NotificationHub)
//! subscriber. Inbound text is ignored; the stream is push-only.

mod handler;

pub use handler::{ws_handler, HEARTBEAT_INTERVAL};
