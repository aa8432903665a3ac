//! Push notification fan-out for task state changes.
//!
//! - [`NotificationHub`]: registry of live subscribers, each with its own
//!   bounded queue, fed by [`NotificationHub::broadcast`].
//! - [`TaskUpdateMessage`]: the JSON envelope pushed to subscribers.

pub mod hub;
pub mod message;

pub use hub::{NotificationHub, Subscription, SubscriberId};
pub use message::TaskUpdateMessage;
