//! Fan-out of serialized task updates to live subscribers.
//!
//! Every subscriber owns a bounded `tokio::sync::broadcast` channel with a
//! single receiver. When a slow subscriber's queue is full, the oldest
//! pending message is overwritten and the subscriber observes a lag on its
//! next receive; the broadcaster never waits.
//!
//! A send that fails because the receiver is gone removes that subscriber
//! from the active set.

use std::collections::HashMap;

use batchgen_core::task::Task;
use tokio::sync::{broadcast, RwLock};

use crate::message::TaskUpdateMessage;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

pub type SubscriberId = uuid::Uuid;

/// The receiving side handed to a subscriber.
pub struct Subscription {
    pub id: SubscriberId,
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    /// Wait for the next serialized message.
    ///
    /// Messages lost to a full queue are skipped with a warning. Returns
    /// `None` once the hub has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(subscriber_id = %self.id, skipped, "Subscriber lagging, dropped oldest updates");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Registry of live subscribers.
///
/// Thread-safe via interior `RwLock`; shared as `Arc<NotificationHub>`.
pub struct NotificationHub {
    subscribers: RwLock<HashMap<SubscriberId, broadcast::Sender<String>>>,
    buffer: usize,
}

impl NotificationHub {
    /// Create a hub whose subscribers each queue at most `buffer` messages.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a new subscriber. It receives only broadcasts made after
    /// this call returns.
    pub async fn subscribe(&self) -> Subscription {
        let id = uuid::Uuid::new_v4();
        let (tx, rx) = broadcast::channel(self.buffer);
        self.subscribers.write().await.insert(id, tx);
        tracing::debug!(subscriber_id = %id, "Subscriber added");
        Subscription { id, rx }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.write().await.remove(&id).is_some() {
            tracing::debug!(subscriber_id = %id, "Subscriber removed");
        }
    }

    /// Push the full task record to every current subscriber.
    ///
    /// Returns the number of subscribers the message was queued for.
    /// Never fails: serialization problems are logged and dropped.
    pub async fn broadcast(&self, task: &Task) -> usize {
        let payload = match serde_json::to_string(&TaskUpdateMessage::new(task.clone())) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "Failed to serialize task update");
                return 0;
            }
        };
        self.broadcast_raw(payload).await
    }

    /// Push an already serialized message to every current subscriber.
    pub async fn broadcast_raw(&self, payload: String) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subs = self.subscribers.read().await;
            for (id, tx) in subs.iter() {
                match tx.send(payload.clone()) {
                    Ok(_) => delivered += 1,
                    Err(_) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subs = self.subscribers.write().await;
            for id in &closed {
                subs.remove(id);
            }
            tracing::debug!(count = closed.len(), "Pruned closed subscribers");
        }
        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drop every subscriber. Their next receive returns `None`.
    pub async fn close_all(&self) {
        let mut subs = self.subscribers.write().await;
        let count = subs.len();
        subs.clear();
        tracing::info!(count, "Closed all subscribers");
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}
