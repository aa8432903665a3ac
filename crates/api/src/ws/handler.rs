use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use batchgen_events::NotificationHub;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;

/// Interval between server pings on an idle connection.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Manage a single WebSocket connection after upgrade.
///
/// A sender task forwards hub messages and heartbeat pings to the sink;
/// the current task drains inbound frames until the peer goes away.
async fn handle_socket(socket: WebSocket, hub: Arc<NotificationHub>) {
    let mut subscription = hub.subscribe().await;
    let sub_id = subscription.id;
    tracing::info!(subscriber_id = %sub_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
            HEARTBEAT_INTERVAL,
        );
        loop {
            tokio::select! {
                msg = subscription.recv() => {
                    let Some(text) = msg else {
                        // Hub closed this subscriber (shutdown).
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        tracing::debug!(subscriber_id = %sub_id, "WebSocket sink closed");
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(subscriber_id = %sub_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(subscriber_id = %sub_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    hub.unsubscribe(sub_id).await;
    send_task.abort();
    tracing::info!(subscriber_id = %sub_id, "WebSocket disconnected");
}
