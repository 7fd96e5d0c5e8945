//! WebSocket handler for live reload.
//!
//! Each connection holds one bus subscription and forwards its messages as text
//! frames until either side goes away.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;

use crate::state::AppState;

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    // Dropping the subscription on exit deregisters it
    let mut subscription = state.bus.subscribe();

    loop {
        tokio::select! {
            // Forward bus messages to the client
            message = subscription.recv() => {
                let Some(message) = message else { break };
                if socket.send(Message::Text(message.as_str().into())).await.is_err() {
                    break;
                }
            }
            // Handle client messages (for keepalive)
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(id = subscription.id(), "Live reload connection closed");
}
