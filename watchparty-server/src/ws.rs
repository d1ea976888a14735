//! WebSocket peer transport
//!
//! One socket is one peer. A writer task drains the peer's outbox; the
//! reader loop hands parsed events to the hub.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, warn};
use watchparty_core::sync::{HubHandle, PeerConnection, TransportEvent};

use crate::server::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let PeerConnection { peer, mut outbox } = match hub.connect().await {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Rejecting socket: {}", e);
            return;
        }
    };
    let peer_id = peer.id;

    let (mut sender, mut receiver) = socket.split();

    let writer_id = peer_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(peer = %writer_id, "Failed to serialize message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(result) = receiver.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(peer = %peer_id, "WebSocket error: {}", e);
                break;
            }
        };

        match serde_json::from_str::<TransportEvent>(text.as_str()) {
            Ok(event) => {
                if hub.submit(&peer_id, event).is_err() {
                    break;
                }
            }
            Err(e) => debug!(peer = %peer_id, "Ignoring malformed frame: {}", e),
        }
    }

    // Pending relays to this peer are cancelled with it
    let _ = hub.disconnect(&peer_id);
    send_task.abort();
}
