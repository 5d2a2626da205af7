//! WebSocket endpoint
//!
//! One task per connection reads client frames and drives the orchestrator
//! inline, so turns on a connection run strictly in arrival order. A
//! separate writer task drains the outbound channel into the socket; when
//! the socket dies the writer exits, the channel closes, and the
//! orchestrator sees its next send fail.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use sdk::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use super::AppState;

/// Conversation used by the bare `/ws` endpoint
pub const DEFAULT_CONVERSATION: &str = "default";

const OUTBOUND_BUFFER: usize = 256;

pub async fn default_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, DEFAULT_CONVERSATION.to_string()))
}

pub async fn conversation_handler(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, conversation_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, conversation_id: String) {
    let connection_id = Uuid::new_v4();
    let span = tracing::info_span!("ws", %connection_id, conversation_id = %conversation_id);

    async move {
        tracing::info!("WebSocket connection established");

        // Conversations are created on first connection
        state
            .orchestrator
            .store()
            .get_or_create(&conversation_id)
            .await;

        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

        let writer = tokio::spawn(
            async move {
                while let Some(event) = rx.recv().await {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        tracing::debug!("Socket closed while sending");
                        break;
                    }
                }
            }
            .in_current_span(),
        );

        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    tracing::debug!("Received frame: {}", text);
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            state
                                .orchestrator
                                .handle_client_event(&conversation_id, event, &tx)
                                .await;
                        }
                        Err(e) => {
                            tracing::warn!("Rejected client frame: {}", e);
                            let reply = ServerEvent::error(format!("Invalid message format: {}", e));
                            if tx.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break;
                }
            }

            if tx.is_closed() {
                break;
            }
        }

        drop(tx);
        if let Err(e) = writer.await {
            tracing::error!("Writer task failed: {}", e);
        }

        tracing::info!("WebSocket connection ended");
    }
    .instrument(span)
    .await
}
