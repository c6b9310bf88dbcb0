use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};

use crate::connection_manager::ConnectionHandle;
use crate::metrics::{ConnectionMetrics, WsMessageMetrics};
use crate::room::{RoomError, SignalKind};
use crate::server::AppState;

use super::message::{ClientMessage, ServerMessage};

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    tracing::debug!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_start = std::time::Instant::now();

    // Create channel for sending messages to this connection
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ServerMessage>(
        state.settings.websocket.send_buffer_size.max(1),
    );
    let handle = state.connection_manager.register(tx);
    let connection_id = handle.id;

    ConnectionMetrics::record_opened();
    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let _ = handle.send(ServerMessage::Connected { connection_id }).await;

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Task for receiving messages from WebSocket
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, or for the server to drop us
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
        _ = handle.closed() => {
            tracing::debug!(connection_id = %connection_id, "Connection closed by server");
        }
    }
    send_task.abort();
    recv_task.abort();

    state.connection_manager.unregister(connection_id);

    if let Err(e) = state.rooms.disconnect(connection_id).await {
        tracing::warn!(connection_id = %connection_id, error = %e, "Failed to release room membership");
    }

    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            let client_msg: ClientMessage = match serde_json::from_str(text.as_str()) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    WsMessageMetrics::record_invalid();
                    let _ = handle
                        .send(ServerMessage::error("INVALID_MESSAGE", e.to_string()))
                        .await;
                    return true;
                }
            };

            match handle_client_message(client_msg, state, handle).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(connection_id = %handle.id, error = %e, "Room service unavailable");
                    let _ = handle.send(ServerMessage::error(e.code(), e.to_string())).await;
                    false
                }
            }
        }
        Message::Binary(_) => {
            let _ = handle
                .send(ServerMessage::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself, we only track liveness
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed client message
#[tracing::instrument(
    name = "ws.message",
    skip(msg, state, handle),
    fields(connection_id = %handle.id, message_type = msg.kind())
)]
async fn handle_client_message(
    msg: ClientMessage,
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) -> Result<(), RoomError> {
    WsMessageMetrics::record(msg.kind());

    match msg {
        ClientMessage::JoinRoom { room_id, profile } => {
            if !is_valid_room_id(&room_id, state.settings.rooms.max_room_id_length) {
                tracing::warn!(connection_id = %handle.id, room_id = %room_id, "Invalid room id");
                let _ = handle
                    .send(ServerMessage::error(
                        "INVALID_ROOM",
                        format!("Invalid room id: {}", room_id),
                    ))
                    .await;
                return Ok(());
            }
            state.rooms.join(handle.id, room_id, profile).await
        }
        ClientMessage::LeaveRoom => state.rooms.leave(handle.id).await,
        ClientMessage::ChatMessage { room_id, message } => {
            state.rooms.chat(handle.id, room_id, message).await
        }
        ClientMessage::Offer { target, payload } => {
            state.rooms.signal(SignalKind::Offer, handle.id, target, payload).await
        }
        ClientMessage::Answer { target, payload } => {
            state.rooms.signal(SignalKind::Answer, handle.id, target, payload).await
        }
        ClientMessage::IceCandidate { target, payload } => {
            state
                .rooms
                .signal(SignalKind::IceCandidate, handle.id, target, payload)
                .await
        }
        ClientMessage::MediaToggle {
            room_id,
            kind,
            enabled,
        } => state.rooms.media_toggle(handle.id, room_id, kind, enabled).await,
        ClientMessage::Ping => {
            let _ = handle.send(ServerMessage::Pong).await;
            Ok(())
        }
    }
}

/// Validate a client-supplied room id
fn is_valid_room_id(room_id: &str, max_len: usize) -> bool {
    if room_id.is_empty() || room_id.len() > max_len {
        return false;
    }

    // Only allow alphanumeric, dash, underscore, and dot
    room_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}
