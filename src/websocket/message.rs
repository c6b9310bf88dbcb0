use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::room::{ConnectionId, MediaKind, Member, Profile, SignalKind};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    JoinRoom { room_id: String, profile: Profile },
    LeaveRoom,
    ChatMessage { room_id: String, message: Value },
    Offer { target: ConnectionId, payload: Value },
    Answer { target: ConnectionId, payload: Value },
    IceCandidate { target: ConnectionId, payload: Value },
    MediaToggle { room_id: String, kind: MediaKind, enabled: bool },
    Ping,
}

impl ClientMessage {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::ChatMessage { .. } => "chat_message",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::MediaToggle { .. } => "media_toggle",
            Self::Ping => "ping",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First frame on every socket, tells the client its own id
    Connected { connection_id: ConnectionId },
    RoomFull { room_id: String, capacity: usize },
    ExistingUsers { users: Vec<Member> },
    UserJoined { connection_id: ConnectionId, profile: Profile },
    ChatMessage { message: Value },
    Signal { kind: SignalKind, from: ConnectionId, payload: Value },
    PeerMediaToggle { connection_id: ConnectionId, kind: MediaKind, enabled: bool },
    UserLeft { connection_id: ConnectionId, profile: Profile },
    Pong,
    Heartbeat,
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
