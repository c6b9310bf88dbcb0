//! Room membership value types

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier of one transport session
pub type ConnectionId = Uuid;

/// Maximum number of members a single room admits
pub const ROOM_CAPACITY: usize = 10;

/// User metadata attached to a connection while it is a room member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// A room member as reported to other clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub connection_id: ConnectionId,
    pub profile: Profile,
}

/// Peer negotiation message kinds relayed point-to-point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice_candidate",
        }
    }
}

/// Media tracks a peer can toggle on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Screen,
}

/// Result of removing a connection from its room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub room_id: String,
    pub profile: Profile,
    /// True when the removal left the room empty and its entry was dropped
    pub room_closed: bool,
}

/// Successful join admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room_id: String,
    /// Members already present at the moment of admission
    pub existing_members: usize,
    /// Room the connection was implicitly removed from, if any
    pub previous_room: Option<String>,
}

/// Point-in-time view of one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub member_count: usize,
    pub capacity: usize,
}

/// Aggregate room statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub total_rooms: usize,
    pub total_members: usize,
    pub rooms: Vec<RoomSummary>,
}

/// Errors produced by room operations. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room {room_id} is full ({capacity} members)")]
    CapacityExceeded { room_id: String, capacity: usize },

    #[error("Connection {connection_id} is not a member of any room")]
    MembershipNotFound { connection_id: ConnectionId },

    #[error("Room service is not running")]
    ServiceUnavailable,
}

impl RoomError {
    /// Stable error code used on the wire and in API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "ROOM_FULL",
            Self::MembershipNotFound { .. } => "NOT_IN_ROOM",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}
