//! Room membership and fan-out engine.
//!
//! - `registry`: connection -> room/profile bookkeeping
//! - `broadcaster`: join/leave state machine and recipient selection
//! - `service`: single task that owns the broadcaster and serialises events

mod broadcaster;
mod registry;
mod service;
mod types;

pub use broadcaster::{Delivery, RoomBroadcaster, Transport};
pub use registry::{Recipients, RoomRegistry};
pub use service::{spawn_room_service, RoomCommand, RoomHandle, RoomService};
pub use types::{
    ConnectionId, JoinOutcome, MediaKind, Member, Profile, Removal, RoomError, RoomStats,
    RoomSummary, SignalKind, ROOM_CAPACITY,
};
