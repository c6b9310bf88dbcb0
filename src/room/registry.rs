use std::collections::HashMap;

use smallvec::SmallVec;

use super::types::{ConnectionId, Member, Profile, Removal, RoomSummary, ROOM_CAPACITY};

/// Recipient list sized for a full room
pub type Recipients = SmallVec<[ConnectionId; ROOM_CAPACITY]>;

/// Tracks which connections belong to which room
///
/// `rooms` and `memberships` are always updated together: every entry in
/// `memberships` points at a room that contains that connection, and no room
/// entry is ever left empty.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// room_id -> (connection_id -> profile)
    rooms: HashMap<String, HashMap<ConnectionId, Profile>>,
    /// connection_id -> room_id
    memberships: HashMap<ConnectionId, String>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a connection with a room and profile.
    ///
    /// Overwrites any previous profile for the same room. A connection recorded
    /// in a different room is moved out of it first.
    pub fn record(&mut self, connection_id: ConnectionId, room_id: &str, profile: Profile) {
        if self.room_of(connection_id).is_some_and(|current| current != room_id) {
            self.remove(connection_id);
        }

        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id, profile);
        self.memberships.insert(connection_id, room_id.to_string());
    }

    /// Remove a connection from whichever room holds it.
    ///
    /// Returns `None` when the connection is not a member of any room.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Removal> {
        let room_id = self.memberships.remove(&connection_id)?;
        let members = self.rooms.get_mut(&room_id)?;
        let profile = members.remove(&connection_id)?;

        let room_closed = members.is_empty();
        if room_closed {
            self.rooms.remove(&room_id);
        }

        Some(Removal {
            room_id,
            profile,
            room_closed,
        })
    }

    /// Members of `room_id` other than `exclude`; empty if the room is absent
    pub fn list_others(&self, room_id: &str, exclude: ConnectionId) -> Vec<Member> {
        self.rooms
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|(id, _)| **id != exclude)
                    .map(|(id, profile)| Member {
                        connection_id: *id,
                        profile: profile.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All members of a room, or `None` if the room does not exist
    pub fn members(&self, room_id: &str) -> Option<Vec<Member>> {
        self.rooms.get(room_id).map(|members| {
            members
                .iter()
                .map(|(id, profile)| Member {
                    connection_id: *id,
                    profile: profile.clone(),
                })
                .collect()
        })
    }

    /// Connection ids in a room, optionally skipping one
    pub fn recipients(&self, room_id: &str, exclude: Option<ConnectionId>) -> Recipients {
        self.rooms
            .get(room_id)
            .map(|members| {
                members
                    .keys()
                    .copied()
                    .filter(|id| Some(*id) != exclude)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_full(&self, room_id: &str) -> bool {
        self.member_count(room_id) >= ROOM_CAPACITY
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, HashMap::len)
    }

    pub fn room_of(&self, connection_id: ConnectionId) -> Option<&str> {
        self.memberships.get(&connection_id).map(String::as_str)
    }

    pub fn profile_of(&self, connection_id: ConnectionId) -> Option<&Profile> {
        let room_id = self.memberships.get(&connection_id)?;
        self.rooms.get(room_id)?.get(&connection_id)
    }

    pub fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.memberships.len()
    }

    /// Snapshot of every active room, sorted by id
    pub fn rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|(room_id, members)| RoomSummary {
                room_id: room_id.clone(),
                member_count: members.len(),
                capacity: ROOM_CAPACITY,
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }
}
