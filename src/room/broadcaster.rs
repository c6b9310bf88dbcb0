use std::sync::Arc;

use serde_json::Value;

use crate::metrics::RelayMetrics;
use crate::websocket::ServerMessage;

use super::registry::RoomRegistry;
use super::types::{
    ConnectionId, JoinOutcome, MediaKind, Profile, Removal, RoomError, RoomStats, SignalKind,
    ROOM_CAPACITY,
};

/// Outbound side of the connection layer.
///
/// Sends are fire-and-forget: `deliver` queues the message for the connection
/// and returns false if it could not be queued. Implementations must not block.
pub trait Transport {
    fn deliver(&self, connection_id: ConnectionId, message: ServerMessage) -> bool;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn deliver(&self, connection_id: ConnectionId, message: ServerMessage) -> bool {
        (**self).deliver(connection_id, message)
    }
}

/// Number of recipients a fan-out reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Room membership state machine and fan-out engine
///
/// Every method runs to completion without awaiting, so callers that own the
/// broadcaster from a single task get per-room ordering for free.
pub struct RoomBroadcaster<T> {
    registry: RoomRegistry,
    transport: T,
}

impl<T: Transport> RoomBroadcaster<T> {
    pub fn new(transport: T) -> Self {
        Self {
            registry: RoomRegistry::new(),
            transport,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Admit a connection into a room.
    ///
    /// A full room answers the requester with `roomFull` and leaves all state
    /// untouched. A connection that already belongs to a room leaves it first.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        room_id: &str,
        profile: Profile,
    ) -> Result<JoinOutcome, RoomError> {
        let already_member = self.registry.room_of(connection_id) == Some(room_id);

        if !already_member && self.registry.is_full(room_id) {
            RelayMetrics::record_join_rejected();
            tracing::info!(
                connection_id = %connection_id,
                room_id = %room_id,
                "Join rejected, room is full"
            );
            self.send(
                connection_id,
                ServerMessage::RoomFull {
                    room_id: room_id.to_string(),
                    capacity: ROOM_CAPACITY,
                },
            );
            return Err(RoomError::CapacityExceeded {
                room_id: room_id.to_string(),
                capacity: ROOM_CAPACITY,
            });
        }

        let previous_room = self.evict(connection_id).map(|removal| removal.room_id);

        let existing = self.registry.list_others(room_id, connection_id);
        self.registry.record(connection_id, room_id, profile.clone());

        let recipients = self.registry.recipients(room_id, Some(connection_id));
        self.fan_out(
            &recipients,
            ServerMessage::UserJoined {
                connection_id,
                profile,
            },
        );

        let existing_members = existing.len();
        self.send(connection_id, ServerMessage::ExistingUsers { users: existing });

        RelayMetrics::record_join_admitted();
        self.publish_occupancy();
        tracing::info!(
            connection_id = %connection_id,
            room_id = %room_id,
            existing_members,
            previous_room = ?previous_room,
            "Connection joined room"
        );

        Ok(JoinOutcome {
            room_id: room_id.to_string(),
            existing_members,
            previous_room,
        })
    }

    /// Remove a connection from its room and tell the remaining members.
    ///
    /// Unknown connections yield `MembershipNotFound` and send nothing.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Result<Removal, RoomError> {
        let removal = self
            .evict(connection_id)
            .ok_or(RoomError::MembershipNotFound { connection_id })?;

        self.publish_occupancy();
        tracing::info!(
            connection_id = %connection_id,
            room_id = %removal.room_id,
            room_closed = removal.room_closed,
            "Connection left room"
        );

        Ok(removal)
    }

    /// Broadcast a chat payload to every member of the room, sender included
    pub fn chat(&self, room_id: &str, message: Value) -> Delivery {
        let recipients = self.registry.recipients(room_id, None);
        RelayMetrics::record_relayed("chat_message");
        self.fan_out(&recipients, ServerMessage::ChatMessage { message })
    }

    /// Forward a negotiation payload to exactly one connection
    pub fn signal(
        &self,
        kind: SignalKind,
        from: ConnectionId,
        target: ConnectionId,
        payload: Value,
    ) -> bool {
        RelayMetrics::record_relayed(kind.as_str());
        let sent = self.send(target, ServerMessage::Signal { kind, from, payload });
        if !sent {
            tracing::debug!(
                from = %from,
                target = %target,
                kind = kind.as_str(),
                "Signal target unreachable"
            );
        }
        sent
    }

    /// Tell every other member of the room that the sender toggled a track
    pub fn media_toggle(
        &self,
        room_id: &str,
        sender: ConnectionId,
        kind: MediaKind,
        enabled: bool,
    ) -> Delivery {
        let recipients = self.registry.recipients(room_id, Some(sender));
        RelayMetrics::record_relayed("media_toggle");
        self.fan_out(
            &recipients,
            ServerMessage::PeerMediaToggle {
                connection_id: sender,
                kind,
                enabled,
            },
        )
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            total_rooms: self.registry.room_count(),
            total_members: self.registry.connection_count(),
            rooms: self.registry.rooms(),
        }
    }

    /// Drop the connection's membership and send `userLeft` to whoever remains
    fn evict(&mut self, connection_id: ConnectionId) -> Option<Removal> {
        let removal = self.registry.remove(connection_id)?;

        if !removal.room_closed {
            let recipients = self.registry.recipients(&removal.room_id, None);
            self.fan_out(
                &recipients,
                ServerMessage::UserLeft {
                    connection_id,
                    profile: removal.profile.clone(),
                },
            );
        }

        Some(removal)
    }

    fn send(&self, connection_id: ConnectionId, message: ServerMessage) -> bool {
        let sent = self.transport.deliver(connection_id, message);
        if !sent {
            RelayMetrics::record_failed(1);
        }
        sent
    }

    fn fan_out(&self, recipients: &[ConnectionId], message: ServerMessage) -> Delivery {
        let mut delivery = Delivery::default();
        for id in recipients {
            if self.transport.deliver(*id, message.clone()) {
                delivery.delivered += 1;
            } else {
                delivery.failed += 1;
            }
        }
        RelayMetrics::record_failed(delivery.failed as u64);
        delivery
    }

    fn publish_occupancy(&self) {
        RelayMetrics::set_occupancy(self.registry.room_count(), self.registry.connection_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Records every delivery; ids in `unreachable` refuse messages
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ConnectionId, ServerMessage)>>,
        unreachable: Mutex<HashSet<ConnectionId>>,
    }

    impl RecordingTransport {
        fn take(&self) -> Vec<(ConnectionId, ServerMessage)> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Transport for RecordingTransport {
        fn deliver(&self, connection_id: ConnectionId, message: ServerMessage) -> bool {
            if self.unreachable.lock().unwrap().contains(&connection_id) {
                return false;
            }
            self.sent.lock().unwrap().push((connection_id, message));
            true
        }
    }

    fn broadcaster() -> RoomBroadcaster<RecordingTransport> {
        RoomBroadcaster::new(RecordingTransport::default())
    }

    fn profile(name: &str) -> Profile {
        Profile::new(name, name)
    }

    fn sent_to(log: &[(ConnectionId, ServerMessage)], id: ConnectionId) -> Vec<ServerMessage> {
        log.iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    #[test]
    fn test_two_member_scenario() {
        let mut rooms = broadcaster();
        let conn1 = Uuid::new_v4();
        let conn2 = Uuid::new_v4();

        rooms.join(conn1, "room1", profile("alice")).unwrap();
        let log = rooms.transport().take();
        assert_eq!(sent_to(&log, conn1), vec![ServerMessage::ExistingUsers { users: vec![] }]);

        rooms.join(conn2, "room1", profile("bob")).unwrap();
        let log = rooms.transport().take();
        match sent_to(&log, conn2).as_slice() {
            [ServerMessage::ExistingUsers { users }] => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].connection_id, conn1);
                assert_eq!(users[0].profile.user_id, "alice");
            }
            other => panic!("unexpected messages: {:?}", other),
        }
        assert_eq!(
            sent_to(&log, conn1),
            vec![ServerMessage::UserJoined {
                connection_id: conn2,
                profile: profile("bob"),
            }]
        );

        let removal = rooms.disconnect(conn1).unwrap();
        assert!(!removal.room_closed);
        let log = rooms.transport().take();
        assert_eq!(
            log,
            vec![(
                conn2,
                ServerMessage::UserLeft {
                    connection_id: conn1,
                    profile: profile("alice"),
                }
            )]
        );
        assert_eq!(rooms.registry().member_count("room1"), 1);

        let removal = rooms.disconnect(conn2).unwrap();
        assert!(removal.room_closed);
        assert!(rooms.transport().take().is_empty());
        assert!(!rooms.registry().contains_room("room1"));
    }

    #[test]
    fn test_sequential_joins_report_existing_members() {
        let mut rooms = broadcaster();
        let ids: Vec<ConnectionId> = (0..ROOM_CAPACITY).map(|_| Uuid::new_v4()).collect();

        for (n, id) in ids.iter().enumerate() {
            let outcome = rooms.join(*id, "room", profile(&format!("user-{}", n))).unwrap();
            assert_eq!(outcome.existing_members, n);
        }

        let log = rooms.transport().take();
        for (n, id) in ids.iter().enumerate() {
            let received = sent_to(&log, *id);
            let joined = received
                .iter()
                .filter(|m| matches!(m, ServerMessage::UserJoined { .. }))
                .count();
            assert_eq!(joined, ROOM_CAPACITY - 1 - n);

            let existing: Vec<_> = received
                .iter()
                .filter_map(|m| match m {
                    ServerMessage::ExistingUsers { users } => Some(users.len()),
                    _ => None,
                })
                .collect();
            assert_eq!(existing, vec![n]);
        }
    }

    #[test]
    fn test_full_room_rejects_without_state_change() {
        let mut rooms = broadcaster();
        for i in 0..ROOM_CAPACITY {
            rooms.join(Uuid::new_v4(), "room", profile(&format!("user-{}", i))).unwrap();
        }
        rooms.transport().take();

        let late = Uuid::new_v4();
        for _ in 0..3 {
            let err = rooms.join(late, "room", profile("late")).unwrap_err();
            assert_eq!(
                err,
                RoomError::CapacityExceeded {
                    room_id: "room".to_string(),
                    capacity: ROOM_CAPACITY,
                }
            );
        }

        let log = rooms.transport().take();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|(to, msg)| *to == late
            && matches!(msg, ServerMessage::RoomFull { capacity: ROOM_CAPACITY, .. })));
        assert_eq!(rooms.registry().member_count("room"), ROOM_CAPACITY);
        assert_eq!(rooms.registry().room_of(late), None);
    }

    #[test]
    fn test_rejected_join_keeps_current_room() {
        let mut rooms = broadcaster();
        let mover = Uuid::new_v4();
        rooms.join(mover, "home", profile("mover")).unwrap();
        for i in 0..ROOM_CAPACITY {
            rooms.join(Uuid::new_v4(), "busy", profile(&format!("user-{}", i))).unwrap();
        }

        assert!(rooms.join(mover, "busy", profile("mover")).is_err());
        assert_eq!(rooms.registry().room_of(mover), Some("home"));
    }

    #[test]
    fn test_disconnect_unknown_connection_is_silent() {
        let mut rooms = broadcaster();
        rooms.join(Uuid::new_v4(), "room", profile("alice")).unwrap();
        rooms.transport().take();

        let stranger = Uuid::new_v4();
        assert_eq!(
            rooms.disconnect(stranger).unwrap_err(),
            RoomError::MembershipNotFound {
                connection_id: stranger
            }
        );
        assert!(rooms.transport().take().is_empty());
    }

    #[test]
    fn test_last_member_leaving_resets_room() {
        let mut rooms = broadcaster();
        let a = Uuid::new_v4();
        rooms.join(a, "room", profile("alice")).unwrap();
        rooms.disconnect(a).unwrap();
        assert_eq!(rooms.stats().total_rooms, 0);

        let b = Uuid::new_v4();
        let outcome = rooms.join(b, "room", profile("bob")).unwrap();
        assert_eq!(outcome.existing_members, 0);
    }

    #[test]
    fn test_chat_reaches_every_member_including_sender() {
        let mut rooms = broadcaster();
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        for (i, id) in ids.iter().enumerate() {
            rooms.join(*id, "room", profile(&format!("user-{}", i))).unwrap();
        }
        rooms.join(Uuid::new_v4(), "elsewhere", profile("outsider")).unwrap();
        rooms.transport().take();

        let payload = json!({"text": "hello", "sender": "user-0", "meta": [1, 2, 3]});
        let delivery = rooms.chat("room", payload.clone());
        assert_eq!(delivery, Delivery { delivered: 3, failed: 0 });

        let log = rooms.transport().take();
        assert_eq!(log.len(), 3);
        for id in ids {
            assert_eq!(
                sent_to(&log, id),
                vec![ServerMessage::ChatMessage {
                    message: payload.clone()
                }]
            );
        }
    }

    #[test]
    fn test_signal_reaches_only_target() {
        let mut rooms = broadcaster();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for id in [a, b, c] {
            rooms.join(id, "room", profile("peer")).unwrap();
        }
        rooms.transport().take();

        let offer = json!({"sdp": "v=0", "type": "offer"});
        assert!(rooms.signal(SignalKind::Offer, a, b, offer.clone()));

        let log = rooms.transport().take();
        assert_eq!(
            log,
            vec![(
                b,
                ServerMessage::Signal {
                    kind: SignalKind::Offer,
                    from: a,
                    payload: offer,
                }
            )]
        );
    }

    #[test]
    fn test_signal_to_unreachable_target() {
        let rooms = broadcaster();
        let gone = Uuid::new_v4();
        rooms.transport().unreachable.lock().unwrap().insert(gone);

        assert!(!rooms.signal(SignalKind::Answer, Uuid::new_v4(), gone, json!({})));
        assert!(rooms.transport().take().is_empty());
    }

    #[test]
    fn test_media_toggle_skips_sender() {
        let mut rooms = broadcaster();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for id in [a, b, c] {
            rooms.join(id, "room", profile("peer")).unwrap();
        }
        rooms.transport().take();

        let delivery = rooms.media_toggle("room", a, MediaKind::Audio, false);
        assert_eq!(delivery.delivered, 2);

        let log = rooms.transport().take();
        assert!(sent_to(&log, a).is_empty());
        assert_eq!(
            sent_to(&log, b),
            vec![ServerMessage::PeerMediaToggle {
                connection_id: a,
                kind: MediaKind::Audio,
                enabled: false,
            }]
        );
    }

    #[test]
    fn test_duplicate_join_moves_connection() {
        let mut rooms = broadcaster();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        rooms.join(a, "first", profile("alice")).unwrap();
        rooms.join(b, "first", profile("bob")).unwrap();
        rooms.join(c, "second", profile("carol")).unwrap();
        rooms.transport().take();

        let outcome = rooms.join(a, "second", profile("alice")).unwrap();
        assert_eq!(outcome.previous_room.as_deref(), Some("first"));
        assert_eq!(outcome.existing_members, 1);

        let log = rooms.transport().take();
        assert_eq!(
            sent_to(&log, b),
            vec![ServerMessage::UserLeft {
                connection_id: a,
                profile: profile("alice"),
            }]
        );
        assert_eq!(
            sent_to(&log, c),
            vec![ServerMessage::UserJoined {
                connection_id: a,
                profile: profile("alice"),
            }]
        );
        assert_eq!(rooms.registry().room_of(a), Some("second"));
        assert_eq!(rooms.registry().member_count("first"), 1);
    }

    #[test]
    fn test_rejoin_same_full_room_is_admitted() {
        let mut rooms = broadcaster();
        let first = Uuid::new_v4();
        rooms.join(first, "room", profile("first")).unwrap();
        for i in 1..ROOM_CAPACITY {
            rooms.join(Uuid::new_v4(), "room", profile(&format!("user-{}", i))).unwrap();
        }

        let outcome = rooms.join(first, "room", profile("first")).unwrap();
        assert_eq!(outcome.previous_room.as_deref(), Some("room"));
        assert_eq!(outcome.existing_members, ROOM_CAPACITY - 1);
        assert_eq!(rooms.registry().member_count("room"), ROOM_CAPACITY);
    }

    #[test]
    fn test_failed_delivery_does_not_affect_others() {
        let mut rooms = broadcaster();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for id in [a, b, c] {
            rooms.join(id, "room", profile("peer")).unwrap();
        }
        rooms.transport().take();
        rooms.transport().unreachable.lock().unwrap().insert(b);

        let delivery = rooms.chat("room", json!("hi"));
        assert_eq!(delivery, Delivery { delivered: 2, failed: 1 });
        assert_eq!(rooms.transport().take().len(), 2);
    }

    #[test]
    fn test_room_count_stays_within_bounds() {
        let mut rooms = broadcaster();
        let ids: Vec<ConnectionId> = (0..25).map(|_| Uuid::new_v4()).collect();

        for (i, id) in ids.iter().enumerate() {
            let room = if i % 2 == 0 { "even" } else { "odd" };
            let _ = rooms.join(*id, room, profile("peer"));
            for summary in rooms.stats().rooms {
                assert!(summary.member_count >= 1 && summary.member_count <= ROOM_CAPACITY);
            }
        }

        for id in &ids {
            let _ = rooms.disconnect(*id);
            for summary in rooms.stats().rooms {
                assert!(summary.member_count >= 1);
            }
        }
        assert_eq!(rooms.stats(), RoomStats::default());
    }
}
