//! End-to-end tests of the room service over the real connection layer
//!
//! Each simulated client owns the receiving half of its outbound queue, the
//! same way the WebSocket send task does, without opening sockets.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use room_relay_service::connection_manager::ConnectionManager;
use room_relay_service::room::{
    spawn_room_service, MediaKind, Profile, RoomHandle, SignalKind, ROOM_CAPACITY,
};
use room_relay_service::websocket::ServerMessage;

struct Client {
    id: Uuid,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Client {
    fn connect(manager: &ConnectionManager) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let handle = manager.register(tx);
        Self { id: handle.id, rx }
    }

    async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("message should arrive")
            .expect("queue should stay open")
    }

    /// Everything queued so far; call after a query round-trip so all
    /// earlier commands have been applied
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }
}

fn setup() -> (Arc<ConnectionManager>, RoomHandle) {
    let manager = Arc::new(ConnectionManager::new());
    let (rooms, _task) = spawn_room_service(manager.clone(), 256);
    (manager, rooms)
}

async fn settle(rooms: &RoomHandle) {
    rooms.stats().await.expect("room service running");
}

mod membership_tests {
    use super::*;

    #[tokio::test]
    async fn test_alice_and_bob_scenario() {
        let (manager, rooms) = setup();
        let mut conn1 = Client::connect(&manager);
        let mut conn2 = Client::connect(&manager);

        rooms.join(conn1.id, "room1", Profile::new("alice", "alice")).await.unwrap();
        assert_eq!(conn1.recv().await, ServerMessage::ExistingUsers { users: vec![] });

        rooms.join(conn2.id, "room1", Profile::new("bob", "bob")).await.unwrap();
        match conn2.recv().await {
            ServerMessage::ExistingUsers { users } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].connection_id, conn1.id);
                assert_eq!(users[0].profile.user_id, "alice");
            }
            other => panic!("expected existingUsers, got {:?}", other),
        }
        assert_eq!(
            conn1.recv().await,
            ServerMessage::UserJoined {
                connection_id: conn2.id,
                profile: Profile::new("bob", "bob"),
            }
        );

        rooms.disconnect(conn1.id).await.unwrap();
        assert_eq!(
            conn2.recv().await,
            ServerMessage::UserLeft {
                connection_id: conn1.id,
                profile: Profile::new("alice", "alice"),
            }
        );
        let members = rooms.members("room1").await.unwrap().unwrap();
        assert_eq!(members.len(), 1);

        rooms.disconnect(conn2.id).await.unwrap();
        assert!(rooms.members("room1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eleventh_join_is_rejected() {
        let (manager, rooms) = setup();
        let mut clients: Vec<Client> = (0..ROOM_CAPACITY).map(|_| Client::connect(&manager)).collect();

        for (i, client) in clients.iter().enumerate() {
            rooms
                .join(client.id, "crowded", Profile::new(format!("u{}", i), format!("User {}", i)))
                .await
                .unwrap();
        }
        settle(&rooms).await;
        for client in clients.iter_mut() {
            client.drain();
        }

        let mut late = Client::connect(&manager);
        rooms.join(late.id, "crowded", Profile::new("late", "Late")).await.unwrap();
        assert_eq!(
            late.recv().await,
            ServerMessage::RoomFull {
                room_id: "crowded".to_string(),
                capacity: ROOM_CAPACITY,
            }
        );

        settle(&rooms).await;
        assert!(clients.iter_mut().all(|c| c.drain().is_empty()));
        let members = rooms.members("crowded").await.unwrap().unwrap();
        assert_eq!(members.len(), ROOM_CAPACITY);
        assert!(members.iter().all(|m| m.connection_id != late.id));
    }

    #[tokio::test]
    async fn test_disconnect_without_membership_is_silent() {
        let (manager, rooms) = setup();
        let mut member = Client::connect(&manager);
        let stranger = Client::connect(&manager);

        rooms.join(member.id, "room", Profile::new("m", "M")).await.unwrap();
        settle(&rooms).await;
        member.drain();

        rooms.disconnect(stranger.id).await.unwrap();
        settle(&rooms).await;
        assert!(member.drain().is_empty());
    }

    #[tokio::test]
    async fn test_room_is_recreated_fresh() {
        let (manager, rooms) = setup();
        let mut first = Client::connect(&manager);
        rooms.join(first.id, "ephemeral", Profile::new("a", "A")).await.unwrap();
        rooms.leave(first.id).await.unwrap();
        settle(&rooms).await;
        first.drain();
        assert_eq!(rooms.stats().await.unwrap().total_rooms, 0);

        let mut second = Client::connect(&manager);
        rooms.join(second.id, "ephemeral", Profile::new("b", "B")).await.unwrap();
        assert_eq!(second.recv().await, ServerMessage::ExistingUsers { users: vec![] });
    }

    #[tokio::test]
    async fn test_switching_rooms_notifies_both_rooms() {
        let (manager, rooms) = setup();
        let mut mover = Client::connect(&manager);
        let mut old_peer = Client::connect(&manager);
        let mut new_peer = Client::connect(&manager);

        rooms.join(mover.id, "old", Profile::new("mover", "Mover")).await.unwrap();
        rooms.join(old_peer.id, "old", Profile::new("op", "Old Peer")).await.unwrap();
        rooms.join(new_peer.id, "new", Profile::new("np", "New Peer")).await.unwrap();
        settle(&rooms).await;
        for c in [&mut mover, &mut old_peer, &mut new_peer] {
            c.drain();
        }

        rooms.join(mover.id, "new", Profile::new("mover", "Mover")).await.unwrap();
        settle(&rooms).await;

        assert!(matches!(
            old_peer.drain().as_slice(),
            [ServerMessage::UserLeft { connection_id, .. }] if *connection_id == mover.id
        ));
        assert!(matches!(
            new_peer.drain().as_slice(),
            [ServerMessage::UserJoined { connection_id, .. }] if *connection_id == mover.id
        ));
        assert!(matches!(
            mover.drain().as_slice(),
            [ServerMessage::ExistingUsers { users }] if users.len() == 1
        ));
    }
}

mod relay_tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_is_broadcast_to_whole_room() {
        let (manager, rooms) = setup();
        let mut a = Client::connect(&manager);
        let mut b = Client::connect(&manager);
        let mut c = Client::connect(&manager);
        let mut outsider = Client::connect(&manager);

        for (client, name) in [(&a, "a"), (&b, "b"), (&c, "c")] {
            rooms.join(client.id, "chat", Profile::new(name, name)).await.unwrap();
        }
        rooms.join(outsider.id, "other", Profile::new("o", "o")).await.unwrap();
        settle(&rooms).await;
        for client in [&mut a, &mut b, &mut c, &mut outsider] {
            client.drain();
        }

        let payload = json!({"text": "hello", "from": "a", "ts": 1700000000});
        rooms.chat(a.id, "chat", payload.clone()).await.unwrap();

        for client in [&mut a, &mut b, &mut c] {
            assert_eq!(
                client.recv().await,
                ServerMessage::ChatMessage {
                    message: payload.clone()
                }
            );
        }
        settle(&rooms).await;
        assert!(outsider.drain().is_empty());
    }

    #[tokio::test]
    async fn test_signal_is_point_to_point() {
        let (manager, rooms) = setup();
        let mut a = Client::connect(&manager);
        let mut b = Client::connect(&manager);
        let mut c = Client::connect(&manager);

        for client in [&a, &b, &c] {
            rooms.join(client.id, "call", Profile::new("p", "p")).await.unwrap();
        }
        settle(&rooms).await;
        for client in [&mut a, &mut b, &mut c] {
            client.drain();
        }

        let candidate = json!({"candidate": "candidate:1 1 UDP 2122252543 10.0.0.2 54321 typ host"});
        rooms
            .signal(SignalKind::IceCandidate, a.id, c.id, candidate.clone())
            .await
            .unwrap();

        assert_eq!(
            c.recv().await,
            ServerMessage::Signal {
                kind: SignalKind::IceCandidate,
                from: a.id,
                payload: candidate,
            }
        );
        settle(&rooms).await;
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn test_media_toggle_excludes_sender() {
        let (manager, rooms) = setup();
        let mut a = Client::connect(&manager);
        let mut b = Client::connect(&manager);

        rooms.join(a.id, "call", Profile::new("a", "a")).await.unwrap();
        rooms.join(b.id, "call", Profile::new("b", "b")).await.unwrap();
        settle(&rooms).await;
        a.drain();
        b.drain();

        rooms.media_toggle(a.id, "call", MediaKind::Video, true).await.unwrap();
        assert_eq!(
            b.recv().await,
            ServerMessage::PeerMediaToggle {
                connection_id: a.id,
                kind: MediaKind::Video,
                enabled: true,
            }
        );
        settle(&rooms).await;
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_closed_member_queue_does_not_block_room() {
        let (manager, rooms) = setup();
        let mut a = Client::connect(&manager);
        let b = Client::connect(&manager);

        rooms.join(a.id, "room", Profile::new("a", "a")).await.unwrap();
        rooms.join(b.id, "room", Profile::new("b", "b")).await.unwrap();
        settle(&rooms).await;
        a.drain();

        // b's socket task went away without a disconnect yet
        drop(b);

        rooms.chat(a.id, "room", json!("still here")).await.unwrap();
        assert_eq!(
            a.recv().await,
            ServerMessage::ChatMessage {
                message: json!("still here")
            }
        );
    }
}
