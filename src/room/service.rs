//! Single-task owner of room state.
//!
//! All room mutations are funnelled through one mpsc queue into a task that
//! owns the [`RoomBroadcaster`] by value. Each command runs to completion before
//! the next is taken, so events for a room are applied and broadcast in the
//! order they were received and the room maps need no locks.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::broadcaster::{RoomBroadcaster, Transport};
use super::types::{ConnectionId, MediaKind, Member, Profile, RoomError, RoomStats, SignalKind};

/// Commands accepted by the room service
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        room_id: String,
        profile: Profile,
    },
    /// Client asked to leave its room but keeps the socket open
    Leave { connection_id: ConnectionId },
    /// Transport session ended
    Disconnect { connection_id: ConnectionId },
    Chat {
        connection_id: ConnectionId,
        room_id: String,
        message: Value,
    },
    Signal {
        kind: SignalKind,
        from: ConnectionId,
        target: ConnectionId,
        payload: Value,
    },
    MediaToggle {
        connection_id: ConnectionId,
        room_id: String,
        kind: MediaKind,
        enabled: bool,
    },
    Stats {
        respond_to: oneshot::Sender<RoomStats>,
    },
    Members {
        room_id: String,
        respond_to: oneshot::Sender<Option<Vec<Member>>>,
    },
}

/// Task body that applies [`RoomCommand`]s to a broadcaster
pub struct RoomService<T> {
    broadcaster: RoomBroadcaster<T>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<T: Transport> RoomService<T> {
    pub fn new(broadcaster: RoomBroadcaster<T>, receiver: mpsc::Receiver<RoomCommand>) -> Self {
        Self {
            broadcaster,
            receiver,
        }
    }

    /// Process commands until every handle has been dropped
    pub async fn run(mut self) {
        tracing::info!("Room service started");

        while let Some(command) = self.receiver.recv().await {
            self.handle_command(command);
        }

        tracing::info!(
            rooms = self.broadcaster.registry().room_count(),
            "Room service stopped"
        );
    }

    fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                connection_id,
                room_id,
                profile,
            } => {
                // Rejection has already been signalled to the requester
                let _ = self.broadcaster.join(connection_id, &room_id, profile);
            }
            RoomCommand::Leave { connection_id } | RoomCommand::Disconnect { connection_id } => {
                if let Err(e) = self.broadcaster.disconnect(connection_id) {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Nothing to leave");
                }
            }
            RoomCommand::Chat {
                connection_id,
                room_id,
                message,
            } => {
                let delivery = self.broadcaster.chat(&room_id, message);
                tracing::debug!(
                    connection_id = %connection_id,
                    room_id = %room_id,
                    delivered = delivery.delivered,
                    failed = delivery.failed,
                    "Chat relayed"
                );
            }
            RoomCommand::Signal {
                kind,
                from,
                target,
                payload,
            } => {
                self.broadcaster.signal(kind, from, target, payload);
            }
            RoomCommand::MediaToggle {
                connection_id,
                room_id,
                kind,
                enabled,
            } => {
                self.broadcaster
                    .media_toggle(&room_id, connection_id, kind, enabled);
            }
            RoomCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.broadcaster.stats());
            }
            RoomCommand::Members {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.broadcaster.registry().members(&room_id));
            }
        }
    }
}

/// Cheap-to-clone handle for submitting commands to the room service
#[derive(Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn new(sender: mpsc::Sender<RoomCommand>) -> Self {
        Self { sender }
    }

    pub async fn join(
        &self,
        connection_id: ConnectionId,
        room_id: impl Into<String>,
        profile: Profile,
    ) -> Result<(), RoomError> {
        self.submit(RoomCommand::Join {
            connection_id,
            room_id: room_id.into(),
            profile,
        })
        .await
    }

    pub async fn leave(&self, connection_id: ConnectionId) -> Result<(), RoomError> {
        self.submit(RoomCommand::Leave { connection_id }).await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), RoomError> {
        self.submit(RoomCommand::Disconnect { connection_id }).await
    }

    pub async fn chat(
        &self,
        connection_id: ConnectionId,
        room_id: impl Into<String>,
        message: Value,
    ) -> Result<(), RoomError> {
        self.submit(RoomCommand::Chat {
            connection_id,
            room_id: room_id.into(),
            message,
        })
        .await
    }

    pub async fn signal(
        &self,
        kind: SignalKind,
        from: ConnectionId,
        target: ConnectionId,
        payload: Value,
    ) -> Result<(), RoomError> {
        self.submit(RoomCommand::Signal {
            kind,
            from,
            target,
            payload,
        })
        .await
    }

    pub async fn media_toggle(
        &self,
        connection_id: ConnectionId,
        room_id: impl Into<String>,
        kind: MediaKind,
        enabled: bool,
    ) -> Result<(), RoomError> {
        self.submit(RoomCommand::MediaToggle {
            connection_id,
            room_id: room_id.into(),
            kind,
            enabled,
        })
        .await
    }

    /// Snapshot of all rooms, taken between two commands
    pub async fn stats(&self) -> Result<RoomStats, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.submit(RoomCommand::Stats { respond_to: tx }).await?;
        rx.await.map_err(|_| RoomError::ServiceUnavailable)
    }

    /// Members of a room, `None` if it does not exist
    pub async fn members(&self, room_id: impl Into<String>) -> Result<Option<Vec<Member>>, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.submit(RoomCommand::Members {
            room_id: room_id.into(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| RoomError::ServiceUnavailable)
    }

    async fn submit(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RoomError::ServiceUnavailable)
    }
}

/// Spawn the room service on the current runtime and return a handle to it
pub fn spawn_room_service<T>(transport: T, buffer: usize) -> (RoomHandle, JoinHandle<()>)
where
    T: Transport + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let service = RoomService::new(RoomBroadcaster::new(transport), rx);
    let task = tokio::spawn(service.run());
    (RoomHandle::new(tx), task)
}
