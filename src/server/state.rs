use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connection_manager::ConnectionManager;
use crate::room::{spawn_room_service, RoomHandle};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connection_manager: Arc<ConnectionManager>,
    pub rooms: RoomHandle,
    pub start_time: Instant,
}

impl AppState {
    /// Build the state and spawn the room service on the current runtime
    pub fn new(settings: Settings) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (rooms, _task) = spawn_room_service(
            connection_manager.clone(),
            settings.rooms.event_buffer_size,
        );

        Self {
            settings: Arc::new(settings),
            connection_manager,
            rooms,
            start_time: Instant::now(),
        }
    }
}
