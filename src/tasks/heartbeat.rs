use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionManager;
use crate::metrics::ConnectionMetrics;
use crate::room::RoomHandle;
use crate::websocket::ServerMessage;

/// Timeout for individual heartbeat send operations
const HEARTBEAT_SEND_TIMEOUT_MS: u64 = 5000;

/// Maximum concurrent heartbeat sends to avoid overwhelming the system
const MAX_CONCURRENT_HEARTBEATS: usize = 1000;

/// Background task for heartbeat and connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    connection_manager: Arc<ConnectionManager>,
    rooms: RoomHandle,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        rooms: RoomHandle,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            connection_manager,
            rooms,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup tasks
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats().await;
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_stale_connections(connection_timeout).await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Send heartbeat to all connections in parallel with batching
    async fn send_heartbeats(&self) {
        let connections = self.connection_manager.get_all_connections();
        let total_count = connections.len();

        if total_count == 0 {
            return;
        }

        let start = Instant::now();
        let send_timeout = Duration::from_millis(HEARTBEAT_SEND_TIMEOUT_MS);
        let mut sent = 0usize;

        // Process in batches to avoid overwhelming the system
        for batch in connections.chunks(MAX_CONCURRENT_HEARTBEATS) {
            let results = join_all(batch.iter().map(|handle| async move {
                match timeout(send_timeout, handle.send(ServerMessage::Heartbeat)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(_)) => {
                        tracing::debug!(
                            connection_id = %handle.id,
                            "Failed to send heartbeat, connection may be dead"
                        );
                        false
                    }
                    Err(_) => {
                        tracing::debug!(
                            connection_id = %handle.id,
                            timeout_ms = HEARTBEAT_SEND_TIMEOUT_MS,
                            "Heartbeat send timed out"
                        );
                        false
                    }
                }
            }))
            .await;

            sent += results.into_iter().filter(|ok| *ok).count();
        }

        tracing::debug!(
            total = total_count,
            sent = sent,
            failed = total_count - sent,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Heartbeat round completed"
        );
    }

    /// Drop idle connections and release their room membership
    async fn cleanup_stale_connections(&self, timeout_secs: u64) {
        let removed = self.connection_manager.remove_stale_connections(timeout_secs);
        if removed.is_empty() {
            return;
        }

        for connection_id in &removed {
            if let Err(e) = self.rooms.disconnect(*connection_id).await {
                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to release room membership");
            }
        }

        ConnectionMetrics::record_stale_removed(removed.len() as u64);
        tracing::info!(
            removed = removed.len(),
            timeout_secs = timeout_secs,
            "Cleaned up stale connections"
        );
    }
}
