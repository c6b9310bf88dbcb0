use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::room::{ConnectionId, Transport};
use crate::websocket::ServerMessage;

use super::stats::ConnectionStats;
use super::types::ConnectionHandle;

/// Manages all active WebSocket connections
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection
    pub fn register(&self, sender: mpsc::Sender<ServerMessage>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(sender));
        self.connections.insert(handle.id, handle.clone());

        tracing::info!(connection_id = %handle.id, "Connection registered");

        handle
    }

    /// Unregister a connection, returning its handle if it was present
    pub fn unregister(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.connections.remove(&connection_id)?;
        tracing::info!(connection_id = %connection_id, "Connection unregistered");
        Some(handle)
    }

    /// Get connection by ID
    pub fn get_connection(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// Get all connections
    pub fn get_all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        let now = Utc::now();
        let oldest_connection_age_secs = self
            .connections
            .iter()
            .map(|entry| now.signed_duration_since(entry.value().connected_at).num_seconds())
            .max();

        ConnectionStats {
            total_connections: self.connections.len(),
            oldest_connection_age_secs,
        }
    }

    /// Find connections that have been inactive for longer than the timeout
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<Uuid> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Unregister stale connections and ask their sockets to close.
    ///
    /// Returns the ids removed so callers can clean up room membership.
    pub fn remove_stale_connections(&self, timeout_secs: u64) -> Vec<Uuid> {
        let mut removed = Vec::new();

        for conn_id in self.find_stale_connections(timeout_secs) {
            tracing::info!(connection_id = %conn_id, "Removing stale connection due to timeout");
            if let Some(handle) = self.unregister(conn_id) {
                handle.close();
                removed.push(conn_id);
            }
        }

        removed
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ConnectionManager {
    /// Non-blocking send; a full or closed queue drops the message
    fn deliver(&self, connection_id: ConnectionId, message: ServerMessage) -> bool {
        let Some(handle) = self.get_connection(connection_id) else {
            return false;
        };

        match handle.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %connection_id, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(connection_id = %connection_id, "Outbound queue closed");
                false
            }
        }
    }
}
