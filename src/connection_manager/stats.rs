//! Connection statistics structures

use serde::Serialize;

/// Connection statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    /// Seconds since the oldest open connection was established
    pub oldest_connection_age_secs: Option<i64>,
}
