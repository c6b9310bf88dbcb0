//! Prometheus metrics for the relay service.
//!
//! - Connection metrics (opened, closed, active, duration)
//! - Room metrics (active rooms, join outcomes)
//! - Relay metrics (events relayed by kind, failed deliveries)
//! - Inbound WebSocket message counts

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, RelayMetrics, WsMessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of open WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of open WebSocket connections"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection lifetime in seconds
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Connections removed by the idle cleanup task
    pub static ref STALE_CONNECTIONS_REMOVED: IntCounter = register_int_counter!(
        format!("{}_stale_connections_removed_total", METRIC_PREFIX),
        "Total connections removed for inactivity"
    ).unwrap();

    // ============================================================================
    // Room Metrics
    // ============================================================================

    /// Rooms with at least one member
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of rooms with at least one member"
    ).unwrap();

    /// Connections currently inside a room
    pub static ref ROOM_MEMBERS: IntGauge = register_int_gauge!(
        format!("{}_room_members", METRIC_PREFIX),
        "Number of connections that are members of a room"
    ).unwrap();

    /// Join attempts by outcome (admitted, rejected)
    pub static ref ROOM_JOINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_room_joins_total", METRIC_PREFIX),
        "Room join attempts by outcome",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    /// Events fanned out by kind
    pub static ref EVENTS_RELAYED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_relayed_total", METRIC_PREFIX),
        "Events relayed by kind",
        &["kind"]
    ).unwrap();

    /// Outbound messages dropped because the connection queue was full or closed
    pub static ref DELIVERIES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_failed_total", METRIC_PREFIX),
        "Outbound messages that could not be queued for a connection"
    ).unwrap();

    // ============================================================================
    // WebSocket Message Metrics
    // ============================================================================

    /// Inbound client messages by type
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Client messages received by type",
        &["type"]
    ).unwrap();
}
