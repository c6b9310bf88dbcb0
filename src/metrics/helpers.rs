//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_ACTIVE, DELIVERIES_FAILED_TOTAL, EVENTS_RELAYED_TOTAL, ROOMS_ACTIVE, ROOM_JOINS_TOTAL,
    ROOM_MEMBERS, STALE_CONNECTIONS_REMOVED, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
    WS_CONNECTION_DURATION, WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
        CONNECTIONS_ACTIVE.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        CONNECTIONS_ACTIVE.dec();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn record_stale_removed(count: u64) {
        STALE_CONNECTIONS_REMOVED.inc_by(count);
    }
}

/// Helper struct for recording room and fan-out metrics
pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_join_admitted() {
        ROOM_JOINS_TOTAL.with_label_values(&["admitted"]).inc();
    }

    pub fn record_join_rejected() {
        ROOM_JOINS_TOTAL.with_label_values(&["rejected"]).inc();
    }

    /// Record one relayed event of the given kind
    pub fn record_relayed(kind: &str) {
        EVENTS_RELAYED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_failed(count: u64) {
        if count > 0 {
            DELIVERIES_FAILED_TOTAL.inc_by(count);
        }
    }

    /// Publish current room occupancy
    pub fn set_occupancy(rooms: usize, members: usize) {
        ROOMS_ACTIVE.set(rooms as i64);
        ROOM_MEMBERS.set(members as i64);
    }
}

/// Helper struct for recording inbound WebSocket message metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record(kind: &str) {
        WS_MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
    }

    pub fn record_invalid() {
        WS_MESSAGES_RECEIVED.with_label_values(&["invalid"]).inc();
    }
}
