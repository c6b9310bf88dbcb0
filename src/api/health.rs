//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::room::RoomSummary;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub rooms: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStatsResponse,
    pub rooms: RoomStatsResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatsResponse {
    pub total_connections: usize,
    pub oldest_connection_age_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RoomStatsResponse {
    pub total_rooms: usize,
    pub total_members: usize,
    pub rooms: Vec<RoomSummary>,
}

/// GET /health - degraded when the room service has stopped
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let rooms = state.rooms.stats().await;
    let status = if rooms.is_ok() { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.connection_manager.connection_count(),
        rooms: rooms.map(|r| r.total_rooms).unwrap_or_default(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let conn_stats = state.connection_manager.stats();
    let room_stats = state.rooms.stats().await?;

    Ok(Json(StatsResponse {
        connections: ConnectionStatsResponse {
            total_connections: conn_stats.total_connections,
            oldest_connection_age_secs: conn_stats.oldest_connection_age_secs,
        },
        rooms: RoomStatsResponse {
            total_rooms: room_stats.total_rooms,
            total_members: room_stats.total_members,
            rooms: room_stats.rooms,
        },
    }))
}
