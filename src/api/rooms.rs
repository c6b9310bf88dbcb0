//! Read-only room inspection endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::room::{Member, RoomSummary, ROOM_CAPACITY};
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListResponse {
    pub rooms: Vec<RoomSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetailResponse {
    pub room_id: String,
    pub member_count: usize,
    pub capacity: usize,
    pub members: Vec<Member>,
}

/// GET /api/v1/rooms
pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<RoomListResponse>> {
    let stats = state.rooms.stats().await?;

    Ok(Json(RoomListResponse {
        total: stats.total_rooms,
        rooms: stats.rooms,
    }))
}

/// GET /api/v1/rooms/{room_id}
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailResponse>> {
    let mut members = state
        .rooms
        .members(room_id.clone())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room '{}' not found", room_id)))?;
    members.sort_by(|a, b| a.profile.display_name.cmp(&b.profile.display_name));

    Ok(Json(RoomDetailResponse {
        room_id,
        member_count: members.len(),
        capacity: ROOM_CAPACITY,
        members,
    }))
}
