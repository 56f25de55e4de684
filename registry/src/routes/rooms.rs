//! /rooms admin routes. Rooms are a catalog; the access check never reads it.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;
use tracing::{debug, info};
use wards::{RecordId, Room};

use crate::patch::required_text;
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct NewRoom {
    pub room_number: String,
    #[serde(default)]
    pub floor: i32,
    #[serde(default)]
    pub access_controller_id: String,
}

/// GET /rooms
pub async fn list_rooms(State(state): State<AppState>) -> AppResult<Json<Vec<Room>>> {
    debug!("Handling GET /rooms");
    Ok(Json(state.io("rooms.list", state.store.list_rooms()).await?))
}

/// POST /rooms with a JSON array; the batch is stored all or nothing.
pub async fn create_rooms(
    State(state): State<AppState>,
    Json(body): Json<Vec<NewRoom>>,
) -> AppResult<(StatusCode, Json<Vec<Room>>)> {
    if body.is_empty() {
        return Err(AppError::bad_request("at least one room is required"));
    }

    let rooms = body
        .into_iter()
        .map(|new| {
            Ok(Room {
                id: RecordId::new(),
                room_number: required_text("room_number", &new.room_number)?,
                floor: new.floor,
                access_controller_id: new.access_controller_id.trim().to_string(),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    state
        .io("rooms.insert", state.store.insert_rooms(rooms.clone()))
        .await?;
    info!(event = "rooms.created", count = rooms.len(), "Rooms created");

    Ok((StatusCode::CREATED, Json(rooms)))
}
