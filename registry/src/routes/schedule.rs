//! /schedule admin routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use wards::{DayOfWeek, RecordId, ScheduleEntry, ScheduleWindow, UserDirectory};

use super::parse_id;
use crate::patch::{required_text, Patch};
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewScheduleEntry {
    pub user_id: String,
    #[serde(alias = "room_number")]
    pub room_id: String,
    pub day: DayOfWeek,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SchedulePatch {
    #[serde(default)]
    pub user_id: Patch<String>,
    #[serde(default, alias = "room_number")]
    pub room_id: Patch<String>,
    #[serde(default)]
    pub day: Patch<DayOfWeek>,
    #[serde(default)]
    pub start_time: Patch<String>,
    #[serde(default)]
    pub end_time: Patch<String>,
    #[serde(default)]
    pub subject: Patch<String>,
}

fn check_window(entry: &ScheduleEntry) -> Result<(), AppError> {
    ScheduleWindow::validated(&entry.start_time, &entry.end_time)
        .map(|_| ())
        .map_err(|e| AppError::bad_request(e.to_string()))
}

fn clean_subject(subject: Option<String>) -> Option<String> {
    subject
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn require_user(state: &AppState, user_id: RecordId) -> Result<(), AppError> {
    match state.io("users.find", state.store.find_user(user_id)).await? {
        Some(_) => Ok(()),
        None => Err(AppError::new(
            StatusCode::NOT_FOUND,
            "user_not_found",
            format!("user {} not found", user_id),
        )),
    }
}

/// GET /schedule, optionally `?user_id=` filtered.
pub async fn list_schedule(
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<Json<Vec<ScheduleEntry>>> {
    debug!("Handling GET /schedule");
    let user_id = query
        .user_id
        .as_deref()
        .map(|raw| parse_id("user", raw))
        .transpose()?;
    let entries = state
        .io("schedule.list", state.store.list_schedule(user_id))
        .await?;
    Ok(Json(entries))
}

/// POST /schedule. A second entry for the same (user, room, day) is a 409.
pub async fn create_entry(
    State(state): State<AppState>,
    Json(body): Json<NewScheduleEntry>,
) -> AppResult<(StatusCode, Json<ScheduleEntry>)> {
    let entry = ScheduleEntry {
        id: RecordId::new(),
        user_id: parse_id("user", &body.user_id)?,
        room_id: required_text("room_id", &body.room_id)?,
        day: body.day,
        start_time: body.start_time.trim().to_string(),
        end_time: body.end_time.trim().to_string(),
        subject: clean_subject(body.subject),
    };
    check_window(&entry)?;
    require_user(&state, entry.user_id).await?;

    state
        .io("schedule.insert", state.store.insert_schedule_entry(entry.clone()))
        .await?;
    info!(
        event = "schedule.created",
        entry_id = %entry.id,
        user_id = %entry.user_id,
        room_id = %entry.room_id,
        day = %entry.day,
        "Schedule entry created"
    );

    Ok((StatusCode::CREATED, Json(entry)))
}

/// PUT /schedule/:id
pub async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<SchedulePatch>,
) -> AppResult<Json<ScheduleEntry>> {
    let id = parse_id("schedule entry", &id)?;
    let mut entry = state
        .io("schedule.get", state.store.get_schedule_entry(id))
        .await?
        .ok_or_else(|| AppError::not_found(format!("schedule entry {} not found", id)))?;

    match patch.user_id {
        Patch::Absent => {}
        Patch::Clear => return Err(AppError::bad_request("user_id cannot be null")),
        Patch::Set(raw) => {
            entry.user_id = parse_id("user", &raw)?;
            require_user(&state, entry.user_id).await?;
        }
    }
    patch.room_id.apply_text("room_id", &mut entry.room_id)?;
    patch.day.apply_required("day", &mut entry.day)?;
    patch.start_time.apply_text("start_time", &mut entry.start_time)?;
    patch.end_time.apply_text("end_time", &mut entry.end_time)?;
    patch.subject.apply_optional(&mut entry.subject);
    entry.subject = clean_subject(entry.subject);
    check_window(&entry)?;

    state
        .io("schedule.update", state.store.update_schedule_entry(entry.clone()))
        .await?;
    info!(event = "schedule.updated", entry_id = %entry.id, "Schedule entry updated");

    Ok(Json(entry))
}

/// DELETE /schedule/:id
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id("schedule entry", &id)?;
    state
        .io("schedule.delete", state.store.delete_schedule_entry(id))
        .await?;
    info!(event = "schedule.deleted", entry_id = %id, "Schedule entry deleted");
    Ok(Json(json!({ "deleted": id })))
}
