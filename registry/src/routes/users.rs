//! /users admin routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use wards::permissions::{grant_all_rooms, revoke_all_rooms};
use wards::{AuditEventType, RecordId, Role, User, UserDirectory};

use super::parse_id;
use crate::password::{generate_key_id, hash_password};
use crate::patch::{required_text, Patch};
use crate::{AppError, AppResult, AppState};

/// A user as returned by the API; the password hash never leaves the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    pub id: RecordId,
    pub name: String,
    pub login: String,
    pub key_id: String,
    pub role: Role,
    pub permitted_rooms: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            login: user.login.clone(),
            key_id: user.key_id.clone(),
            role: user.role,
            permitted_rooms: user.permitted_rooms.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub login: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub permitted_rooms: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub login: Patch<String>,
    #[serde(default)]
    pub password: Patch<String>,
    #[serde(default)]
    pub role: Patch<Role>,
    #[serde(default)]
    pub permitted_rooms: Patch<Vec<String>>,
}

fn clean_rooms(rooms: Vec<String>) -> Vec<String> {
    rooms
        .into_iter()
        .map(|room| room.trim().to_string())
        .filter(|room| !room.is_empty())
        .collect()
}

async fn hash(password: String) -> Result<String, AppError> {
    if password.trim().is_empty() {
        return Err(AppError::bad_request("password must not be empty"));
    }
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::internal(format!("password hashing aborted: {}", e)))?
        .map_err(|e| AppError::internal(e.to_string()))
}

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserView>>> {
    debug!("Handling GET /users");
    let users = state.io("users.list", state.store.list_users()).await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

/// POST /users. Administrators receive the wildcard grant.
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let name = required_text("name", &body.name)?;
    let login = required_text("login", &body.login)?;
    let password_hash = hash(body.password).await?;

    let mut permitted_rooms = clean_rooms(body.permitted_rooms);
    let granted_all = body.role.is_administrator() && grant_all_rooms(&mut permitted_rooms);

    let now = Utc::now();
    let user = User {
        id: RecordId::new(),
        name,
        login,
        key_id: generate_key_id(),
        role: body.role,
        permitted_rooms,
        password_hash,
        created_at: now,
        updated_at: now,
    };

    state
        .io("users.insert", state.store.insert_user(user.clone()))
        .await?;
    info!(event = "user.created", user_id = %user.id, role = %user.role, "User created");

    if granted_all {
        state
            .audit(
                AuditEventType::RoomGrantAll,
                format!("Administrator {} was granted access to all rooms", user.name),
                Some(user.id),
            )
            .await;
    }

    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// PUT /users/:id
///
/// Promotion to administrator adds the wildcard grant. Demotion strips it
/// unless the same request sets `permitted_rooms`. Both are audited.
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UserPatch>,
) -> AppResult<Json<UserView>> {
    let id = parse_id("user", &id)?;
    let mut user = state
        .io("users.find", state.store.find_user(id))
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {} not found", id)))?;

    let previous_role = user.role;
    let rooms_supplied = !patch.permitted_rooms.is_absent();

    patch.name.apply_text("name", &mut user.name)?;
    patch.login.apply_text("login", &mut user.login)?;
    patch.role.apply_required("role", &mut user.role)?;
    match patch.permitted_rooms {
        Patch::Absent => {}
        Patch::Clear => user.permitted_rooms.clear(),
        Patch::Set(rooms) => user.permitted_rooms = clean_rooms(rooms),
    }
    match patch.password {
        Patch::Absent => {}
        Patch::Clear => return Err(AppError::bad_request("password cannot be null")),
        Patch::Set(password) => user.password_hash = hash(password).await?,
    }

    let mut grant_event = None;
    if user.role.is_administrator() {
        if grant_all_rooms(&mut user.permitted_rooms) {
            grant_event = Some((
                AuditEventType::RoomGrantAll,
                format!("Administrator {} was granted access to all rooms", user.name),
            ));
        }
    } else if previous_role.is_administrator()
        && !rooms_supplied
        && revoke_all_rooms(&mut user.permitted_rooms)
    {
        grant_event = Some((
            AuditEventType::RoomGrantRevoked,
            format!(
                "User {} lost access to all rooms after role change to {}",
                user.name, user.role
            ),
        ));
    }

    user.updated_at = Utc::now();
    state
        .io("users.update", state.store.update_user(user.clone()))
        .await?;
    info!(event = "user.updated", user_id = %user.id, "User updated");

    if let Some((event_type, message)) = grant_event {
        state.audit(event_type, message, Some(user.id)).await;
    }

    Ok(Json(UserView::from(&user)))
}

/// DELETE /users/:id, removing the user's schedule entries too.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id("user", &id)?;
    let removed = state.io("users.delete", state.store.delete_user(id)).await?;

    info!(
        event = "user.deleted",
        user_id = %id,
        schedule_entries_removed = removed,
        "User deleted"
    );
    Ok(Json(json!({ "deleted": id, "schedule_entries_removed": removed })))
}
