//! POST /login for the admin panel.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wards::AuditEventType;

use super::users::UserView;
use crate::password::verify_password;
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or phone number.
    #[serde(alias = "login", alias = "email", alias = "phone")]
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in_hours: i64,
    pub user: UserView,
}

fn invalid_credentials() -> AppError {
    AppError::new(
        StatusCode::UNAUTHORIZED,
        "invalid_credentials",
        "Invalid login or password",
    )
}

/// Only administrators receive a token. Any other role with valid
/// credentials gets 403 and an `admin_access_denied` audit entry.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let identifier = body.identifier.trim().to_string();
    if identifier.is_empty() || body.password.is_empty() {
        return Err(AppError::bad_request("identifier and password are required"));
    }
    debug!("Handling POST /login for {}", identifier);

    let Some(user) = state
        .io("users.find_by_login", state.store.find_user_by_login(&identifier))
        .await?
    else {
        warn!(event = "auth.login_failed", "Login attempt for unknown identifier");
        return Err(invalid_credentials());
    };

    let stored_hash = user.password_hash.clone();
    let password = body.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::internal(format!("password check aborted: {}", e)))?;
    if !verified {
        warn!(event = "auth.login_failed", user_id = %user.id, "Wrong password");
        return Err(invalid_credentials());
    }

    if !user.role.is_administrator() {
        state
            .audit(
                AuditEventType::AdminAccessDenied,
                format!(
                    "User {} with role {} attempted to sign in to the admin panel",
                    user.name, user.role
                ),
                Some(user.id),
            )
            .await;
        return Err(AppError::forbidden("Administrator role required"));
    }

    let token = state
        .jwt_config
        .issue(&user)
        .map_err(|e| AppError::internal(e.to_string()))?;

    info!(event = "auth.login", user_id = %user.id, "Administrator signed in");
    Ok(Json(LoginResponse {
        token,
        expires_in_hours: state.jwt_config.ttl.num_hours(),
        user: UserView::from(&user),
    }))
}
