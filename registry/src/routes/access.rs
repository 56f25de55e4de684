//! GET /access/:user_id/room/:room_number, called by door controllers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::debug;
use wards::Decision;

use crate::{AppResult, AppState};

/// 200 with the decision when access is allowed, 403 with the decision and
/// its reason when denied. Client, lookup and store failures map through
/// [`crate::AppError`].
pub async fn check_access(
    State(state): State<AppState>,
    Path((user_id, room_number)): Path<(String, String)>,
) -> AppResult<(StatusCode, Json<Decision>)> {
    debug!("Handling GET /access/{}/room/{}", user_id, room_number);

    let decision = state
        .engine
        .decide(&user_id, &room_number, state.clock.now())
        .await?;

    let status = if decision.is_allowed() {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    };
    Ok((status, Json(decision)))
}
