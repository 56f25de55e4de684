//! /logs admin routes over the audit trail.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::{debug, info};
use wards::{AuditEntry, AuditEventType, AuditSink};

use super::parse_id;
use crate::patch::required_text;
use crate::{AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct NewLogEntry {
    pub event_type: String,
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// GET /logs, newest first.
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    debug!("Handling GET /logs");
    let entries = state
        .io("audit.list", state.store.list_audit(query.limit))
        .await?;
    Ok(Json(entries))
}

/// POST /logs. Unlike engine-side audit writes, a failure here is returned
/// to the caller.
pub async fn create_log(
    State(state): State<AppState>,
    Json(body): Json<NewLogEntry>,
) -> AppResult<(StatusCode, Json<AuditEntry>)> {
    let event_type = AuditEventType::from(required_text("event_type", &body.event_type)?);
    let message = required_text("message", &body.message)?;
    let user_id = body
        .user_id
        .as_deref()
        .map(|raw| parse_id("user", raw))
        .transpose()?;

    let entry = AuditEntry::new(event_type, message, user_id);
    state
        .io("audit.append", state.store.append(entry.clone()))
        .await?;
    info!(event = "audit.posted", audit_id = %entry.id, event_type = %entry.event_type, "Audit entry posted");

    Ok((StatusCode::CREATED, Json(entry)))
}
