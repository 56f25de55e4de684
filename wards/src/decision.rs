use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AuditEventType, RecordId};
use crate::schedule::ScheduleError;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allow,
    Deny,
}

/// Why an access check was denied. Each reason maps to one audit event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoRoomPermission,
    NoScheduleForDay,
    OutsideScheduleWindow,
}

impl DenyReason {
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::NoRoomPermission => "no_room_permission",
            DenyReason::NoScheduleForDay => "no_schedule_for_day",
            DenyReason::OutsideScheduleWindow => "outside_schedule_window",
        }
    }

    pub fn audit_event(self) -> AuditEventType {
        match self {
            DenyReason::NoRoomPermission => AuditEventType::UnauthorizedDoorAccess,
            DenyReason::NoScheduleForDay => AuditEventType::UnauthorizedScheduleAccess,
            DenyReason::OutsideScheduleWindow => AuditEventType::UnauthorizedTimeAccess,
        }
    }
}

/// Result of one access check. Not persisted; denials leave an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub user_id: RecordId,
    pub user_name: String,
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }
}

/// Broad class of an [`AccessError`], used to pick a transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before touching any store.
    Client,
    NotFound,
    /// The system is broken, as opposed to policy saying no.
    Internal,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("malformed user id: {0}")]
    InvalidUserId(String),

    #[error("room identifier is required")]
    MissingRoom,

    #[error("user {0} not found")]
    UserNotFound(RecordId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("schedule entry {entry_id} holds unusable data: {source}")]
    CorruptSchedule {
        entry_id: RecordId,
        #[source]
        source: ScheduleError,
    },
}

impl AccessError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AccessError::InvalidUserId(_) | AccessError::MissingRoom => ErrorClass::Client,
            AccessError::UserNotFound(_) => ErrorClass::NotFound,
            AccessError::Store(_) | AccessError::CorruptSchedule { .. } => ErrorClass::Internal,
        }
    }
}
