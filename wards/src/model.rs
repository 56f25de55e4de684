//! Records the access engine reads: users, rooms, schedule entries and
//! audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::schedule::DayOfWeek;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed identifier: {0}")]
pub struct InvalidRecordId(pub String);

/// Opaque unique key shared by every record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidRecordId> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| InvalidRecordId(raw.to_string()))
    }

    /// Lowercase hyphenated form, stable across store backends.
    pub fn as_key(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for RecordId {
    type Err = InvalidRecordId;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0} (expected administrator, teacher or staff)")]
pub struct InvalidRole(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Teacher,
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Teacher => "teacher",
            Role::Staff => "staff",
        }
    }

    pub fn is_administrator(self) -> bool {
        self == Role::Administrator
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "administrator" | "admin" => Ok(Role::Administrator),
            "teacher" => Ok(Role::Teacher),
            "staff" => Ok(Role::Staff),
            _ => Err(InvalidRole(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub name: String,
    /// Email or phone number used at login.
    pub login: String,
    /// Identifier of the physical key or card issued to the user.
    pub key_id: String,
    pub role: Role,
    /// Room tokens; entries may be comma-packed and may hold the `*` wildcard.
    #[serde(default)]
    pub permitted_rooms: Vec<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RecordId,
    pub room_number: String,
    #[serde(default)]
    pub floor: i32,
    #[serde(default)]
    pub access_controller_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: RecordId,
    pub user_id: RecordId,
    pub room_id: String,
    pub day: DayOfWeek,
    /// `HH:MM` or `HH:MM:SS` in the organization timezone.
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub subject: Option<String>,
}

/// Audit event types. Unknown strings round-trip through [`AuditEventType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuditEventType {
    UnauthorizedDoorAccess,
    UnauthorizedScheduleAccess,
    UnauthorizedTimeAccess,
    AdminAccessDenied,
    RoomGrantAll,
    RoomGrantRevoked,
    Other(String),
}

impl AuditEventType {
    pub fn as_str(&self) -> &str {
        match self {
            AuditEventType::UnauthorizedDoorAccess => "unauthorized_door_access",
            AuditEventType::UnauthorizedScheduleAccess => "unauthorized_schedule_access",
            AuditEventType::UnauthorizedTimeAccess => "unauthorized_time_access",
            AuditEventType::AdminAccessDenied => "admin_access_denied",
            AuditEventType::RoomGrantAll => "room_grant_all",
            AuditEventType::RoomGrantRevoked => "room_grant_revoked",
            AuditEventType::Other(raw) => raw,
        }
    }
}

impl From<String> for AuditEventType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "unauthorized_door_access" => AuditEventType::UnauthorizedDoorAccess,
            "unauthorized_schedule_access" => AuditEventType::UnauthorizedScheduleAccess,
            "unauthorized_time_access" => AuditEventType::UnauthorizedTimeAccess,
            "admin_access_denied" => AuditEventType::AdminAccessDenied,
            "room_grant_all" => AuditEventType::RoomGrantAll,
            "room_grant_revoked" => AuditEventType::RoomGrantRevoked,
            _ => AuditEventType::Other(raw),
        }
    }
}

impl From<AuditEventType> for String {
    fn from(event_type: AuditEventType) -> Self {
        match event_type {
            AuditEventType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: RecordId,
    pub event_type: AuditEventType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<RecordId>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        event_type: AuditEventType,
        message: impl Into<String>,
        user_id: Option<RecordId>,
    ) -> Self {
        Self::at(event_type, message, user_id, Utc::now())
    }

    /// Entry stamped with the instant the event happened rather than when it
    /// is written.
    pub fn at(
        event_type: AuditEventType,
        message: impl Into<String>,
        user_id: Option<RecordId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            event_type,
            message: message.into(),
            user_id,
            timestamp,
        }
    }
}
