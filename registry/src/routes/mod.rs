//! HTTP route handlers for the Doorward API

pub mod access;
pub mod dashboard;
pub mod login;
pub mod logs;
pub mod rooms;
pub mod schedule;
pub mod users;

use wards::RecordId;

use crate::AppError;

/// Parse a path or body identifier, mapping failure to 400.
pub(crate) fn parse_id(what: &str, raw: &str) -> Result<RecordId, AppError> {
    RecordId::parse(raw).map_err(|_| AppError::bad_request(format!("malformed {} id: {}", what, raw)))
}
