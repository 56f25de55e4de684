//! Read/append contracts the access engine depends on.
//!
//! Backends live outside this crate; the engine only sees these traits.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::model::{AuditEntry, RecordId, ScheduleEntry, User};
use crate::schedule::DayOfWeek;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record at {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{operation} timed out after {limit_ms}ms")]
    Timeout {
        operation: &'static str,
        limit_ms: u64,
    },
}

impl StoreError {
    /// Conflicts and missing records are caller mistakes; everything else
    /// means the backing store is unhealthy.
    pub fn is_internal(&self) -> bool {
        !matches!(self, StoreError::Conflict(_) | StoreError::NotFound(_))
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: RecordId) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait ScheduleBook: Send + Sync {
    /// First entry for `(user, room, day)`. Backends keep that triple unique.
    async fn find_schedule_entry(
        &self,
        user_id: RecordId,
        room_id: &str,
        day: DayOfWeek,
    ) -> Result<Option<ScheduleEntry>, StoreError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError>;
}

/// Run a store call under `limit`; expiry becomes [`StoreError::Timeout`].
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation,
            limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
