//! Record stores behind the admin API and the access engine.
//!
//! Two backends: JetStream KV for deployments, an in-memory map for tests and
//! local development. Both enforce the same uniqueness rules.

pub mod kv;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use wards::{
    AuditEntry, AuditSink, RecordId, Room, ScheduleBook, ScheduleEntry, StoreError, User,
    UserDirectory,
};

pub use kv::KvStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub users: usize,
    pub rooms: usize,
    pub schedule_entries: usize,
    pub audit_entries: usize,
}

/// Full CRUD surface over users, rooms, schedule entries and audit entries.
///
/// Uniqueness rules: user `login`, room `room_number`, and schedule
/// `(user_id, room_id, day)`. Violations surface as [`StoreError::Conflict`];
/// updates and deletes of unknown ids as [`StoreError::NotFound`].
#[async_trait]
pub trait RecordStore: UserDirectory + ScheduleBook + AuditSink + Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;
    async fn insert_user(&self, user: User) -> Result<(), StoreError>;
    async fn update_user(&self, user: User) -> Result<(), StoreError>;
    /// Removes the user and every schedule entry that references them.
    /// Returns the number of schedule entries removed.
    async fn delete_user(&self, id: RecordId) -> Result<usize, StoreError>;

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;
    /// All-or-nothing: a duplicate room number rejects the whole batch.
    async fn insert_rooms(&self, rooms: Vec<Room>) -> Result<(), StoreError>;

    async fn list_schedule(&self, user_id: Option<RecordId>)
        -> Result<Vec<ScheduleEntry>, StoreError>;
    async fn get_schedule_entry(&self, id: RecordId) -> Result<Option<ScheduleEntry>, StoreError>;
    async fn insert_schedule_entry(&self, entry: ScheduleEntry) -> Result<(), StoreError>;
    async fn update_schedule_entry(&self, entry: ScheduleEntry) -> Result<(), StoreError>;
    async fn delete_schedule_entry(&self, id: RecordId) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_audit(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>, StoreError>;

    async fn counts(&self) -> Result<RecordCounts, StoreError>;
}

pub(crate) fn user_not_found(id: RecordId) -> StoreError {
    StoreError::NotFound(format!("user {}", id))
}

pub(crate) fn schedule_not_found(id: RecordId) -> StoreError {
    StoreError::NotFound(format!("schedule entry {}", id))
}

pub(crate) fn login_taken(login: &str) -> StoreError {
    StoreError::Conflict(format!("login {} is already in use", login))
}

pub(crate) fn room_taken(room_number: &str) -> StoreError {
    StoreError::Conflict(format!("room {} already exists", room_number))
}

pub(crate) fn slot_taken(entry: &ScheduleEntry) -> StoreError {
    StoreError::Conflict(format!(
        "user {} already has a schedule for room {} on {}",
        entry.user_id, entry.room_id, entry.day
    ))
}

/// Logins compare case-insensitively (emails) and ignore surrounding space.
pub(crate) fn login_key(login: &str) -> String {
    login.trim().to_lowercase()
}
