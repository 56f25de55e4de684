//! JetStream KV record store
//!
//! Key layout:
//! - `users.<id>`, `rooms.<id>`, `schedule.<id>`: JSON records
//! - `logins.<hex(login)>`, `room_numbers.<hex(number)>`: id of the owning record
//! - `schedule_idx.<user>.<hex(room)>.<Day>`: id of the schedule entry for that slot
//! - `audit.<unix_nanos>.<id>`: JSON audit entries, zero-padded so keys sort by time
//!
//! Index keys are claimed with a revision-checked `update`: revision 0 for a
//! key never written, the tombstone's revision for a key that was deleted.
//! Either fails when another writer got there first, which keeps logins,
//! room numbers and schedule slots unique across concurrent writers.

use anyhow::Result;
use async_nats::jetstream::{
    self,
    kv::{Operation, Store},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};
use wards::{
    AuditEntry, AuditSink, DayOfWeek, RecordId, Room, ScheduleBook, ScheduleEntry, StoreError,
    User, UserDirectory,
};

use super::{
    login_key, login_taken, room_taken, schedule_not_found, slot_taken, user_not_found,
    RecordCounts, RecordStore,
};

const USERS: &str = "users.";
const LOGINS: &str = "logins.";
const ROOMS: &str = "rooms.";
const ROOM_NUMBERS: &str = "room_numbers.";
const SCHEDULE: &str = "schedule.";
const SCHEDULE_IDX: &str = "schedule_idx.";
const AUDIT: &str = "audit.";

fn user_key(id: RecordId) -> String {
    format!("{}{}", USERS, id.as_key())
}

fn login_index_key(login: &str) -> String {
    format!("{}{}", LOGINS, hex::encode(login_key(login)))
}

fn room_key(id: RecordId) -> String {
    format!("{}{}", ROOMS, id.as_key())
}

fn room_number_key(room_number: &str) -> String {
    format!("{}{}", ROOM_NUMBERS, hex::encode(room_number))
}

fn schedule_key(id: RecordId) -> String {
    format!("{}{}", SCHEDULE, id.as_key())
}

fn slot_key(user_id: RecordId, room_id: &str, day: DayOfWeek) -> String {
    format!(
        "{}{}.{}.{}",
        SCHEDULE_IDX,
        user_id.as_key(),
        hex::encode(room_id),
        day.as_str()
    )
}

fn entry_slot_key(entry: &ScheduleEntry) -> String {
    slot_key(entry.user_id, &entry.room_id, entry.day)
}

fn audit_key(entry: &AuditEntry) -> String {
    let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or_default().max(0);
    format!("{}{:020}.{}", AUDIT, nanos, entry.id.as_key())
}

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// JetStream KV-backed [`RecordStore`].
#[derive(Clone)]
pub struct KvStore {
    kv_store: Store,
}

impl KvStore {
    /// Connect and get or create the bucket.
    pub async fn connect(nats_url: &str, bucket_name: &str, creds_path: Option<&str>) -> Result<Self> {
        info!(
            "Connecting to NATS at {} for KV operations (bucket: {})",
            nats_url, bucket_name
        );

        let client = if let Some(creds_path) = creds_path {
            info!("Using credentials file: {}", creds_path);
            async_nats::ConnectOptions::new()
                .credentials_file(creds_path)
                .await?
                .connect(nats_url)
                .await?
        } else {
            warn!("No NATS credentials provided, connecting without auth");
            async_nats::connect(nats_url).await?
        };

        let jetstream = jetstream::new(client);

        let kv_store = match jetstream.get_key_value(bucket_name).await {
            Ok(store) => {
                info!("Using existing KV bucket: {}", bucket_name);
                store
            }
            Err(_) => {
                info!("Creating new KV bucket: {}", bucket_name);
                let config = jetstream::kv::Config {
                    bucket: bucket_name.to_string(),
                    description: "Doorward users, rooms, schedules and audit log".to_string(),
                    history: 1,
                    ..Default::default()
                };
                jetstream.create_key_value(config).await?
            }
        };

        Ok(Self { kv_store })
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.kv_store.get(key).await.map_err(unavailable)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.kv_store
            .put(key, bytes.into())
            .await
            .map_err(unavailable)?;
        debug!("Stored KV key: {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.kv_store.delete(key).await.map_err(unavailable)?;
        debug!("Deleted KV key: {}", key);
        Ok(())
    }

    /// Claim an index key for `owner`. `Ok(false)` when another record holds it.
    async fn claim(&self, key: &str, owner: RecordId) -> Result<bool, StoreError> {
        if self
            .kv_store
            .update(key, owner.as_key().into_bytes().into(), 0)
            .await
            .is_ok()
        {
            return Ok(true);
        }

        match self.kv_store.entry(key).await.map_err(unavailable)? {
            Some(entry) if matches!(entry.operation, Operation::Delete | Operation::Purge) => {
                // freed by an earlier delete
                match self
                    .kv_store
                    .update(key, owner.as_key().into_bytes().into(), entry.revision)
                    .await
                {
                    Ok(_) => Ok(true),
                    Err(e) => {
                        debug!("Lost race re-claiming {}: {}", key, e);
                        Ok(self.index_owner(key).await? == Some(owner))
                    }
                }
            }
            // re-claiming our own index is fine
            Some(_) => Ok(self.index_owner(key).await? == Some(owner)),
            None => Err(StoreError::Unavailable(format!(
                "could not claim KV key {}",
                key
            ))),
        }
    }

    async fn index_owner(&self, key: &str) -> Result<Option<RecordId>, StoreError> {
        let Some(bytes) = self.kv_store.get(key).await.map_err(unavailable)? else {
            return Ok(None);
        };
        let raw = String::from_utf8_lossy(&bytes);
        RecordId::parse(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = self.kv_store.keys().await.map_err(unavailable)?.boxed();
        let mut matched = Vec::new();
        while let Some(key) = keys.next().await {
            let key = key.map_err(unavailable)?;
            if key.starts_with(prefix) {
                matched.push(key);
            }
        }
        Ok(matched)
    }

    /// Every record under `prefix`. Unreadable records are skipped with a warning.
    async fn read_all<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        let mut records = Vec::new();
        for key in self.keys_with_prefix(prefix).await? {
            match self.read::<T>(&key).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(StoreError::Corrupt { key, message }) => {
                    warn!("Skipping unreadable record {}: {}", key, message);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    async fn delete_entry(&self, entry: &ScheduleEntry) -> Result<(), StoreError> {
        self.remove(&schedule_key(entry.id)).await?;
        self.remove(&entry_slot_key(entry)).await
    }
}

#[async_trait]
impl UserDirectory for KvStore {
    async fn find_user(&self, id: RecordId) -> Result<Option<User>, StoreError> {
        self.read(&user_key(id)).await
    }
}

#[async_trait]
impl ScheduleBook for KvStore {
    async fn find_schedule_entry(
        &self,
        user_id: RecordId,
        room_id: &str,
        day: DayOfWeek,
    ) -> Result<Option<ScheduleEntry>, StoreError> {
        let Some(entry_id) = self.index_owner(&slot_key(user_id, room_id, day)).await? else {
            return Ok(None);
        };
        let entry = self.read::<ScheduleEntry>(&schedule_key(entry_id)).await?;
        if entry.is_none() {
            warn!(
                "Schedule index for {}/{}/{} points at missing entry {}",
                user_id, room_id, day, entry_id
            );
        }
        Ok(entry)
    }
}

#[async_trait]
impl AuditSink for KvStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.write(&audit_key(&entry), &entry).await
    }
}

#[async_trait]
impl RecordStore for KvStore {
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.read_all(USERS).await?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        match self.index_owner(&login_index_key(login)).await? {
            Some(id) => self.find_user(id).await,
            None => Ok(None),
        }
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let index = login_index_key(&user.login);
        if !self.claim(&index, user.id).await? {
            return Err(login_taken(&user.login));
        }
        if let Err(e) = self.write(&user_key(user.id), &user).await {
            let _ = self.remove(&index).await;
            return Err(e);
        }
        info!("Stored user {}", user.id);
        Ok(())
    }

    async fn update_user(&self, user: User) -> Result<(), StoreError> {
        let existing = self
            .find_user(user.id)
            .await?
            .ok_or_else(|| user_not_found(user.id))?;

        let old_index = login_index_key(&existing.login);
        let new_index = login_index_key(&user.login);
        if old_index != new_index && !self.claim(&new_index, user.id).await? {
            return Err(login_taken(&user.login));
        }

        self.write(&user_key(user.id), &user).await?;
        if old_index != new_index {
            self.remove(&old_index).await?;
        }
        Ok(())
    }

    async fn delete_user(&self, id: RecordId) -> Result<usize, StoreError> {
        let user = self
            .find_user(id)
            .await?
            .ok_or_else(|| user_not_found(id))?;

        let entries = self.list_schedule(Some(id)).await?;
        for entry in &entries {
            self.delete_entry(entry).await?;
        }

        self.remove(&user_key(id)).await?;
        self.remove(&login_index_key(&user.login)).await?;
        info!("Deleted user {} and {} schedule entries", id, entries.len());
        Ok(entries.len())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let mut rooms: Vec<Room> = self.read_all(ROOMS).await?;
        rooms.sort_by(|a, b| a.room_number.cmp(&b.room_number));
        Ok(rooms)
    }

    async fn insert_rooms(&self, rooms: Vec<Room>) -> Result<(), StoreError> {
        let mut claimed = Vec::with_capacity(rooms.len());
        for room in &rooms {
            let index = room_number_key(&room.room_number);
            match self.claim(&index, room.id).await {
                Ok(true) => claimed.push(index),
                outcome => {
                    for index in &claimed {
                        let _ = self.remove(index).await;
                    }
                    return Err(match outcome {
                        Err(e) => e,
                        _ => room_taken(&room.room_number),
                    });
                }
            }
        }

        for room in &rooms {
            self.write(&room_key(room.id), room).await?;
        }
        info!("Stored {} rooms", rooms.len());
        Ok(())
    }

    async fn list_schedule(
        &self,
        user_id: Option<RecordId>,
    ) -> Result<Vec<ScheduleEntry>, StoreError> {
        let entries: Vec<ScheduleEntry> = self.read_all(SCHEDULE).await?;
        Ok(entries
            .into_iter()
            .filter(|s| user_id.map_or(true, |id| s.user_id == id))
            .collect())
    }

    async fn get_schedule_entry(&self, id: RecordId) -> Result<Option<ScheduleEntry>, StoreError> {
        self.read(&schedule_key(id)).await
    }

    async fn insert_schedule_entry(&self, entry: ScheduleEntry) -> Result<(), StoreError> {
        let index = entry_slot_key(&entry);
        if !self.claim(&index, entry.id).await? {
            return Err(slot_taken(&entry));
        }
        if let Err(e) = self.write(&schedule_key(entry.id), &entry).await {
            let _ = self.remove(&index).await;
            return Err(e);
        }
        Ok(())
    }

    async fn update_schedule_entry(&self, entry: ScheduleEntry) -> Result<(), StoreError> {
        let existing = self
            .get_schedule_entry(entry.id)
            .await?
            .ok_or_else(|| schedule_not_found(entry.id))?;

        let old_index = entry_slot_key(&existing);
        let new_index = entry_slot_key(&entry);
        if old_index != new_index && !self.claim(&new_index, entry.id).await? {
            return Err(slot_taken(&entry));
        }

        self.write(&schedule_key(entry.id), &entry).await?;
        if old_index != new_index {
            self.remove(&old_index).await?;
        }
        Ok(())
    }

    async fn delete_schedule_entry(&self, id: RecordId) -> Result<(), StoreError> {
        let entry = self
            .get_schedule_entry(id)
            .await?
            .ok_or_else(|| schedule_not_found(id))?;
        self.delete_entry(&entry).await
    }

    async fn list_audit(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>, StoreError> {
        let mut keys = self.keys_with_prefix(AUDIT).await?;
        keys.sort_unstable_by(|a, b| b.cmp(a));
        keys.truncate(limit.unwrap_or(usize::MAX));

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.read::<AuditEntry>(&key).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn counts(&self) -> Result<RecordCounts, StoreError> {
        let mut counts = RecordCounts::default();
        let mut keys = self.kv_store.keys().await.map_err(unavailable)?.boxed();
        while let Some(key) = keys.next().await {
            let key = key.map_err(unavailable)?;
            if key.starts_with(USERS) {
                counts.users += 1;
            } else if key.starts_with(ROOMS) {
                counts.rooms += 1;
            } else if key.starts_with(SCHEDULE) {
                counts.schedule_entries += 1;
            } else if key.starts_with(AUDIT) {
                counts.audit_entries += 1;
            }
        }
        Ok(counts)
    }
}
