//! In-process store guarded by a `tokio` RwLock.

use async_trait::async_trait;
use tokio::sync::RwLock;
use wards::{
    AuditEntry, AuditSink, DayOfWeek, RecordId, Room, ScheduleBook, ScheduleEntry, StoreError,
    User, UserDirectory,
};

use super::{
    login_key, login_taken, room_taken, schedule_not_found, slot_taken, user_not_found,
    RecordCounts, RecordStore,
};

#[derive(Default)]
struct Records {
    users: Vec<User>,
    rooms: Vec<Room>,
    schedule: Vec<ScheduleEntry>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_slot(a: &ScheduleEntry, b: &ScheduleEntry) -> bool {
    a.user_id == b.user_id && a.room_id == b.room_id && a.day == b.day
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: RecordId) -> Result<Option<User>, StoreError> {
        let records = self.records.read().await;
        Ok(records.users.iter().find(|u| u.id == id).cloned())
    }
}

#[async_trait]
impl ScheduleBook for MemoryStore {
    async fn find_schedule_entry(
        &self,
        user_id: RecordId,
        room_id: &str,
        day: DayOfWeek,
    ) -> Result<Option<ScheduleEntry>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .schedule
            .iter()
            .find(|s| s.user_id == user_id && s.room_id == room_id && s.day == day)
            .cloned())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.records.write().await.audit.push(entry);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.records.read().await.users.clone())
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let wanted = login_key(login);
        let records = self.records.read().await;
        Ok(records
            .users
            .iter()
            .find(|u| login_key(&u.login) == wanted)
            .cloned())
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let wanted = login_key(&user.login);
        if records.users.iter().any(|u| login_key(&u.login) == wanted) {
            return Err(login_taken(&user.login));
        }
        records.users.push(user);
        Ok(())
    }

    async fn update_user(&self, user: User) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let wanted = login_key(&user.login);
        if records
            .users
            .iter()
            .any(|u| u.id != user.id && login_key(&u.login) == wanted)
        {
            return Err(login_taken(&user.login));
        }
        let slot = records
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| user_not_found(user.id))?;
        *slot = user;
        Ok(())
    }

    async fn delete_user(&self, id: RecordId) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let before = records.users.len();
        records.users.retain(|u| u.id != id);
        if records.users.len() == before {
            return Err(user_not_found(id));
        }
        let scheduled = records.schedule.len();
        records.schedule.retain(|s| s.user_id != id);
        Ok(scheduled - records.schedule.len())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.records.read().await.rooms.clone())
    }

    async fn insert_rooms(&self, rooms: Vec<Room>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        for (i, room) in rooms.iter().enumerate() {
            let repeated = rooms[..i].iter().any(|r| r.room_number == room.room_number);
            if repeated || records.rooms.iter().any(|r| r.room_number == room.room_number) {
                return Err(room_taken(&room.room_number));
            }
        }
        records.rooms.extend(rooms);
        Ok(())
    }

    async fn list_schedule(
        &self,
        user_id: Option<RecordId>,
    ) -> Result<Vec<ScheduleEntry>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .schedule
            .iter()
            .filter(|s| user_id.map_or(true, |id| s.user_id == id))
            .cloned()
            .collect())
    }

    async fn get_schedule_entry(&self, id: RecordId) -> Result<Option<ScheduleEntry>, StoreError> {
        let records = self.records.read().await;
        Ok(records.schedule.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_schedule_entry(&self, entry: ScheduleEntry) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.schedule.iter().any(|s| same_slot(s, &entry)) {
            return Err(slot_taken(&entry));
        }
        records.schedule.push(entry);
        Ok(())
    }

    async fn update_schedule_entry(&self, entry: ScheduleEntry) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records
            .schedule
            .iter()
            .any(|s| s.id != entry.id && same_slot(s, &entry))
        {
            return Err(slot_taken(&entry));
        }
        let slot = records
            .schedule
            .iter_mut()
            .find(|s| s.id == entry.id)
            .ok_or_else(|| schedule_not_found(entry.id))?;
        *slot = entry;
        Ok(())
    }

    async fn delete_schedule_entry(&self, id: RecordId) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let before = records.schedule.len();
        records.schedule.retain(|s| s.id != id);
        if records.schedule.len() == before {
            return Err(schedule_not_found(id));
        }
        Ok(())
    }

    async fn list_audit(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>, StoreError> {
        let records = self.records.read().await;
        let mut entries = records.audit.clone();
        // stable: equal timestamps keep reverse insertion order
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit.unwrap_or(usize::MAX));
        Ok(entries)
    }

    async fn counts(&self) -> Result<RecordCounts, StoreError> {
        let records = self.records.read().await;
        Ok(RecordCounts {
            users: records.users.len(),
            rooms: records.rooms.len(),
            schedule_entries: records.schedule.len(),
            audit_entries: records.audit.len(),
        })
    }
}
