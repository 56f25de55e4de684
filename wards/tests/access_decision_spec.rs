use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wards::{
    AccessEngine, AccessError, AuditEntry, AuditEventType, AuditLogger, AuditSink, DayOfWeek,
    DenyReason, EngineConfig, ErrorClass, Outcome, RecordId, Role, ScheduleBook, ScheduleEntry,
    StoreError, User, UserDirectory,
};

/// In-memory fixture implementing every collaborator the engine reads.
#[derive(Default)]
struct Fixture {
    users: Mutex<Vec<User>>,
    schedules: Mutex<Vec<ScheduleEntry>>,
    audit: Mutex<Vec<AuditEntry>>,
    fail_audit: bool,
    stall_users: bool,
}

#[async_trait]
impl UserDirectory for Fixture {
    async fn find_user(&self, id: RecordId) -> Result<Option<User>, StoreError> {
        if self.stall_users {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }
}

#[async_trait]
impl ScheduleBook for Fixture {
    async fn find_schedule_entry(
        &self,
        user_id: RecordId,
        room_id: &str,
        day: DayOfWeek,
    ) -> Result<Option<ScheduleEntry>, StoreError> {
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.user_id == user_id && s.room_id == room_id && s.day == day)
            .cloned())
    }
}

#[async_trait]
impl AuditSink for Fixture {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        if self.fail_audit {
            return Err(StoreError::Unavailable("audit bucket offline".into()));
        }
        self.audit.lock().unwrap().push(entry);
        Ok(())
    }
}

impl Fixture {
    fn add_user(&self, name: &str, role: Role, rooms: &[&str]) -> RecordId {
        let id = RecordId::new();
        self.users.lock().unwrap().push(User {
            id,
            name: name.to_string(),
            login: format!("{}@example.edu", name.to_lowercase()),
            key_id: "00112233445566778899aabbccddeeff".to_string(),
            role,
            permitted_rooms: rooms.iter().map(|r| r.to_string()).collect(),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        id
    }

    fn add_schedule(&self, user_id: RecordId, room: &str, day: DayOfWeek, start: &str, end: &str) {
        self.schedules.lock().unwrap().push(ScheduleEntry {
            id: RecordId::new(),
            user_id,
            room_id: room.to_string(),
            day,
            start_time: start.to_string(),
            end_time: end.to_string(),
            subject: Some("Algorithms".to_string()),
        });
    }

    fn audit_len(&self) -> usize {
        self.audit.lock().unwrap().len()
    }
}

fn engine(fixture: &Arc<Fixture>) -> AccessEngine {
    // UTC keeps the wall-clock arithmetic in these tests obvious.
    let config = EngineConfig::new("UTC", Duration::from_millis(200)).unwrap();
    AccessEngine::new(
        fixture.clone(),
        fixture.clone(),
        AuditLogger::new(fixture.clone(), config.io_timeout),
        config,
    )
}

/// 2024-01-08 is a Monday.
fn monday_at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 8, h, m, s).unwrap()
}

#[tokio::test]
async fn wildcard_user_never_fails_permission_stage() {
    let fixture = Arc::new(Fixture::default());
    let admin = fixture.add_user("Aigerim", Role::Administrator, &["*"]);
    let engine = engine(&fixture);

    for room in ["101", "B-12", "server-room"] {
        let decision = engine
            .decide(&admin.to_string(), room, monday_at(12, 0, 0))
            .await
            .unwrap();
        assert_ne!(decision.reason, Some(DenyReason::NoRoomPermission));
        assert_eq!(decision.reason, Some(DenyReason::NoScheduleForDay));
    }
}

#[tokio::test]
async fn room_outside_grants_is_denied_regardless_of_schedule() {
    let fixture = Arc::new(Fixture::default());
    let user = fixture.add_user("Dana", Role::Teacher, &["101"]);
    // A schedule for a room the user holds no grant for must not help.
    fixture.add_schedule(user, "202", DayOfWeek::Monday, "00:00", "23:59");
    let engine = engine(&fixture);

    let decision = engine
        .decide(&user.to_string(), "202", monday_at(12, 0, 0))
        .await
        .unwrap();

    assert_eq!(decision.outcome, Outcome::Deny);
    assert_eq!(decision.reason, Some(DenyReason::NoRoomPermission));
    let audit = fixture.audit.lock().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event_type, AuditEventType::UnauthorizedDoorAccess);
    assert!(audit[0].message.contains("Dana"));
    assert!(audit[0].message.contains("202"));
    assert!(audit[0].message.contains("(12:00:00)"));
    assert_eq!(audit[0].timestamp, monday_at(12, 0, 0));
}

#[tokio::test]
async fn permitted_room_without_schedule_today_is_denied() {
    let fixture = Arc::new(Fixture::default());
    let user = fixture.add_user("Erlan", Role::Staff, &["101"]);
    fixture.add_schedule(user, "101", DayOfWeek::Tuesday, "09:00", "10:00");
    let engine = engine(&fixture);

    let decision = engine
        .decide(&user.to_string(), "101", monday_at(9, 30, 0))
        .await
        .unwrap();

    assert_eq!(decision.reason, Some(DenyReason::NoScheduleForDay));
    let audit = fixture.audit.lock().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event_type, AuditEventType::UnauthorizedScheduleAccess);
    assert_eq!(audit[0].user_id, Some(user));
    assert!(audit[0].message.contains("Monday"));
    assert!(audit[0].message.contains("(09:30:00)"));
    assert_eq!(audit[0].timestamp, monday_at(9, 30, 0));
}

#[tokio::test]
async fn window_boundaries_are_exclusive() {
    let fixture = Arc::new(Fixture::default());
    let user = fixture.add_user("Madina", Role::Teacher, &["101"]);
    fixture.add_schedule(user, "101", DayOfWeek::Monday, "09:00", "10:00");
    let engine = engine(&fixture);
    let id = user.to_string();

    let just_before = monday_at(8, 59, 59) + chrono::Duration::milliseconds(999);
    let cases = [
        (just_before, Outcome::Deny),
        (monday_at(9, 0, 0), Outcome::Deny),
        (monday_at(9, 30, 0), Outcome::Allow),
        (monday_at(10, 0, 0), Outcome::Deny),
    ];

    for (now, expected) in cases {
        let decision = engine.decide(&id, "101", now).await.unwrap();
        assert_eq!(decision.outcome, expected, "at {now}");
        if expected == Outcome::Deny {
            assert_eq!(decision.reason, Some(DenyReason::OutsideScheduleWindow));
        }
    }

    // three denials, one allow
    assert_eq!(fixture.audit_len(), 3);
    let audit = fixture.audit.lock().unwrap();
    assert!(audit[0].message.contains("09:00:00 - 10:00:00"));
    assert!(audit[0].message.contains("(08:59:59)"));
    assert_eq!(audit[0].timestamp, just_before);
    assert_eq!(audit[2].timestamp, monday_at(10, 0, 0));
}

#[tokio::test]
async fn legacy_times_without_seconds_match_explicit_form() {
    let fixture = Arc::new(Fixture::default());
    let legacy = fixture.add_user("Legacy", Role::Teacher, &["101"]);
    let explicit = fixture.add_user("Explicit", Role::Teacher, &["101"]);
    fixture.add_schedule(legacy, "101", DayOfWeek::Monday, "09:00", "10:00");
    fixture.add_schedule(explicit, "101", DayOfWeek::Monday, "09:00:00", "10:00:00");
    let engine = engine(&fixture);

    for now in [
        monday_at(8, 0, 0),
        monday_at(9, 0, 0),
        monday_at(9, 0, 1),
        monday_at(9, 59, 59),
        monday_at(10, 0, 0),
    ] {
        let a = engine.decide(&legacy.to_string(), "101", now).await.unwrap();
        let b = engine.decide(&explicit.to_string(), "101", now).await.unwrap();
        assert_eq!(a.outcome, b.outcome, "at {now}");
        assert_eq!(a.reason, b.reason, "at {now}");
    }
}

#[tokio::test]
async fn comma_packed_grant_covers_exactly_its_rooms() {
    let fixture = Arc::new(Fixture::default());
    let user = fixture.add_user("Packed", Role::Staff, &["101,102,103"]);
    let engine = engine(&fixture);
    let id = user.to_string();

    for room in ["101", "102", "103"] {
        let decision = engine.decide(&id, room, monday_at(12, 0, 0)).await.unwrap();
        assert_eq!(decision.reason, Some(DenyReason::NoScheduleForDay), "room {room}");
    }
    for room in ["104", "10", "101,102"] {
        let decision = engine.decide(&id, room, monday_at(12, 0, 0)).await.unwrap();
        assert_eq!(decision.reason, Some(DenyReason::NoRoomPermission), "room {room}");
    }
}

#[tokio::test]
async fn allow_writes_no_audit_and_carries_subject() {
    let fixture = Arc::new(Fixture::default());
    let user = fixture.add_user("Nurlan", Role::Teacher, &["101"]);
    fixture.add_schedule(user, "101", DayOfWeek::Monday, "08:00", "18:00");
    let engine = engine(&fixture);

    let decision = engine
        .decide(&user.to_string(), "101", monday_at(12, 0, 0))
        .await
        .unwrap();

    assert!(decision.is_allowed());
    assert_eq!(decision.user_name, "Nurlan");
    assert_eq!(decision.subject.as_deref(), Some("Algorithms"));
    assert_eq!(fixture.audit_len(), 0);
}

#[tokio::test]
async fn identical_inputs_yield_identical_decisions() {
    let fixture = Arc::new(Fixture::default());
    let user = fixture.add_user("Same", Role::Teacher, &["101"]);
    fixture.add_schedule(user, "101", DayOfWeek::Monday, "09:00", "10:00");
    let engine = engine(&fixture);
    let id = user.to_string();

    for now in [monday_at(9, 30, 0), monday_at(11, 0, 0)] {
        let first = engine.decide(&id, "101", now).await.unwrap();
        let second = engine.decide(&id, "101", now).await.unwrap();
        assert_eq!(first, second);
    }
}

#[tokio::test]
async fn audit_failure_does_not_change_decision() {
    let fixture = Arc::new(Fixture {
        fail_audit: true,
        ..Default::default()
    });
    let user = fixture.add_user("Quiet", Role::Teacher, &["101"]);
    let engine = engine(&fixture);

    let decision = engine
        .decide(&user.to_string(), "999", monday_at(12, 0, 0))
        .await
        .unwrap();
    assert_eq!(decision.reason, Some(DenyReason::NoRoomPermission));
}

#[tokio::test]
async fn client_errors_are_rejected_before_store_access() {
    let fixture = Arc::new(Fixture::default());
    let engine = engine(&fixture);

    let err = engine
        .decide("not-a-uuid", "101", monday_at(12, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidUserId(_)));
    assert_eq!(err.class(), ErrorClass::Client);

    let err = engine
        .decide(&RecordId::new().to_string(), "  ", monday_at(12, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::MissingRoom));
    assert_eq!(fixture.audit_len(), 0);
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let fixture = Arc::new(Fixture::default());
    let engine = engine(&fixture);
    let missing = RecordId::new();

    let err = engine
        .decide(&missing.to_string(), "101", monday_at(12, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::UserNotFound(id) if id == missing));
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[tokio::test(start_paused = true)]
async fn stalled_store_is_an_internal_error_not_a_denial() {
    let fixture = Arc::new(Fixture {
        stall_users: true,
        ..Default::default()
    });
    let user = fixture.add_user("Slow", Role::Teacher, &["101"]);
    let engine = engine(&fixture);

    let err = engine
        .decide(&user.to_string(), "101", monday_at(12, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::Store(StoreError::Timeout {
            operation: "users.find",
            ..
        })
    ));
    assert_eq!(err.class(), ErrorClass::Internal);
    assert_eq!(fixture.audit_len(), 0);
}

#[tokio::test]
async fn corrupt_schedule_time_is_an_internal_error() {
    let fixture = Arc::new(Fixture::default());
    let user = fixture.add_user("Broken", Role::Teacher, &["101"]);
    fixture.add_schedule(user, "101", DayOfWeek::Monday, "9 o'clock", "10:00");
    let engine = engine(&fixture);

    let err = engine
        .decide(&user.to_string(), "101", monday_at(9, 30, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::CorruptSchedule { .. }));
    assert_eq!(err.class(), ErrorClass::Internal);
    assert_eq!(fixture.audit_len(), 0);
}

#[tokio::test]
async fn weekday_is_taken_in_organization_timezone() {
    let fixture = Arc::new(Fixture::default());
    let user = fixture.add_user("Tz", Role::Teacher, &["101"]);
    fixture.add_schedule(user, "101", DayOfWeek::Tuesday, "03:00", "06:00");
    let config = EngineConfig::new("Asia/Tokyo", Duration::from_secs(1)).unwrap();
    let engine = AccessEngine::new(
        fixture.clone(),
        fixture.clone(),
        AuditLogger::new(fixture.clone(), config.io_timeout),
        config,
    );

    // Monday 19:00 UTC is Tuesday 04:00 in Tokyo (UTC+9, no DST).
    let decision = engine
        .decide(&user.to_string(), "101", monday_at(19, 0, 0))
        .await
        .unwrap();
    assert_eq!(decision.outcome, Outcome::Allow);
}
