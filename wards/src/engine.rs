use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::audit::AuditLogger;
use crate::config::EngineConfig;
use crate::decision::{AccessError, Decision, DenyReason, Outcome};
use crate::model::{RecordId, ScheduleEntry, User};
use crate::permissions::RoomPermissions;
use crate::schedule::{DayOfWeek, ScheduleWindow};
use crate::store::{bounded, ScheduleBook, UserDirectory};

const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Decides whether a user may enter a room at a given instant.
///
/// Evaluation runs three ordered stages, each of which may end in a denial:
/// room permission, schedule lookup for the local weekday, then the
/// schedule's time window. Every denial writes exactly one audit entry;
/// allowed checks write none. The engine holds no mutable state and may be
/// shared freely across tasks.
#[derive(Clone)]
pub struct AccessEngine {
    users: Arc<dyn UserDirectory>,
    schedules: Arc<dyn ScheduleBook>,
    audit: AuditLogger,
    config: EngineConfig,
}

impl AccessEngine {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        schedules: Arc<dyn ScheduleBook>,
        audit: AuditLogger,
        config: EngineConfig,
    ) -> Self {
        Self {
            users,
            schedules,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    #[instrument(skip(self))]
    pub async fn decide(
        &self,
        user_id: &str,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, AccessError> {
        let user_id =
            RecordId::parse(user_id).map_err(|_| AccessError::InvalidUserId(user_id.to_string()))?;
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(AccessError::MissingRoom);
        }

        let timeout = self.config.io_timeout;
        let user = bounded("users.find", timeout, self.users.find_user(user_id))
            .await?
            .ok_or(AccessError::UserNotFound(user_id))?;

        if !RoomPermissions::expand(&user.permitted_rooms).permits(room_id) {
            let detail = format!(
                "User {} attempted to access room {} without permission ({})",
                user.name,
                room_id,
                now.with_timezone(&self.config.timezone)
                    .format(TIME_OF_DAY_FORMAT)
            );
            return Ok(self
                .deny(&user, room_id, now, DenyReason::NoRoomPermission, detail)
                .await);
        }

        let tz = self.config.timezone;
        let day = DayOfWeek::at(now, &tz);
        let entry = bounded(
            "schedule.find",
            timeout,
            self.schedules.find_schedule_entry(user.id, room_id, day),
        )
        .await?;

        let Some(entry) = entry else {
            let detail = format!(
                "User {} attempted to enter room {} without a schedule for {} ({})",
                user.name,
                room_id,
                day,
                now.with_timezone(&tz).format(TIME_OF_DAY_FORMAT)
            );
            return Ok(self
                .deny(&user, room_id, now, DenyReason::NoScheduleForDay, detail)
                .await);
        };

        let window = ScheduleWindow::parse(&entry.start_time, &entry.end_time)
            .map_err(|source| corrupt(&entry, source))?;
        let inside = window
            .contains(now, &tz)
            .map_err(|source| corrupt(&entry, source))?;

        if !inside {
            let detail = format!(
                "User {} attempted to enter room {} at a disallowed time ({}). Permitted window: {}",
                user.name,
                room_id,
                now.with_timezone(&tz).format(TIME_OF_DAY_FORMAT),
                window
            );
            return Ok(self
                .deny(&user, room_id, now, DenyReason::OutsideScheduleWindow, detail)
                .await);
        }

        info!(
            event = "access.allowed",
            user_id = %user.id,
            room_id = %room_id,
            day = %day,
            "Access allowed"
        );
        counter!("doorward_access_decisions_total", 1,
            "outcome" => "allow",
            "reason" => "none"
        );

        Ok(Decision {
            outcome: Outcome::Allow,
            reason: None,
            detail: None,
            user_id: user.id,
            user_name: user.name,
            room_id: room_id.to_string(),
            subject: entry.subject,
            evaluated_at: now,
        })
    }

    async fn deny(
        &self,
        user: &User,
        room_id: &str,
        now: DateTime<Utc>,
        reason: DenyReason,
        detail: String,
    ) -> Decision {
        warn!(
            event = "access.denied",
            user_id = %user.id,
            room_id = %room_id,
            reason = reason.code(),
            "{}", detail
        );
        counter!("doorward_access_decisions_total", 1,
            "outcome" => "deny",
            "reason" => reason.code()
        );

        self.audit
            .log_event_at(reason.audit_event(), detail.clone(), Some(user.id), now)
            .await;

        Decision {
            outcome: Outcome::Deny,
            reason: Some(reason),
            detail: Some(detail),
            user_id: user.id,
            user_name: user.name.clone(),
            room_id: room_id.to_string(),
            subject: None,
            evaluated_at: now,
        }
    }
}

fn corrupt(entry: &ScheduleEntry, source: crate::schedule::ScheduleError) -> AccessError {
    AccessError::CorruptSchedule {
        entry_id: entry.id,
        source,
    }
}
