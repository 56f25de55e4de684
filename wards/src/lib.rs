//! Access decision engine for facility doors.
//!
//! Combines per-user room grants with a weekly schedule evaluated in one
//! organizational timezone, and records every denial in an audit trail.

pub mod audit;
pub mod config;
pub mod decision;
pub mod engine;
pub mod model;
pub mod permissions;
pub mod schedule;
pub mod store;

pub use audit::AuditLogger;
pub use config::EngineConfig;
pub use decision::{AccessError, Decision, DenyReason, ErrorClass, Outcome};
pub use engine::AccessEngine;
pub use model::{AuditEntry, AuditEventType, RecordId, Role, Room, ScheduleEntry, User};
pub use schedule::{DayOfWeek, ScheduleError, ScheduleWindow};
pub use store::{AuditSink, ScheduleBook, StoreError, UserDirectory};
