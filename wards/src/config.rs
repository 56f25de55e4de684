use chrono_tz::Tz;
use std::time::Duration;

use crate::schedule::{parse_timezone, ScheduleError};

pub const DEFAULT_TIMEZONE: &str = "Asia/Almaty";
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 3_000;

/// Settings fixed at startup and shared by every decision.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Zone all schedules are written and evaluated in.
    pub timezone: Tz,
    /// Upper bound for each store call and audit write.
    pub io_timeout: Duration,
}

impl EngineConfig {
    /// The timezone is resolved here, once, so a bad zone name fails at
    /// startup instead of on the first access check.
    pub fn new(timezone: &str, io_timeout: Duration) -> Result<Self, ScheduleError> {
        Ok(Self {
            timezone: parse_timezone(timezone)?,
            io_timeout,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Almaty,
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        }
    }
}
