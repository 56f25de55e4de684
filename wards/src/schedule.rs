use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const WALL_CLOCK_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("Invalid time format: {0} (expected HH:MM or HH:MM:SS)")]
    InvalidTimeFormat(String),
    #[error("Invalid weekday: {0}")]
    InvalidWeekday(String),
    #[error("Schedule window {start} - {end} is empty (start must be before end)")]
    EmptyWindow { start: String, end: String },
    #[error("Local time {0} does not exist in the organization timezone")]
    NonexistentLocalTime(String),
}

/// Day of the week a schedule entry applies to.
///
/// Serialized as the full English name ("Monday"); parsing also accepts the
/// three-letter form and is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }

    /// Weekday of `now` as observed in `tz`.
    pub fn at(now: DateTime<Utc>, tz: &Tz) -> Self {
        now.with_timezone(tz).weekday().into()
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = ScheduleError;

    fn from_str(day: &str) -> Result<Self, Self::Err> {
        parse_weekday(day)
    }
}

impl Serialize for DayOfWeek {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DayOfWeek {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_weekday(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse weekday string to a [`DayOfWeek`]
fn parse_weekday(day: &str) -> Result<DayOfWeek, ScheduleError> {
    match day.trim().to_lowercase().as_str() {
        "mon" | "monday" => Ok(DayOfWeek::Monday),
        "tue" | "tuesday" => Ok(DayOfWeek::Tuesday),
        "wed" | "wednesday" => Ok(DayOfWeek::Wednesday),
        "thu" | "thursday" => Ok(DayOfWeek::Thursday),
        "fri" | "friday" => Ok(DayOfWeek::Friday),
        "sat" | "saturday" => Ok(DayOfWeek::Saturday),
        "sun" | "sunday" => Ok(DayOfWeek::Sunday),
        _ => Err(ScheduleError::InvalidWeekday(day.to_string())),
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.trim()
        .parse()
        .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

/// Normalize a stored wall-clock time to `HH:MM:SS`.
///
/// Legacy records were written without seconds; `"09:00"` becomes `"09:00:00"`.
pub fn normalize_time(raw: &str) -> Result<String, ScheduleError> {
    let trimmed = raw.trim();
    let normalized = match trimmed.matches(':').count() {
        1 => format!("{trimmed}:00"),
        2 => trimmed.to_string(),
        _ => return Err(ScheduleError::InvalidTimeFormat(raw.to_string())),
    };
    // Reject anything chrono cannot read back, e.g. "25:00" or "9:xx".
    parse_normalized(&normalized, raw)?;
    Ok(normalized)
}

/// Parse a wall-clock time, accepting both `HH:MM` and `HH:MM:SS`.
pub fn parse_wall_clock(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let normalized = normalize_time(raw)?;
    parse_normalized(&normalized, raw)
}

fn parse_normalized(normalized: &str, raw: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(normalized, WALL_CLOCK_FORMAT)
        .map_err(|_| ScheduleError::InvalidTimeFormat(raw.to_string()))
}

/// A same-day wall-clock interval during which presence is authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl ScheduleWindow {
    /// Parse stored start/end strings without checking their order.
    ///
    /// An inverted window simply never contains any instant.
    pub fn parse(start: &str, end: &str) -> Result<Self, ScheduleError> {
        Ok(Self {
            start: parse_wall_clock(start)?,
            end: parse_wall_clock(end)?,
        })
    }

    /// Parse and require `start < end`. Overnight windows are not supported.
    pub fn validated(start: &str, end: &str) -> Result<Self, ScheduleError> {
        let window = Self::parse(start, end)?;
        if window.start >= window.end {
            return Err(ScheduleError::EmptyWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(window)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Anchor the window on `date` in `tz`, returning absolute instants.
    pub fn on_date(
        &self,
        date: NaiveDate,
        tz: &Tz,
    ) -> Result<(DateTime<Tz>, DateTime<Tz>), ScheduleError> {
        let start = resolve_local(tz, date.and_time(self.start))?;
        let end = resolve_local(tz, date.and_time(self.end))?;
        Ok((start, end))
    }

    /// Strict open-interval membership: both boundary instants are outside.
    pub fn contains(&self, now: DateTime<Utc>, tz: &Tz) -> Result<bool, ScheduleError> {
        let local_now = now.with_timezone(tz);
        let (start, end) = self.on_date(local_now.date_naive(), tz)?;
        Ok(local_now > start && local_now < end)
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(WALL_CLOCK_FORMAT),
            self.end.format(WALL_CLOCK_FORMAT)
        )
    }
}

// DST overlaps resolve to the earlier instant; gaps have no valid instant.
fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Result<DateTime<Tz>, ScheduleError> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => Ok(instant),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(ScheduleError::NonexistentLocalTime(local.to_string())),
    }
}
