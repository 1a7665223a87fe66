//! Wall-clock access and chat timestamp rendering.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::error::ConfigError;

const SECONDS_PER_HOUR: i32 = 3600;
const DEFAULT_OFFSET_HOURS: i32 = 7;

/// Source of the current instant. Tests swap in a fixed clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Offset applied to chat timestamps unless configured otherwise (UTC+7).
pub fn default_utc_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_OFFSET_HOURS * SECONDS_PER_HOUR).unwrap_or_else(|| Utc.fix())
}

/// Renders `instant` as zero-padded 24-hour `HH:MM` in the given offset.
pub fn format_time(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant.with_timezone(&offset).format("%H:%M").to_string()
}

/// Parses offsets written as `+07:00`, `-05:30`, `+7` or `7`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = |reason| ConfigError::InvalidUtcOffset {
        value: value.to_string(),
        reason,
    };

    let trimmed = value.trim();
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (hours, minutes) = match body.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None => (body, "0"),
    };
    let hours: i32 = hours
        .parse()
        .map_err(|_| invalid("hours must be a number"))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| invalid("minutes must be a number"))?;

    if !(0..=23).contains(&hours) {
        return Err(invalid("hours must be between 0 and 23"));
    }
    if !(0..=59).contains(&minutes) {
        return Err(invalid("minutes must be between 0 and 59"));
    }

    FixedOffset::east_opt(sign * (hours * SECONDS_PER_HOUR + minutes * 60))
        .ok_or_else(|| invalid("offset out of range"))
}
