//! Timestamp parsing and time-of-day arithmetic.
//!
//! Records carry times either as epoch-millisecond numbers or as ISO-8601
//! strings. Basal schedules are keyed by local `HH:MM`, evaluated in the
//! configured [`ScheduleZone`].

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use serde_json::Value;

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Parse a record timestamp into epoch milliseconds.
///
/// Accepts numbers, numeric strings, RFC 3339 strings, zone-less ISO strings
/// (taken as UTC) and Share `/Date(ms)/` strings.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ms) = s.parse::<i64>() {
        return Some(ms);
    }
    if s.starts_with("/Date(") {
        return nightlight_client::types::parse_share_date(s);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Seconds between `then_ms` and `now_ms`, rounded half up.
pub fn recency_secs(now_ms: i64, then_ms: i64) -> i64 {
    crate::format::js_round((now_ms - then_ms) as f64 / 1000.0) as i64
}

/// Time zone used to evaluate basal schedule times of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleZone {
    /// The host's local zone.
    #[default]
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl ScheduleZone {
    /// Zone from an optional offset in minutes east of UTC.
    ///
    /// Out-of-range offsets fall back to the host zone.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .and_then(|m| FixedOffset::east_opt(m.checked_mul(60)?))
            .map_or(Self::Local, Self::Fixed)
    }

    /// UTC, mostly for tests.
    pub fn utc() -> Self {
        Self::from_offset_minutes(Some(0))
    }

    /// Zero-padded `HH:MM` for an instant.
    pub fn hhmm(&self, ms: i64) -> String {
        match self {
            Self::Local => hhmm_in(&Local, ms),
            Self::Fixed(offset) => hhmm_in(offset, ms),
        }
    }

    /// The first instant strictly after `after_ms` whose time of day is
    /// `hhmm`. `None` when `hhmm` is not a valid time of day.
    pub fn next_time_of_day(&self, hhmm: &str, after_ms: i64) -> Option<i64> {
        let time = parse_hhmm(hhmm)?;
        match self {
            Self::Local => next_in(&Local, time, after_ms),
            Self::Fixed(offset) => next_in(offset, time, after_ms),
        }
    }
}

/// Parse `H:MM` or `HH:MM` (an optional `:SS` suffix is ignored).
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let mut parts = s.trim().split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

/// Normalize a schedule time to zero-padded `HH:MM`.
pub fn normalize_hhmm(s: &str) -> Option<String> {
    parse_hhmm(s).map(|t| t.format("%H:%M").to_string())
}

fn hhmm_in<Tz: TimeZone>(tz: &Tz, ms: i64) -> String
where
    Tz::Offset: std::fmt::Display,
{
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.with_timezone(tz).format("%H:%M").to_string())
        .unwrap_or_default()
}

fn next_in<Tz: TimeZone>(tz: &Tz, time: NaiveTime, after_ms: i64) -> Option<i64> {
    let after = DateTime::from_timestamp_millis(after_ms)?.with_timezone(tz);
    let mut date = after.date_naive();
    // Today, tomorrow, and one spare day for DST shifts.
    for _ in 0..3 {
        if let Some(at) = resolve_local(tz, date.and_time(time))
            && at > after_ms
        {
            return Some(at);
        }
        date = date.succ_opt()?;
    }
    None
}

/// Map a wall-clock time to an instant, skipping forward over DST gaps.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<i64> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|dt| dt.timestamp_millis())
}
