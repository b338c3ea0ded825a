//! Basal rate reconstruction.
//!
//! Combines a daily basal schedule (from the profile) with temp basal
//! overrides, either as the rate active right now or as a gap-free
//! timeline over the trailing 24 hours.

use serde_json::Value;
use tracing::debug;

use crate::format::{add_plus, round_basal};
use crate::line::StatusLine;
use crate::record::{Record, number_value};
use crate::time::{DAY_MS, ScheduleZone, normalize_hhmm, recency_secs};

// ─────────────────────────────────────────────────────────────────────────────
// Schedule
// ─────────────────────────────────────────────────────────────────────────────

/// One schedule entry: the rate starting at a local time of day.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    /// Zero-padded `HH:MM`.
    pub time: String,
    /// Units per hour.
    pub rate: f64,
}

/// Daily basal schedule, ordered by time of day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasalSchedule {
    entries: Vec<ScheduleEntry>,
}

impl BasalSchedule {
    /// Build a schedule, ordering entries by time of day.
    pub fn new(mut entries: Vec<ScheduleEntry>) -> Self {
        entries.sort_by(|a, b| a.time.cmp(&b.time));
        Self { entries }
    }

    /// Extract the schedule from a profile document list.
    ///
    /// Uses `[0].basal` when present, otherwise the basal of the default
    /// profile in `[0].store`. Entries without a usable time or rate are
    /// skipped; a missing schedule yields an empty one.
    pub fn from_profile(doc: &Value) -> Self {
        let Some(profile) = doc.get(0) else {
            return Self::default();
        };
        let basal = profile.get("basal").filter(|b| b.is_array()).or_else(|| {
            let default = profile.get("defaultProfile")?.as_str()?;
            profile.get("store")?.get(default)?.get("basal")
        });
        let entries = basal
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(schedule_entry).collect())
            .unwrap_or_default();
        Self::new(entries)
    }

    /// Entries in time-of-day order.
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Whether the profile had no usable basal entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the entry active at `hhmm`: the last entry starting at or
    /// before it, wrapping to the last entry of the day.
    pub fn active_index(&self, hhmm: &str) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = self.entries.iter().rposition(|e| e.time.as_str() <= hhmm);
        Some(idx.unwrap_or(self.entries.len() - 1))
    }

    /// Scheduled rate at an instant.
    pub fn rate_at(&self, ms: i64, zone: &ScheduleZone) -> Option<f64> {
        self.active_index(&zone.hhmm(ms)).map(|i| self.entries[i].rate)
    }

    /// Scheduled intervals covering `[from, to)`, split at entry boundaries.
    fn segments(&self, from: i64, to: i64, zone: &ScheduleZone) -> Vec<BasalInterval> {
        let mut out = Vec::new();
        let Some(mut idx) = self.active_index(&zone.hhmm(from)) else {
            return out;
        };
        let mut start = from;
        while start < to {
            let next_idx = (idx + 1) % self.entries.len();
            let next_start = zone
                .next_time_of_day(&self.entries[next_idx].time, start)
                .unwrap_or(to);
            let end = next_start.min(to);
            out.push(BasalInterval {
                start,
                duration: Some(end - start),
                rate: self.entries[idx].rate,
                source: IntervalSource::Profile,
            });
            start = end;
            idx = next_idx;
        }
        out
    }
}

fn schedule_entry(item: &Value) -> Option<ScheduleEntry> {
    let time = match item.get("time").and_then(Value::as_str) {
        Some(t) => normalize_hhmm(t)?,
        None => {
            let secs = item.get("timeAsSeconds").and_then(number_value)? as i64;
            format!("{:02}:{:02}", secs / 3600 % 24, secs / 60 % 60)
        }
    };
    let rate = item.get("value").and_then(number_value)?;
    Some(ScheduleEntry { time, rate })
}

// ─────────────────────────────────────────────────────────────────────────────
// Temp basals
// ─────────────────────────────────────────────────────────────────────────────

/// A temp basal treatment.
#[derive(Debug, Clone, PartialEq)]
pub struct TempBasal {
    /// Start, epoch milliseconds.
    pub start: i64,
    /// Duration in minutes; zero cancels a running temp.
    pub duration_minutes: f64,
    /// Units per hour.
    pub rate: f64,
}

impl TempBasal {
    /// Read a temp basal treatment. A percent of exactly 0 means a rate of 0
    /// regardless of `absolute`.
    pub fn from_record(record: &Record) -> Self {
        let rate = if record.number("percent") == Some(0.0) {
            0.0
        } else {
            record.number("absolute").unwrap_or(0.0)
        };
        Self {
            start: record.timestamp(),
            duration_minutes: record.number("duration").unwrap_or(0.0).max(0.0),
            rate,
        }
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.duration_minutes * 60_000.0).round() as i64
    }

    /// End, epoch milliseconds.
    pub fn end(&self) -> i64 {
        self.start + self.duration_ms()
    }

    /// Whether the temp is still running at `now_ms`. A start ahead of
    /// `now_ms` counts as running.
    pub fn is_active_at(&self, now_ms: i64) -> bool {
        self.duration_minutes > 0.0 && now_ms < self.end()
    }
}

/// Read temp basals from cached records, keeping their order.
pub fn temp_basals(records: &[Record]) -> Vec<TempBasal> {
    records.iter().map(TempBasal::from_record).collect()
}

/// The temp running at `now`: the most recent one, if it has not ended.
///
/// `temps` is newest first.
pub fn active_temp(temps: &[TempBasal], now_ms: i64) -> Option<ActiveTemp> {
    let latest = temps.first()?;
    latest.is_active_at(now_ms).then(|| ActiveTemp {
        start: latest.start,
        rate: latest.rate,
        duration_minutes: latest.duration_minutes,
    })
}

/// A temp basal in effect at the evaluation instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTemp {
    pub start: i64,
    pub rate: f64,
    pub duration_minutes: f64,
}

impl ActiveTemp {
    /// Whole minutes left, rounded up.
    pub fn remaining_minutes(&self, now_ms: i64) -> f64 {
        (self.duration_minutes - (now_ms - self.start) as f64 / 60_000.0).ceil()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Active basal
// ─────────────────────────────────────────────────────────────────────────────

/// Scheduled and temp rates in effect at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveBasal {
    pub profile_rate: Option<f64>,
    pub temp: Option<ActiveTemp>,
}

impl ActiveBasal {
    /// Evaluate the schedule and the newest temp at `now_ms`.
    pub fn at(
        schedule: &BasalSchedule,
        temps: &[TempBasal],
        now_ms: i64,
        zone: &ScheduleZone,
    ) -> Self {
        Self {
            profile_rate: schedule.rate_at(now_ms, zone),
            temp: active_temp(temps, now_ms),
        }
    }

    /// `"1.5u/h +0.5"` with a temp running over a schedule, `"1.0u/h"` with
    /// the schedule only, `"-"` with neither.
    pub fn to_status(&self, now_ms: i64) -> StatusLine {
        match (self.temp, self.profile_rate) {
            (Some(temp), Some(profile)) => StatusLine::with_recency(
                format!(
                    "{}u/h {}",
                    round_basal(temp.rate),
                    add_plus(&round_basal(temp.rate - profile))
                ),
                recency_secs(now_ms, temp.start),
            ),
            (Some(temp), None) => StatusLine::with_recency(
                format!("{}u/h", round_basal(temp.rate)),
                recency_secs(now_ms, temp.start),
            ),
            (None, Some(profile)) => {
                StatusLine::with_recency(format!("{}u/h", round_basal(profile)), 0)
            }
            (None, None) => StatusLine::unavailable(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// History
// ─────────────────────────────────────────────────────────────────────────────

/// Where a history interval's rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalSource {
    Profile,
    Temp,
}

/// One interval of the reconstructed basal timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct BasalInterval {
    /// Start, epoch milliseconds.
    pub start: i64,
    /// Length in milliseconds; `None` for the open-ended current interval.
    pub duration: Option<i64>,
    /// Units per hour.
    pub rate: f64,
    pub source: IntervalSource,
}

impl BasalInterval {
    pub fn end(&self) -> Option<i64> {
        self.duration.map(|d| self.start + d)
    }
}

/// Reconstruct the basal timeline over `[now - 24h, now]`.
///
/// Gaps between temps are filled from the schedule, one interval per
/// schedule boundary. A temp starting while an earlier one runs truncates
/// it; a zero-duration temp just ends whatever was running. Temps starting
/// after `now` are ignored. The last interval, when it comes from the
/// schedule, is open-ended. An empty schedule yields an empty timeline.
pub fn basal_history(
    schedule: &BasalSchedule,
    temps: &[TempBasal],
    now_ms: i64,
    zone: &ScheduleZone,
) -> Vec<BasalInterval> {
    if schedule.is_empty() {
        return Vec::new();
    }
    let window_start = now_ms - DAY_MS;

    // Temps before markers at equal instants (stable sort).
    let mut items: Vec<(i64, Option<&TempBasal>)> = temps
        .iter()
        .filter(|t| t.start <= now_ms)
        .map(|t| (t.start, Some(t)))
        .collect();
    items.push((window_start, None));
    items.push((now_ms, None));
    items.sort_by_key(|(start, _)| *start);

    let mut out: Vec<BasalInterval> = Vec::new();
    let mut covered: Option<i64> = None;
    for (start, temp) in items {
        if let Some(until) = covered
            && start > until
        {
            out.extend(schedule.segments(until, start, zone));
            covered = Some(start);
        }
        match temp {
            None => covered = Some(covered.map_or(start, |c| c.max(start))),
            Some(temp) => {
                truncate_at(&mut out, temp.start);
                if temp.duration_ms() > 0 {
                    out.push(BasalInterval {
                        start: temp.start,
                        duration: Some(temp.duration_ms()),
                        rate: temp.rate,
                        source: IntervalSource::Temp,
                    });
                }
                covered = Some(temp.start + temp.duration_ms());
            }
        }
    }

    if let Some(last) = out.last_mut()
        && last.source == IntervalSource::Profile
        && last.end() == Some(now_ms)
    {
        last.duration = None;
    }

    let clipped = clip_to_window(out, window_start);
    debug!(intervals = clipped.len(), temps = temps.len(), "Reconstructed basal history");
    clipped
}

/// Drop or shorten intervals still running at `at`.
fn truncate_at(out: &mut Vec<BasalInterval>, at: i64) {
    while let Some(last) = out.last_mut() {
        if last.start >= at {
            out.pop();
            continue;
        }
        if last.end().is_none_or(|end| end > at) {
            last.duration = Some(at - last.start);
        }
        break;
    }
}

fn clip_to_window(intervals: Vec<BasalInterval>, window_start: i64) -> Vec<BasalInterval> {
    intervals
        .into_iter()
        .filter(|i| i.end().is_none_or(|end| end > window_start))
        .map(|mut i| {
            if i.start < window_start {
                i.duration = i.duration.map(|d| d - (window_start - i.start));
                i.start = window_start;
            }
            i
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MIDNIGHT: i64 = 1_704_153_600_000; // 2024-01-02T00:00:00Z
    const HOUR: i64 = 3_600_000;

    fn schedule(entries: &[(&str, f64)]) -> BasalSchedule {
        BasalSchedule::new(
            entries
                .iter()
                .map(|(t, r)| ScheduleEntry {
                    time: t.to_string(),
                    rate: *r,
                })
                .collect(),
        )
    }

    fn temp(start: i64, minutes: f64, rate: f64) -> TempBasal {
        TempBasal {
            start,
            duration_minutes: minutes,
            rate,
        }
    }

    fn assert_contiguous(intervals: &[BasalInterval]) {
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end(), Some(pair[1].start), "{intervals:?}");
        }
    }

    #[test]
    fn test_profile_from_basal_or_store() {
        let direct = BasalSchedule::from_profile(&json!([
            {"basal": [{"time": "12:00", "value": 0.5}, {"time": "0:00", "value": "1.0"}]}
        ]));
        assert_eq!(direct.entries()[0].time, "00:00");
        assert_eq!(direct.entries()[1].rate, 0.5);

        let stored = BasalSchedule::from_profile(&json!([{
            "defaultProfile": "Default",
            "store": {"Default": {"basal": [{"timeAsSeconds": 3600, "value": 0.8}]}}
        }]));
        assert_eq!(stored.entries(), &[ScheduleEntry { time: "01:00".into(), rate: 0.8 }]);

        assert!(BasalSchedule::from_profile(&json!([])).is_empty());
    }

    #[test]
    fn test_active_index_wraps() {
        let s = schedule(&[("06:00", 1.0), ("18:00", 2.0)]);
        assert_eq!(s.active_index("07:30"), Some(0));
        assert_eq!(s.active_index("18:00"), Some(1));
        assert_eq!(s.active_index("03:00"), Some(1));
        assert_eq!(BasalSchedule::default().active_index("03:00"), None);
    }

    #[test]
    fn test_temp_percent_zero_forces_zero_rate() {
        let record = Record::from_json(
            json!({"created_at": 1000, "percent": 0, "absolute": 1.2, "duration": 30}),
            "created_at",
            None,
        )
        .unwrap();
        let t = TempBasal::from_record(&record);
        assert_eq!(t.rate, 0.0);
        assert_eq!(t.duration_ms(), 30 * 60_000);
    }

    #[test]
    fn test_active_basal_formats() {
        let s = schedule(&[("00:00", 1.0)]);
        let zone = ScheduleZone::utc();
        let now = MIDNIGHT + HOUR;

        let running = [temp(now - 10 * 60_000, 30.0, 1.5)];
        let line = ActiveBasal::at(&s, &running, now, &zone).to_status(now);
        assert_eq!(line.text, "1.5u/h +0.5");
        assert_eq!(line.recency, Some(600));

        let lower = [temp(now - 60_000, 30.0, 0.75)];
        assert_eq!(
            ActiveBasal::at(&s, &lower, now, &zone).to_status(now).text,
            "0.75u/h -0.25"
        );

        let expired = [temp(now - 40 * 60_000, 30.0, 1.5)];
        let line = ActiveBasal::at(&s, &expired, now, &zone).to_status(now);
        assert_eq!(line, StatusLine::with_recency("1.0u/h", 0));

        let nothing = ActiveBasal::at(&BasalSchedule::default(), &[], now, &zone);
        assert!(nothing.to_status(now).is_unavailable());
    }

    #[test]
    fn test_temp_starting_ahead_of_clock_is_active() {
        let s = schedule(&[("00:00", 1.0)]);
        let zone = ScheduleZone::utc();
        let now = MIDNIGHT + HOUR;

        let skewed = [temp(now + 30_000, 30.0, 2.0)];
        let active = ActiveBasal::at(&s, &skewed, now, &zone);
        assert_eq!(active.temp.map(|t| t.rate), Some(2.0));
        assert_eq!(active.to_status(now).text, "2.0u/h +1.0");

        // The timeline still ignores temps that have not started.
        let history = basal_history(&s, &skewed, now, &zone);
        assert!(history.iter().all(|i| i.source == IntervalSource::Profile));
    }

    #[test]
    fn test_history_two_entry_profile_without_temps() {
        let s = schedule(&[("00:00", 1.0), ("12:00", 0.5)]);
        let history = basal_history(&s, &[], MIDNIGHT, &ScheduleZone::utc());

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].start, MIDNIGHT - 24 * HOUR);
        assert_eq!(history[0].duration, Some(12 * HOUR));
        assert_eq!(history[0].rate, 1.0);
        assert_eq!(history[1].start, MIDNIGHT - 12 * HOUR);
        assert_eq!(history[1].rate, 0.5);
        assert_eq!(history[1].duration, None);
        assert_contiguous(&history);
    }

    #[test]
    fn test_history_flat_profile_with_one_temp() {
        let s = schedule(&[("00:00", 1.0)]);
        let temp_start = MIDNIGHT - 21 * HOUR;
        let history = basal_history(
            &s,
            &[temp(temp_start, 30.0, 2.0)],
            MIDNIGHT,
            &ScheduleZone::utc(),
        );

        assert_eq!(history.len(), 3);
        assert_eq!(history[0].rate, 1.0);
        assert_eq!(history[0].end(), Some(temp_start));
        assert_eq!(history[1].source, IntervalSource::Temp);
        assert_eq!(history[1].rate, 2.0);
        assert_eq!(history[2].start, temp_start + 30 * 60_000);
        assert_eq!(history[2].duration, None);
        assert_contiguous(&history);
    }

    #[test]
    fn test_history_overlapping_and_cancelled_temps() {
        let s = schedule(&[("00:00", 1.0)]);
        let now = MIDNIGHT;
        let a = now - 5 * HOUR;
        let temps = [
            // Newest first, as cached.
            temp(a + 40 * 60_000, 0.0, 0.0),
            temp(a + 20 * 60_000, 30.0, 3.0),
            temp(a, 60.0, 2.0),
            temp(now + HOUR, 30.0, 9.0),
        ];
        let history = basal_history(&s, &temps, now, &ScheduleZone::utc());

        assert_contiguous(&history);
        let rates: Vec<f64> = history.iter().map(|i| i.rate).collect();
        assert_eq!(rates, vec![1.0, 2.0, 3.0, 1.0]);
        // The second temp truncates the first.
        assert_eq!(history[1].duration, Some(20 * 60_000));
        // The zero-duration temp cancels the second after 20 minutes.
        assert_eq!(history[2].duration, Some(20 * 60_000));
        assert_eq!(history[3].start, a + 40 * 60_000);
        assert!(history.iter().all(|i| i.rate != 9.0));
    }

    #[test]
    fn test_history_clips_temp_straddling_window_start() {
        let s = schedule(&[("00:00", 1.0)]);
        let window_start = MIDNIGHT - 24 * HOUR;
        let history = basal_history(
            &s,
            &[temp(window_start - 10 * 60_000, 30.0, 2.0)],
            MIDNIGHT,
            &ScheduleZone::utc(),
        );

        assert_eq!(history[0].start, window_start);
        assert_eq!(history[0].duration, Some(20 * 60_000));
        assert_eq!(history[0].rate, 2.0);
        assert_contiguous(&history);
    }

    #[test]
    fn test_history_empty_schedule() {
        let history = basal_history(
            &BasalSchedule::default(),
            &[temp(MIDNIGHT - HOUR, 30.0, 2.0)],
            MIDNIGHT,
            &ScheduleZone::utc(),
        );
        assert!(history.is_empty());
    }
}
