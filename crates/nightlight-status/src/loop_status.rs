//! Automated-loop status classification.
//!
//! Device status entries come from one or more loop rigs. Each entry may
//! carry a `suggested`, `enacted` and `iob` section, and rigs re-upload
//! stale sections, so a section only counts when it is *fresh*: computed
//! after the entry before it was created. A loop iteration succeeded when
//! its suggestion is fresh.

use serde_json::Value;

use crate::basal::ActiveTemp;
use crate::format::{add_plus, ago, format_number, mgdl_to_mmol, round_or_zero};
use crate::line::StatusLine;
use crate::record::{Record, number_value};
use crate::time::{parse_timestamp, recency_secs};

/// A loop section that can be fresh or stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopField {
    Suggested,
    Enacted,
    Iob,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suggested {
    pub timestamp: Option<i64>,
    pub eventual_bg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enacted {
    pub timestamp: Option<i64>,
    pub rate: Option<f64>,
    pub duration: Option<f64>,
    /// The pump acknowledged the command.
    pub received: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IobReport {
    pub timestamp: Option<i64>,
    pub iob: Option<f64>,
}

/// One device status entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStatusEntry {
    pub device: String,
    pub created_at: i64,
    pub suggested: Option<Suggested>,
    pub enacted: Option<Enacted>,
    pub iob: Option<IobReport>,
}

impl LoopStatusEntry {
    pub fn from_record(record: &Record) -> Self {
        let openaps = record.get("openaps");
        let section = |key: &str| {
            let value = openaps?.get(key)?;
            // Some rigs upload iob as an array; its head is current.
            let value = match value {
                Value::Array(items) if !items.is_empty() => &items[0],
                other => other,
            };
            truthy(value).then_some(value)
        };
        // oref0 with AMA reports iob under `time` instead of `timestamp`.
        let time = |v: &Value| {
            ["timestamp", "time"]
                .iter()
                .find_map(|k| v.get(*k).and_then(parse_timestamp))
        };
        let num = |v: &Value, key: &str| v.get(key).and_then(number_value);

        Self {
            device: record.str("device").unwrap_or_default().to_string(),
            created_at: record.timestamp(),
            suggested: section("suggested").map(|v| Suggested {
                timestamp: time(v),
                eventual_bg: num(v, "eventualBG"),
            }),
            enacted: section("enacted").map(|v| Enacted {
                timestamp: time(v),
                rate: num(v, "rate"),
                duration: num(v, "duration"),
                received: ["received", "recieved"]
                    .iter()
                    .any(|k| v.get(*k) == Some(&Value::Bool(true))),
            }),
            iob: section("iob").map(|v| IobReport {
                timestamp: time(v),
                iob: num(v, "iob"),
            }),
        }
    }

    /// `None` when the section is absent; otherwise its own timestamp.
    fn section_timestamp(&self, field: LoopField) -> Option<Option<i64>> {
        match field {
            LoopField::Suggested => self.suggested.as_ref().map(|s| s.timestamp),
            LoopField::Enacted => self.enacted.as_ref().map(|e| e.timestamp),
            LoopField::Iob => self.iob.as_ref().map(|i| i.timestamp),
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Convert cached records, keeping their newest-first order.
pub fn entries(records: &[Record]) -> Vec<LoopStatusEntry> {
    records.iter().map(LoopStatusEntry::from_record).collect()
}

/// Whether `field` on the newest entry is fresh.
///
/// Needs at least two entries. The newest must carry the section, and
/// either the entry before it does not, or the section's timestamp is later
/// than that entry's `created_at`.
pub fn is_fresh(entries: &[LoopStatusEntry], field: LoopField) -> bool {
    let (Some(last), Some(prev)) = (entries.first(), entries.get(1)) else {
        return false;
    };
    let Some(timestamp) = last.section_timestamp(field) else {
        return false;
    };
    match prev.section_timestamp(field) {
        None => true,
        Some(_) => timestamp.is_some_and(|t| t > prev.created_at),
    }
}

pub fn is_success(entries: &[LoopStatusEntry]) -> bool {
    is_fresh(entries, LoopField::Suggested)
}

/// Entries of the device that most recently completed a successful loop.
///
/// Falls back to the device of the newest entry when no device ever
/// succeeded. Equal timestamps go to the device seen later.
pub fn last_successful_device(all: &[LoopStatusEntry]) -> Vec<LoopStatusEntry> {
    let mut devices: Vec<(&str, Vec<LoopStatusEntry>)> = Vec::new();
    for entry in all {
        match devices.iter_mut().find(|(d, _)| *d == entry.device) {
            Some((_, list)) => list.push(entry.clone()),
            None => devices.push((entry.device.as_str(), vec![entry.clone()])),
        }
    }

    let mut winner: Option<(i64, usize)> = None;
    for (idx, (_, list)) in devices.iter().enumerate() {
        let success = (0..list.len()).find(|&i| is_success(&list[i..]));
        if let Some(i) = success
            && winner.is_none_or(|(at, _)| list[i].created_at >= at)
        {
            winner = Some((list[i].created_at, idx));
        }
    }

    let chosen = match winner {
        Some((_, idx)) => Some(idx),
        None => all
            .first()
            .and_then(|head| devices.iter().position(|(d, _)| *d == head.device)),
    };
    chosen
        .map(|idx| devices.swap_remove(idx).1)
        .unwrap_or_default()
}

/// When the newest loop iteration ran: the fresh enactment, else the fresh
/// suggestion, else the entry itself.
fn loop_time(entries: &[LoopStatusEntry]) -> i64 {
    let last = &entries[0];
    let enacted = last.enacted.as_ref().and_then(|e| e.timestamp);
    let suggested = last.suggested.as_ref().and_then(|s| s.timestamp);
    if is_fresh(entries, LoopField::Enacted)
        && let Some(t) = enacted
    {
        return t;
    }
    if is_fresh(entries, LoopField::Suggested)
        && let Some(t) = suggested
    {
        return t;
    }
    last.created_at
}

/// Loop display settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopDisplayOptions {
    /// Show temp rates relative to the scheduled rate.
    pub net_basal: bool,
    /// Show the predicted eventual glucose.
    pub eventual_bg: bool,
    pub mmol: bool,
}

fn iob_text(entries: &[LoopStatusEntry]) -> String {
    let iob = entries[0].iob.as_ref().and_then(|i| i.iob);
    match iob {
        Some(iob) if is_fresh(entries, LoopField::Iob) => format!("{}u", round_or_zero(iob)),
        _ => String::new(),
    }
}

fn eventual_bg_text(
    entries: &[LoopStatusEntry],
    options: &LoopDisplayOptions,
    abbreviate: bool,
) -> String {
    let bg = entries[0].suggested.as_ref().and_then(|s| s.eventual_bg);
    let Some(bg) = bg.filter(|_| options.eventual_bg && is_fresh(entries, LoopField::Suggested))
    else {
        return String::new();
    };
    let value = if options.mmol {
        mgdl_to_mmol(bg)
    } else {
        format_number(bg)
    };
    format!("{}{value}", if abbreviate { ">" } else { "->" })
}

/// Temp rate and minutes remaining, e.g. `1.3x28`, or empty.
///
/// A fresh, received enactment with rate and duration takes precedence
/// over the treatment stream's active temp; one with zero duration is a
/// cancel and suppresses the rate entirely.
fn temp_text(
    entries: &[LoopStatusEntry],
    active: Option<&ActiveTemp>,
    relative_to: Option<f64>,
    now_ms: i64,
) -> String {
    let enacted = entries[0].enacted.as_ref().filter(|e| {
        is_fresh(entries, LoopField::Enacted)
            && e.rate.is_some()
            && e.duration.is_some()
            && e.received
    });

    let shown = match enacted {
        Some(Enacted {
            timestamp,
            rate: Some(rate),
            duration: Some(duration),
            ..
        }) => timestamp.filter(|_| *duration > 0.0).map(|at| {
            let remaining = (duration - (now_ms - at) as f64 / 60_000.0).ceil();
            (*rate, remaining)
        }),
        _ => active
            .filter(|t| t.duration_minutes > 0.0)
            .map(|t| (t.rate, t.remaining_minutes(now_ms))),
    };

    match shown {
        Some((rate, remaining)) if remaining > 0.0 => {
            let rate_text = match relative_to {
                Some(base) => add_plus(&round_or_zero(rate - base)),
                None => round_or_zero(rate),
            };
            format!("{rate_text}x{}", remaining as i64)
        }
        _ => String::new(),
    }
}

/// `+19m: 1.0u->150` (or `(+19m) 1.0u`) for the newest successful
/// iteration before the current one.
fn last_success_text(
    entries: &[LoopStatusEntry],
    options: &LoopDisplayOptions,
    last_loop_time: i64,
) -> Option<String> {
    let i = (0..entries.len()).find(|&i| is_success(&entries[i..]))?;
    let success = &entries[i..];
    let since = ago(last_loop_time - loop_time(success));
    let tag = if options.eventual_bg {
        format!("+{since}:")
    } else {
        format!("(+{since})")
    };
    Some(format!(
        "{tag} {}{}",
        iob_text(success),
        eventual_bg_text(success, options, false)
    ))
}

/// Summarize the loop.
///
/// On success: IOB, eventual BG and the temp rate. On failure: `--` plus the
/// last success, if any. Fewer than two entries for the chosen device is
/// unavailable. `all` is newest first across devices; recency is seconds
/// since the newest loop iteration.
pub fn loop_status_line(
    all: &[LoopStatusEntry],
    active: Option<&ActiveTemp>,
    scheduled: Option<f64>,
    options: &LoopDisplayOptions,
    now_ms: i64,
) -> StatusLine {
    let entries = last_successful_device(all);
    if entries.len() < 2 {
        return StatusLine::unavailable();
    }
    let last_loop_time = loop_time(&entries);

    let text = if is_success(&entries) {
        let relative_to = scheduled.filter(|_| options.net_basal);
        let temp = temp_text(&entries, active, relative_to, now_ms);
        // Net basal plus a temp needs every character.
        let abbreviate = !temp.is_empty() && options.net_basal;
        let mut text = iob_text(&entries) + &eventual_bg_text(&entries, options, abbreviate);
        if !temp.is_empty() {
            text.push(' ');
            text.push_str(&temp);
        }
        text
    } else {
        match last_success_text(&entries, options, last_loop_time) {
            Some(summary) => format!("-- | {summary}"),
            None => "--".to_string(),
        }
    };

    StatusLine::with_recency(text, recency_secs(now_ms, last_loop_time))
}
