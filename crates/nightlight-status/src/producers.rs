//! Status producers, one per display mode.
//!
//! Each producer reads what it needs through the [`Session`] and returns a
//! [`StatusLine`]. Producers that combine several streams wait for all of
//! them before computing, so the result does not depend on which request
//! finishes first.

use nightlight_config::MAX_STATUS_CHARS;
use serde_json::Value;
use tracing::debug;

use crate::basal::{self, ActiveBasal, BasalInterval};
use crate::error::{Error, Result};
use crate::format::{format_number, js_round, mgdl_to_mmol, to_fixed, truncate_chars};
use crate::line::StatusLine;
use crate::loop_status::{self, LoopDisplayOptions};
use crate::record::{Record, number_value};
use crate::session::Session;
use crate::time::recency_secs;

/// Noise labels indexed by the sensor's noise code.
const NOISE_LABELS: [&str; 7] = ["", "Clean", "Light", "Medium", "Heavy", "Not computed", "Max"];

/// Timestamps below this are seconds, not milliseconds.
const MS_TIMESTAMP_FLOOR: f64 = 1e12;

// ─────────────────────────────────────────────────────────────────────────────
// Rig battery / raw data
// ─────────────────────────────────────────────────────────────────────────────

/// Uploader battery percentage, aged by the status entry.
pub async fn rig_battery(session: &Session) -> Result<StatusLine> {
    let records = session.uploader_battery().await?;
    let now = session.now_ms();
    Ok(records
        .first()
        .map_or_else(StatusLine::unavailable, |r| battery_line(r, now)))
}

fn battery_line(record: &Record, now_ms: i64) -> StatusLine {
    let battery = match record.get("uploader") {
        Some(uploader) => uploader.get("battery").and_then(number_value),
        None => record.number("uploaderBattery"),
    };
    match battery {
        Some(level) => StatusLine::with_recency(
            format!("{}%", format_number(level)),
            recency_secs(now_ms, record.timestamp()),
        ),
        None => StatusLine::unavailable(),
    }
}

/// Raw sensor glucose for the last `count` readings, prefixed by the noise
/// label of the newest one.
pub async fn raw_data(session: &Session, count: usize, mmol: bool) -> Result<StatusLine> {
    let (calibrations, sgvs) = tokio::try_join!(session.calibrations(), session.sgvs())?;
    let (Some(calibration), Some(newest)) = (calibrations.first(), sgvs.first()) else {
        return Ok(StatusLine::unavailable());
    };

    let noise = newest
        .number("noise")
        .and_then(|n| NOISE_LABELS.get(n as usize))
        .filter(|label| !label.is_empty());

    let mut ascending = sgvs.to_vec();
    ascending.sort_by_key(Record::timestamp);
    let skip = ascending.len().saturating_sub(count);

    let values = ascending[skip..]
        .iter()
        .map(|sgv| match raw_mgdl(sgv, calibration) {
            Some(mgdl) if mmol => mgdl_to_mmol(mgdl),
            Some(mgdl) => format_number(mgdl),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join(" ");

    let text = match noise {
        Some(label) => format!("{label} {values}"),
        None => values,
    };
    Ok(StatusLine::new(text))
}

/// Raw glucose from the unfiltered signal and the latest calibration.
///
/// Inside the sensor's reportable range [40, 400] the value is scaled by
/// the filtered/calibrated ratio.
pub fn raw_mgdl(sgv: &Record, calibration: &Record) -> Option<f64> {
    let unfiltered = sgv.number("unfiltered").filter(|u| *u != 0.0)?;
    let scale = calibration.number("scale")?;
    let intercept = calibration.number("intercept")?;
    let slope = calibration.number("slope")?;

    let glucose = sgv.number("sgv").filter(|g| *g != 0.0);
    let filtered = sgv.number("filtered").filter(|f| *f != 0.0);
    let unscaled = scale * (unfiltered - intercept) / slope;
    let raw = match (glucose, filtered) {
        (Some(glucose), Some(filtered)) if (40.0..=400.0).contains(&glucose) => {
            let ratio = scale * (filtered - intercept) / slope / glucose;
            unscaled / ratio
        }
        _ => unscaled,
    };
    let raw = js_round(raw);
    raw.is_finite().then_some(raw)
}

/// Battery and raw data on one line, aged by the battery entry.
pub async fn rig_and_raw(session: &Session, count: usize, mmol: bool) -> Result<StatusLine> {
    let (battery, raw) = tokio::try_join!(rig_battery(session), raw_data(session, count, mmol))?;
    let parts: Vec<&str> = [&battery, &raw]
        .into_iter()
        .filter(|l| !l.is_unavailable())
        .map(|l| l.text.as_str())
        .collect();
    let text = if parts.is_empty() {
        crate::line::UNAVAILABLE.to_string()
    } else {
        parts.join(" ")
    };
    Ok(StatusLine {
        text,
        recency: battery.recency,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Basal / loop
// ─────────────────────────────────────────────────────────────────────────────

/// Scheduled and temp rates in effect now.
pub async fn active_basal(session: &Session) -> Result<StatusLine> {
    let (schedule, records) = tokio::try_join!(session.profile(), session.temp_basals())?;
    let now = session.now_ms();
    let temps = basal::temp_basals(&records);
    Ok(ActiveBasal::at(&schedule, &temps, now, &session.zone()).to_status(now))
}

/// The reconstructed basal timeline over the last 24 hours.
pub async fn basal_history(session: &Session) -> Result<Vec<BasalInterval>> {
    let (schedule, records) = tokio::try_join!(session.profile(), session.temp_basals())?;
    let temps = basal::temp_basals(&records);
    Ok(basal::basal_history(
        &schedule,
        &temps,
        session.now_ms(),
        &session.zone(),
    ))
}

/// Automated-loop summary.
pub async fn loop_status(session: &Session, options: &LoopDisplayOptions) -> Result<StatusLine> {
    let (records, temps, schedule) = tokio::try_join!(
        session.loop_status(),
        session.temp_basals(),
        session.profile()
    )?;
    let now = session.now_ms();
    let active = basal::active_temp(&basal::temp_basals(&temps), now);
    let scheduled = schedule.rate_at(now, &session.zone());
    let entries = loop_status::entries(&records);
    Ok(loop_status::loop_status_line(
        &entries,
        active.as_ref(),
        scheduled,
        options,
        now,
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Condensed endpoint
// ─────────────────────────────────────────────────────────────────────────────

fn iob_text(bg: &Value) -> Option<String> {
    let iob = bg.get("iob").and_then(number_value)?;
    Some(format!("{} u", to_fixed(iob, 1)))
}

/// Insulin on board as reported by the site.
pub async fn pebble_iob(session: &Session) -> Result<StatusLine> {
    let bg = session.pebble_bg().await?;
    Ok(bg
        .as_ref()
        .and_then(iob_text)
        .map_or_else(StatusLine::unavailable, |text| {
            StatusLine::with_recency(text, 0)
        }))
}

/// Insulin and carbs on board as reported by the site.
pub async fn pebble_iob_and_cob(session: &Session) -> Result<StatusLine> {
    let Some(bg) = session.pebble_bg().await? else {
        return Ok(StatusLine::unavailable());
    };
    let cob = bg
        .get("cob")
        .and_then(number_value)
        .map(|cob| format!("{} g", format_number(js_round(cob))));
    let parts: Vec<String> = [iob_text(&bg), cob].into_iter().flatten().collect();
    if parts.is_empty() {
        return Ok(StatusLine::unavailable());
    }
    Ok(StatusLine::with_recency(parts.join("  "), 0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Custom sources
// ─────────────────────────────────────────────────────────────────────────────

/// Configured free text.
pub fn custom_text(text: Option<&str>) -> StatusLine {
    StatusLine::new(truncate_chars(text.unwrap_or_default(), MAX_STATUS_CHARS))
}

/// Append a cache-busting `_=<now>` parameter.
pub fn uncacheable_url(url: &str, now_ms: i64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}_={now_ms}")
}

/// Plain text from a URL, with surrounding newlines trimmed.
pub async fn custom_url(session: &Session, url: Option<&str>) -> Result<StatusLine> {
    let url = url.ok_or_else(|| Error::Config("no status URL configured".to_string()))?;
    let body = session
        .client()
        .get_text(&uncacheable_url(url, session.now_ms()))
        .await?;
    let text = truncate_chars(body.trim_matches('\n'), MAX_STATUS_CHARS);
    if text.is_empty() {
        return Ok(StatusLine::unavailable());
    }
    Ok(StatusLine::new(text))
}

/// `{content, timestamp}` from a JSON URL (or the first element of an
/// array of them).
pub async fn custom_json(session: &Session, url: Option<&str>) -> Result<StatusLine> {
    let url = url.ok_or_else(|| Error::Config("no status JSON URL configured".to_string()))?;
    let now = session.now_ms();
    let body = session.client().get_text(&uncacheable_url(url, now)).await?;
    let doc: Value = serde_json::from_str(&body).map_err(nightlight_client::Error::from)?;
    Ok(custom_json_line(&doc, now))
}

fn custom_json_line(doc: &Value, now_ms: i64) -> StatusLine {
    let data = match doc {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let content = match data.and_then(|d| d.get("content")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => return StatusLine::unavailable(),
        Some(other) => other.to_string(),
    };
    let recency = data
        .and_then(|d| d.get("timestamp"))
        .and_then(number_value)
        .map(|ts| {
            let ms = if ts < MS_TIMESTAMP_FLOOR { ts * 1000.0 } else { ts };
            recency_secs(now_ms, ms as i64)
        });
    debug!(?recency, "Parsed custom JSON status");
    StatusLine {
        text: truncate_chars(&content, MAX_STATUS_CHARS),
        recency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nightlight_client::RemoteClient;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::clock::FixedClock;
    use crate::session::SessionOptions;
    use crate::time::ScheduleZone;

    const NOW: i64 = 1_704_153_600_000;

    fn session(server: &MockServer) -> Session {
        let options = SessionOptions::nightscout(server.uri())
            .with_clock(Arc::new(FixedClock::new(NOW)))
            .with_zone(ScheduleZone::utc())
            .with_max_sgv_count(12);
        Session::new(RemoteClient::new().unwrap(), options)
    }

    fn record(v: Value) -> Record {
        Record::from_json(v, "date", None).unwrap()
    }

    async fn mount_json(server: &MockServer, at: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_raw_mgdl_branches() {
        let cal = record(json!({"date": 1, "scale": 1, "intercept": 30000, "slope": 1000}));

        let unscaled = record(json!({"date": 1, "unfiltered": 150000}));
        assert_eq!(raw_mgdl(&unscaled, &cal), Some(120.0));

        let in_range = record(json!({
            "date": 1, "sgv": 100, "filtered": 120000, "unfiltered": 150000
        }));
        // ratio = 90 / 100; 120 / 0.9
        assert_eq!(raw_mgdl(&in_range, &cal), Some(133.0));

        let out_of_range = record(json!({
            "date": 1, "sgv": 39, "filtered": 120000, "unfiltered": 150000
        }));
        assert_eq!(raw_mgdl(&out_of_range, &cal), Some(120.0));

        let no_signal = record(json!({"date": 1, "sgv": 100}));
        assert_eq!(raw_mgdl(&no_signal, &cal), None);
    }

    #[test]
    fn test_battery_line_shapes() {
        let nested = Record::from_json(
            json!({"created_at": NOW - 30_000, "uploader": {"battery": 87}}),
            "created_at",
            None,
        )
        .unwrap();
        assert_eq!(battery_line(&nested, NOW), StatusLine::with_recency("87%", 30));

        let flat = Record::from_json(
            json!({"created_at": NOW, "uploaderBattery": 42}),
            "created_at",
            None,
        )
        .unwrap();
        assert_eq!(battery_line(&flat, NOW).text, "42%");
    }

    #[test]
    fn test_custom_json_line() {
        let seconds = json!({"content": "hello", "timestamp": (NOW / 1000) - 90});
        assert_eq!(
            custom_json_line(&seconds, NOW),
            StatusLine::with_recency("hello", 90)
        );

        let array = json!([{"content": "first", "timestamp": NOW - 5_000}, {"content": "x"}]);
        assert_eq!(
            custom_json_line(&array, NOW),
            StatusLine::with_recency("first", 5)
        );

        assert!(custom_json_line(&json!({"other": 1}), NOW).is_unavailable());
        assert!(custom_json_line(&json!([]), NOW).is_unavailable());
        assert_eq!(custom_json_line(&json!({"content": "x"}), NOW).recency, None);
    }

    #[test]
    fn test_custom_text_truncates() {
        let long = "a".repeat(300);
        assert_eq!(custom_text(Some(long.as_str())).text.len(), MAX_STATUS_CHARS);
        assert_eq!(custom_text(None).text, "");
    }

    #[test]
    fn test_uncacheable_url() {
        assert_eq!(uncacheable_url("https://x/s", 5), "https://x/s?_=5");
        assert_eq!(uncacheable_url("https://x/s?a=1", 5), "https://x/s?a=1&_=5");
    }

    #[tokio::test]
    async fn test_raw_data_with_noise_and_count() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/api/v1/entries/cal.json",
            json!([{"date": NOW, "scale": 1, "intercept": 30000, "slope": 1000}]),
        )
        .await;
        mount_json(
            &server,
            "/api/v1/entries/sgv.json",
            json!([
                {"date": NOW, "unfiltered": 150000, "noise": 1},
                {"date": NOW - 300_000, "unfiltered": 140000},
                {"date": NOW - 600_000, "unfiltered": 130000},
            ]),
        )
        .await;

        let session = session(&server);
        let line = raw_data(&session, 2, false).await.unwrap();
        assert_eq!(line.text, "Clean 110 120");

        let mmol = raw_data(&session, 1, true).await.unwrap();
        assert_eq!(mmol.text, "Clean 6.7");
    }

    #[tokio::test]
    async fn test_rig_and_raw_without_calibration() {
        let server = MockServer::start().await;
        mount_json(&server, "/api/v1/entries/cal.json", json!([])).await;
        mount_json(&server, "/api/v1/entries/sgv.json", json!([])).await;
        mount_json(
            &server,
            "/api/v1/devicestatus.json",
            json!([{"created_at": NOW - 10_000, "uploaderBattery": 55}]),
        )
        .await;

        let line = rig_and_raw(&session(&server), 3, false).await.unwrap();
        assert_eq!(line, StatusLine::with_recency("55%", 10));
    }

    #[tokio::test]
    async fn test_pebble_iob_and_cob() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/pebble",
            json!({"bgs": [{"sgv": "120", "iob": "1.25", "cob": 12.5}]}),
        )
        .await;

        let session = session(&server);
        let line = pebble_iob_and_cob(&session).await.unwrap();
        assert_eq!(line, StatusLine::with_recency("1.3 u  13 g", 0));
        assert_eq!(pebble_iob(&session).await.unwrap().text, "1.3 u");
    }

    #[tokio::test]
    async fn test_custom_url_trims_newlines_and_busts_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status.txt"))
            .and(query_param("_", NOW.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string("\n\nhello world\n"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/status.txt", server.uri());
        let line = custom_url(&session(&server), Some(url.as_str())).await.unwrap();
        assert_eq!(line.text, "hello world");
    }

    #[tokio::test]
    async fn test_custom_url_requires_setting() {
        let server = MockServer::start().await;
        let err = custom_url(&session(&server), None).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_active_basal_end_to_end() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/api/v1/profile.json",
            json!([{"basal": [{"time": "00:00", "value": 0.8}]}]),
        )
        .await;
        mount_json(
            &server,
            "/api/v1/treatments.json",
            json!([{"created_at": NOW - 120_000, "absolute": 1.2, "duration": 30}]),
        )
        .await;

        let line = active_basal(&session(&server)).await.unwrap();
        assert_eq!(line, StatusLine::with_recency("1.2u/h +0.4", 120));
    }
}
