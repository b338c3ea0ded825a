//! Request and response types for the vendor session API.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Dexcom Share
// ─────────────────────────────────────────────────────────────────────────────

/// Application id of the Dexcom Share mobile app, required by the login call.
pub const SHARE_APPLICATION_ID: &str = "d89443d2-327c-4a6f-89e5-496bbb0317db";

/// Login request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLoginRequest {
    /// Vendor application id.
    pub application_id: String,
    /// Account name.
    pub account_name: String,
    /// Account password.
    pub password: String,
}

impl ShareLoginRequest {
    /// Build a login request for the given credentials.
    pub fn new(account_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            application_id: SHARE_APPLICATION_ID.to_string(),
            account_name: account_name.into(),
            password: password.into(),
        }
    }
}

/// A glucose reading as the vendor sends it.
///
/// `WT` encodes epoch milliseconds as `/Date(<ms>)/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawShareGlucose {
    /// Glucose value in mg/dL.
    #[serde(rename = "Value")]
    pub value: f64,
    /// Trend code (numeric in older firmware, a name in newer).
    #[serde(rename = "Trend", default)]
    pub trend: serde_json::Value,
    /// Wall time, `/Date(<ms>)/`.
    #[serde(rename = "WT")]
    pub wt: String,
}

/// A glucose reading normalized to epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareGlucose {
    /// Glucose value in mg/dL.
    pub sgv: f64,
    /// Trend code.
    pub trend: serde_json::Value,
    /// Reading time, epoch milliseconds.
    pub date: i64,
}

impl TryFrom<RawShareGlucose> for ShareGlucose {
    type Error = crate::Error;

    fn try_from(raw: RawShareGlucose) -> crate::Result<Self> {
        let date = parse_share_date(&raw.wt)
            .ok_or_else(|| crate::Error::Vendor(format!("unparseable WT value '{}'", raw.wt)))?;
        Ok(Self {
            sgv: raw.value,
            trend: raw.trend,
            date,
        })
    }
}

/// Parse a `/Date(<ms>)/` string into epoch milliseconds.
///
/// Anything after the leading integer inside the parentheses (such as a
/// `-0500` zone suffix) is ignored.
pub fn parse_share_date(wt: &str) -> Option<i64> {
    let open = wt.find('(')?;
    let close = open + wt[open..].find(')')?;
    let inner = wt[open + 1..close].trim();

    let sign_len = usize::from(inner.starts_with('-') || inner.starts_with('+'));
    let digits = inner[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(inner.len(), |i| i + sign_len);
    inner[..digits].parse().ok()
}
