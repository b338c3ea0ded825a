//! Nightscout time-series API.

use serde_json::Value;
use url::Url;

use crate::client::RemoteClient;
use crate::error::Result;

/// Nightscout site client.
///
/// Builds the query URLs for each record stream. All endpoints live under
/// `{base}/api/v1` and answer with JSON arrays, newest first.
#[derive(Debug, Clone)]
pub struct NightscoutApi {
    client: RemoteClient,
    base: String,
}

impl NightscoutApi {
    pub(crate) fn new(client: RemoteClient, base_url: &str) -> Result<Self> {
        // Validate early; URLs are assembled as strings afterwards.
        Url::parse(base_url)?;
        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Site base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base, path)
    }

    /// Glucose readings.
    pub fn sgv_url(&self, count: usize) -> String {
        self.api(&format!("entries/sgv.json?count={count}"))
    }

    /// Temp basal treatments.
    pub fn temp_basals_url(&self, count: usize) -> String {
        self.api(&format!(
            "treatments.json?find[eventType]=Temp+Basal&count={count}"
        ))
    }

    /// Treatments carrying an insulin amount.
    pub fn boluses_url(&self, count: usize) -> String {
        self.api(&format!(
            "treatments.json?find[insulin][$exists]=true&count={count}"
        ))
    }

    /// Device status entries reporting an uploader battery.
    pub fn uploader_battery_url(&self, count: usize) -> String {
        self.api(&format!(
            "devicestatus.json?find[$or][0][uploaderBattery][$exists]=true&find[$or][1][uploader][$exists]=true&count={count}"
        ))
    }

    /// Sensor calibration records.
    pub fn calibrations_url(&self, count: usize) -> String {
        self.api(&format!("entries/cal.json?count={count}"))
    }

    /// Device status entries reporting automated-loop state.
    pub fn loop_status_url(&self, count: usize) -> String {
        self.api(&format!(
            "devicestatus.json?find[openaps][$exists]=true&count={count}"
        ))
    }

    /// Profile documents.
    pub fn profile_url(&self) -> String {
        self.api("profile.json")
    }

    /// Condensed watch endpoint (`/pebble`), outside the versioned API.
    pub fn pebble_url(&self) -> String {
        format!("{}/pebble", self.base)
    }

    /// Fetch one page of records from a stream URL.
    pub async fn records(&self, url: &str) -> Result<Vec<Value>> {
        self.client.get_json(url).await
    }

    /// Fetch the profile documents.
    pub async fn profile(&self) -> Result<Value> {
        self.client.get_json(&self.profile_url()).await
    }

    /// Fetch the condensed watch endpoint.
    pub async fn pebble(&self) -> Result<Value> {
        self.client.get_json(&self.pebble_url()).await
    }
}
