//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [source]      # nightscout site or dexcom share
//! [dexcom]      # share credentials and region
//! [status]      # what the status line shows
//! [display]     # unit system
//! [sync]        # cache bounds, timeouts, refresh cadence
//! [schedule]    # time zone for the basal schedule
//! ```

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Maximum length of any status text, in characters.
pub const MAX_STATUS_CHARS: usize = 255;

/// Maximum number of sub-lines in the composite status mode.
pub const MAX_STATUS_LINES: usize = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NightlightConfig {
    /// Where glucose data comes from.
    pub source: Option<SourceConfig>,

    /// Dexcom Share account.
    pub dexcom: Option<DexcomConfig>,

    /// Status line content.
    pub status: Option<StatusConfig>,

    /// Display preferences.
    pub display: Option<DisplayConfig>,

    /// Sync bounds and timing.
    pub sync: Option<SyncConfig>,

    /// Basal schedule time zone.
    pub schedule: Option<ScheduleConfig>,
}

impl NightlightConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: NightlightConfig) {
        if other.source.is_some() {
            self.source = other.source;
        }

        if other.dexcom.is_some() {
            self.dexcom = other.dexcom;
        }

        if other.status.is_some() {
            self.status = other.status;
        }

        if other.display.is_some() {
            self.display = other.display;
        }

        if other.sync.is_some() {
            self.sync = other.sync;
        }

        if other.schedule.is_some() {
            self.schedule = other.schedule;
        }
    }

    /// Source section, or defaults.
    pub fn source(&self) -> SourceConfig {
        self.source.clone().unwrap_or_default()
    }

    /// Status section, or defaults.
    pub fn status(&self) -> StatusConfig {
        self.status.clone().unwrap_or_default()
    }

    /// Display section, or defaults.
    pub fn display(&self) -> DisplayConfig {
        self.display.clone().unwrap_or_default()
    }

    /// Sync section, or defaults.
    pub fn sync(&self) -> SyncConfig {
        self.sync.clone().unwrap_or_default()
    }

    /// Schedule section, or defaults.
    pub fn schedule(&self) -> ScheduleConfig {
        self.schedule.clone().unwrap_or_default()
    }

    /// Check that the selected source has what it needs.
    pub fn validate(&self) -> Result<()> {
        let source = self.source();
        match source.kind {
            SourceKind::Nightscout => {
                if source.nightscout_url.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingField {
                        field: "nightscout_url".to_string(),
                        context: "[source]".to_string(),
                    });
                }
            }
            SourceKind::Dexcom => {
                let has_user = self
                    .dexcom
                    .as_ref()
                    .and_then(|d| d.username.as_deref())
                    .is_some_and(|u| !u.is_empty());
                if !has_user {
                    return Err(ConfigError::MissingField {
                        field: "username".to_string(),
                        context: "[dexcom]".to_string(),
                    });
                }
            }
        }

        if self.sync().max_sgv_count == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.max_sgv_count".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Glucose data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A Nightscout site.
    #[default]
    Nightscout,
    /// A Dexcom Share account.
    Dexcom,
}

/// Source section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Which source supplies glucose readings.
    pub kind: SourceKind,
    /// Nightscout site URL. Also used for treatments, device status and the
    /// profile when glucose comes from Share.
    pub nightscout_url: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dexcom Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Share account region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DexcomRegion {
    /// Accounts registered in the US.
    #[default]
    Us,
    /// Accounts registered elsewhere.
    OutsideUs,
}

/// Dexcom Share account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DexcomConfig {
    /// Account name.
    pub username: Option<String>,
    /// Account password (prefer the `NIGHTLIGHT_DEXCOM_PASSWORD` env var).
    pub password: Option<String>,
    /// Account region.
    pub region: DexcomRegion,
}

impl DexcomConfig {
    /// Whether the password is stored in the config file itself.
    pub fn has_plaintext_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// What the status line shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMode {
    /// Empty text.
    #[default]
    None,
    /// Uploader battery percentage.
    RigBattery,
    /// Raw glucose values derived from calibration.
    RawData,
    /// Uploader battery followed by raw glucose.
    #[serde(rename = "rig-raw")]
    RigRaw,
    /// Active basal rate.
    Basal,
    /// Insulin on board from the condensed endpoint.
    #[serde(alias = "careportaliob", alias = "pumpiob")]
    PebbleIob,
    /// Insulin and carbs on board from the condensed endpoint.
    PebbleIobAndCob,
    /// Automated-loop status.
    OpenAps,
    /// Plain text from a URL.
    CustomUrl,
    /// `{content, timestamp}` JSON from a URL.
    CustomJson,
    /// Fixed configured text.
    CustomText,
    /// Up to three sub-lines.
    Multiple,
    /// Any mode name this version does not know; renders as empty text.
    #[serde(other)]
    Unrecognized,
}

impl StatusMode {
    /// Every mode with a name, in display order.
    pub const ALL: [StatusMode; 12] = [
        StatusMode::None,
        StatusMode::RigBattery,
        StatusMode::RawData,
        StatusMode::RigRaw,
        StatusMode::Basal,
        StatusMode::PebbleIob,
        StatusMode::PebbleIobAndCob,
        StatusMode::OpenAps,
        StatusMode::CustomUrl,
        StatusMode::CustomJson,
        StatusMode::CustomText,
        StatusMode::Multiple,
    ];

    /// Config name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusMode::None => "none",
            StatusMode::RigBattery => "rigbattery",
            StatusMode::RawData => "rawdata",
            StatusMode::RigRaw => "rig-raw",
            StatusMode::Basal => "basal",
            StatusMode::PebbleIob => "pebbleiob",
            StatusMode::PebbleIobAndCob => "pebbleiobandcob",
            StatusMode::OpenAps => "openaps",
            StatusMode::CustomUrl => "customurl",
            StatusMode::CustomJson => "customjson",
            StatusMode::CustomText => "customtext",
            StatusMode::Multiple => "multiple",
            StatusMode::Unrecognized => "unrecognized",
        }
    }

    /// Parse a mode name, mapping anything unknown to
    /// [`StatusMode::Unrecognized`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "careportaliob" | "pumpiob" => StatusMode::PebbleIob,
            other => Self::ALL
                .into_iter()
                .find(|m| m.as_str() == other)
                .unwrap_or(StatusMode::Unrecognized),
        }
    }
}

impl std::fmt::Display for StatusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Display mode.
    pub content: StatusMode,
    /// Sub-line modes for [`StatusMode::Multiple`] (at most three are used).
    pub lines: Vec<StatusMode>,
    /// Text for [`StatusMode::CustomText`].
    pub text: Option<String>,
    /// URL for [`StatusMode::CustomUrl`].
    pub url: Option<String>,
    /// URL for [`StatusMode::CustomJson`].
    pub json_url: Option<String>,
    /// How many raw glucose samples to show.
    pub raw_count: usize,
    /// Show loop temp basals relative to the scheduled rate.
    pub openaps_net_basal: bool,
    /// Show the loop's eventual glucose prediction.
    pub openaps_eventual_bg: bool,
    /// Data older than this is flagged as stale by the CLI.
    pub max_age_minutes: Option<u32>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            content: StatusMode::RigBattery,
            lines: vec![StatusMode::RigBattery, StatusMode::Basal, StatusMode::None],
            text: None,
            url: None,
            json_url: None,
            raw_count: 3,
            openaps_net_basal: false,
            openaps_eventual_bg: true,
            max_age_minutes: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Display Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Display section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show glucose in mmol/L instead of mg/dL.
    pub mmol: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sync Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Sync section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Glucose readings kept; also bounds the treatment caches.
    pub max_sgv_count: usize,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Delay between refreshes in watch mode.
    pub refresh_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_sgv_count: 144,
            request_timeout_secs: 15,
            refresh_interval_secs: 60,
        }
    }
}

impl SyncConfig {
    /// Per-request timeout as a duration.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    /// Refresh interval as a duration.
    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schedule Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Schedule section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Fixed UTC offset for reading the daily basal schedule. When unset the
    /// host's local time zone is used.
    pub utc_offset_minutes: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = NightlightConfig::from_toml(
            r#"
[source]
kind = "nightscout"
nightscout_url = "https://ns.example"

[status]
content = "multiple"
lines = ["openaps", "basal", "none"]
raw_count = 5
openaps_net_basal = true

[display]
mmol = true

[sync]
max_sgv_count = 36

[schedule]
utc_offset_minutes = -300
"#,
        )
        .unwrap();

        assert_eq!(config.source().kind, SourceKind::Nightscout);
        let status = config.status();
        assert_eq!(status.content, StatusMode::Multiple);
        assert_eq!(
            status.lines,
            vec![StatusMode::OpenAps, StatusMode::Basal, StatusMode::None]
        );
        assert_eq!(status.raw_count, 5);
        assert!(status.openaps_net_basal);
        assert!(config.display().mmol);
        assert_eq!(config.sync().max_sgv_count, 36);
        assert_eq!(config.sync().request_timeout_secs, 15);
        assert_eq!(config.schedule().utc_offset_minutes, Some(-300));
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_and_legacy_modes() {
        let config = NightlightConfig::from_toml(
            r#"
[status]
content = "pumpiob"
lines = ["careportaliob", "weather"]
"#,
        )
        .unwrap();

        let status = config.status();
        assert_eq!(status.content, StatusMode::PebbleIob);
        assert_eq!(
            status.lines,
            vec![StatusMode::PebbleIob, StatusMode::Unrecognized]
        );
    }

    #[test]
    fn test_mode_names_round_trip() {
        for mode in StatusMode::ALL {
            assert_eq!(StatusMode::from_name(mode.as_str()), mode);
        }
        assert_eq!(StatusMode::from_name("bogus"), StatusMode::Unrecognized);
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = NightlightConfig::from_toml(
            r#"
[source]
nightscout_url = "https://a.example"

[display]
mmol = true
"#,
        )
        .unwrap();
        let overlay = NightlightConfig::from_toml(
            r#"
[source]
nightscout_url = "https://b.example"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(
            base.source().nightscout_url.as_deref(),
            Some("https://b.example")
        );
        assert!(base.display().mmol);
    }

    #[test]
    fn test_validate_requires_source_fields() {
        let err = NightlightConfig::new().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "nightscout_url"));

        let config = NightlightConfig::from_toml(
            r#"
[source]
kind = "dexcom"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "username"));
    }

    #[test]
    fn test_to_toml_round_trip() {
        let config = NightlightConfig::from_toml(
            r#"
[dexcom]
username = "me"
region = "outside-us"
"#,
        )
        .unwrap();
        let reparsed = NightlightConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reparsed, config);
        assert_eq!(reparsed.dexcom.unwrap().region, DexcomRegion::OutsideUs);
    }
}
