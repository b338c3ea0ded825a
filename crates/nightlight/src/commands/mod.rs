//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use console::Style;
use nightlight_client::RemoteClient;
use nightlight_config::{LoadedConfig, NightlightConfig, StatusMode};
use nightlight_status::{Aggregator, Session, SessionOptions, StatusLine};
use tracing::{debug, warn};

pub mod basal;
pub mod config;
pub mod status;
pub mod watch;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Config directory override.
    pub config_dir: Option<PathBuf>,
    /// Nightscout URL override.
    pub server_url: Option<String>,
    /// Status mode override.
    pub mode: Option<String>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the layered config and apply command-line overrides.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let mut loaded =
            nightlight_config::load_config_with_options(None, self.config_dir.as_deref())?;
        for warning in &loaded.warnings {
            warn!("{warning}");
        }

        let mut overrides = NightlightConfig::new();
        if let Some(url) = &self.server_url {
            let mut source = loaded.config.source();
            source.nightscout_url = Some(url.clone());
            overrides.source = Some(source);
        }
        if let Some(mode) = &self.mode {
            let mut status = loaded.config.status();
            status.content = StatusMode::from_name(mode);
            if status.content == StatusMode::Unrecognized {
                warn!(mode = %mode, "Unrecognized status mode; output will be empty");
            }
            overrides.status = Some(status);
        }
        loaded.config.merge(overrides);
        Ok(loaded)
    }

    /// Build a session from the resolved config.
    pub fn session(&self, config: &NightlightConfig) -> Result<Session> {
        let client = RemoteClient::builder()
            .timeout(config.sync().request_timeout())
            .build()?;
        let options = SessionOptions::from_config(config).context("unusable configuration")?;
        debug!(?options, "Session options resolved");
        Ok(Session::new(client, options))
    }

    /// Build the aggregator for the resolved config.
    pub fn aggregator(&self, config: &NightlightConfig) -> Result<Aggregator> {
        Ok(Aggregator::new(self.session(config)?, config))
    }
}

/// Human rendering of a status line's age.
pub fn describe_recency(recency: Option<i64>) -> String {
    match recency {
        None => "age unknown".to_string(),
        Some(secs) if secs < 60 => format!("{secs}s ago"),
        Some(secs) if secs < 3600 => format!("{}m ago", secs / 60),
        Some(secs) => format!("{}h{}m ago", secs / 3600, secs / 60 % 60),
    }
}

/// Whether a line is older than the configured limit.
pub fn is_stale(line: &StatusLine, max_age_minutes: Option<u32>) -> bool {
    match (line.recency, max_age_minutes) {
        (Some(recency), Some(max)) => recency > i64::from(max) * 60,
        _ => false,
    }
}

/// Print a status line as text or JSON.
pub fn print_line(line: &StatusLine, max_age_minutes: Option<u32>, ctx: &Context) -> Result<()> {
    let stale = is_stale(line, max_age_minutes);
    if ctx.json_output {
        let mut value = line.to_json();
        value["stale"] = serde_json::Value::Bool(stale);
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    println!("{}", line.text);
    let dim = Style::new().dim();
    let age = describe_recency(line.recency);
    if stale {
        println!("{}", Style::new().yellow().apply_to(format!("⚠ stale ({age})")));
    } else if ctx.verbose || line.recency.is_some() {
        println!("{}", dim.apply_to(age));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_recency() {
        assert_eq!(describe_recency(None), "age unknown");
        assert_eq!(describe_recency(Some(42)), "42s ago");
        assert_eq!(describe_recency(Some(300)), "5m ago");
        assert_eq!(describe_recency(Some(3_900)), "1h5m ago");
    }

    #[test]
    fn test_is_stale() {
        let line = StatusLine::with_recency("x", 700);
        assert!(is_stale(&line, Some(10)));
        assert!(!is_stale(&line, Some(15)));
        assert!(!is_stale(&line, None));
        assert!(!is_stale(&StatusLine::new("x"), Some(1)));
    }
}
