//! Display mode dispatch.
//!
//! Maps the configured [`StatusMode`] to its producer. A refresh always
//! yields a displayable line: producer failures are logged and rendered as
//! the unavailable placeholder, and unrecognized modes render empty.

use futures::future::join_all;
use nightlight_config::{MAX_STATUS_CHARS, MAX_STATUS_LINES, NightlightConfig, StatusConfig, StatusMode};
use tracing::{debug, warn};

use crate::error::Result;
use crate::format::truncate_chars;
use crate::line::StatusLine;
use crate::loop_status::LoopDisplayOptions;
use crate::producers;
use crate::session::Session;

/// Produces status lines for a session according to the status settings.
#[derive(Debug, Clone)]
pub struct Aggregator {
    session: Session,
    status: StatusConfig,
    mmol: bool,
}

impl Aggregator {
    pub fn new(session: Session, config: &NightlightConfig) -> Self {
        Self::with_status(session, config.status(), config.display().mmol)
    }

    pub fn with_status(session: Session, status: StatusConfig, mmol: bool) -> Self {
        Self {
            session,
            status,
            mmol,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status_config(&self) -> &StatusConfig {
        &self.status
    }

    /// Produce the configured status line. Never fails.
    pub async fn refresh(&self) -> StatusLine {
        let mode = self.status.content;
        if mode == StatusMode::Multiple {
            return self.multiple().await;
        }
        self.line(mode).await
    }

    /// Produce one mode's line, replacing a failure with the placeholder.
    pub async fn line(&self, mode: StatusMode) -> StatusLine {
        match self.produce(mode).await {
            Ok(line) => line,
            Err(e) => {
                if e.client_error().is_some_and(nightlight_client::Error::is_timeout) {
                    warn!(mode = %mode, "Status source timed out");
                } else {
                    warn!(mode = %mode, error = %e, "Status source unavailable");
                }
                StatusLine::unavailable()
            }
        }
    }

    /// Produce one mode's line.
    ///
    /// `Multiple` is only valid at the top level; nested, it renders empty.
    pub async fn produce(&self, mode: StatusMode) -> Result<StatusLine> {
        let session = &self.session;
        let line = match mode {
            StatusMode::RigBattery => producers::rig_battery(session).await?,
            StatusMode::RawData => {
                producers::raw_data(session, self.status.raw_count, self.mmol).await?
            }
            StatusMode::RigRaw => {
                producers::rig_and_raw(session, self.status.raw_count, self.mmol).await?
            }
            StatusMode::Basal => producers::active_basal(session).await?,
            StatusMode::PebbleIob => producers::pebble_iob(session).await?,
            StatusMode::PebbleIobAndCob => producers::pebble_iob_and_cob(session).await?,
            StatusMode::OpenAps => producers::loop_status(session, &self.loop_options()).await?,
            StatusMode::CustomUrl => {
                producers::custom_url(session, self.status.url.as_deref()).await?
            }
            StatusMode::CustomJson => {
                producers::custom_json(session, self.status.json_url.as_deref()).await?
            }
            StatusMode::CustomText => producers::custom_text(self.status.text.as_deref()),
            StatusMode::Multiple | StatusMode::None | StatusMode::Unrecognized => {
                StatusLine::empty()
            }
        };
        Ok(StatusLine {
            text: truncate_chars(&line.text, MAX_STATUS_CHARS),
            recency: line.recency,
        })
    }

    /// The first three configured sub-lines, skipping `None` slots,
    /// produced concurrently and joined by newlines.
    ///
    /// Recency is that of the first sub-line.
    async fn multiple(&self) -> StatusLine {
        let modes: Vec<StatusMode> = self
            .status
            .lines
            .iter()
            .copied()
            .take(MAX_STATUS_LINES)
            .filter(|m| *m != StatusMode::None)
            .collect();
        debug!(?modes, "Producing composite status");

        let lines = join_all(modes.iter().map(|mode| self.line(*mode))).await;
        let text = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        StatusLine {
            text: truncate_chars(&text, MAX_STATUS_CHARS),
            recency: lines.first().and_then(|l| l.recency),
        }
    }

    fn loop_options(&self) -> LoopDisplayOptions {
        LoopDisplayOptions {
            net_basal: self.status.openaps_net_basal,
            eventual_bg: self.status.openaps_eventual_bg,
            mmol: self.mmol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nightlight_client::RemoteClient;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::clock::FixedClock;
    use crate::session::SessionOptions;
    use crate::time::ScheduleZone;

    const NOW: i64 = 1_704_153_600_000;

    fn aggregator(server: &MockServer, status: StatusConfig) -> Aggregator {
        let options = SessionOptions::nightscout(server.uri())
            .with_clock(Arc::new(FixedClock::new(NOW)))
            .with_zone(ScheduleZone::utc());
        let session = Session::new(RemoteClient::new().unwrap(), options);
        Aggregator::with_status(session, status, false)
    }

    fn status(content: StatusMode, lines: Vec<StatusMode>) -> StatusConfig {
        StatusConfig {
            content,
            lines,
            text: Some("note".to_string()),
            ..StatusConfig::default()
        }
    }

    #[tokio::test]
    async fn test_unrecognized_and_none_render_empty() {
        let server = MockServer::start().await;
        for mode in [StatusMode::Unrecognized, StatusMode::None] {
            let line = aggregator(&server, status(mode, vec![])).refresh().await;
            assert_eq!(line, StatusLine::empty());
        }
    }

    #[tokio::test]
    async fn test_failure_becomes_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let line = aggregator(&server, status(StatusMode::RigBattery, vec![]))
            .refresh()
            .await;
        assert!(line.is_unavailable());
    }

    #[tokio::test]
    async fn test_multiple_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/devicestatus.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"created_at": NOW - 20_000, "uploaderBattery": 70}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/profile.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let agg = aggregator(
            &server,
            status(
                StatusMode::Multiple,
                vec![
                    StatusMode::RigBattery,
                    StatusMode::None,
                    StatusMode::Basal,
                    StatusMode::CustomText,
                    StatusMode::Multiple,
                ],
            ),
        );
        let line = agg.refresh().await;

        // Only the first three slots count; the None slot is skipped.
        assert_eq!(line.text, "70%\n-");
        assert_eq!(line.recency, Some(20));
    }

    #[tokio::test]
    async fn test_multiple_ignores_lines_past_third_slot() {
        let server = MockServer::start().await;
        let agg = aggregator(
            &server,
            status(
                StatusMode::Multiple,
                vec![
                    StatusMode::None,
                    StatusMode::None,
                    StatusMode::None,
                    StatusMode::CustomText,
                ],
            ),
        );
        assert_eq!(agg.refresh().await, StatusLine::empty());
    }

    #[tokio::test]
    async fn test_nested_multiple_renders_empty() {
        let server = MockServer::start().await;
        let agg = aggregator(
            &server,
            status(
                StatusMode::Multiple,
                vec![StatusMode::Multiple, StatusMode::CustomText],
            ),
        );
        let line = agg.refresh().await;
        assert_eq!(line.text, "\nnote");
        assert_eq!(line.recency, None);
    }

    #[tokio::test]
    async fn test_multiple_truncates_combined_text() {
        let server = MockServer::start().await;
        let mut config = status(
            StatusMode::Multiple,
            vec![StatusMode::CustomText, StatusMode::CustomText],
        );
        config.text = Some("x".repeat(200));
        let line = aggregator(&server, config).refresh().await;
        assert_eq!(line.text.chars().count(), MAX_STATUS_CHARS);
    }

    #[tokio::test]
    async fn test_empty_multiple() {
        let server = MockServer::start().await;
        let line = aggregator(&server, status(StatusMode::Multiple, vec![StatusMode::None]))
            .refresh()
            .await;
        assert_eq!(line, StatusLine::empty());
    }
}
