//! Session state: per-stream caches, profile and vendor token.
//!
//! A [`Session`] owns everything that persists between refreshes. Each of
//! the six record streams has its own cache and its own single-flight
//! coordinator, so concurrent producers asking for the same stream share
//! one request. Cheap to clone; clones share state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nightlight_cache::{BoundedCache, Eviction, FlightStats, SingleFlight};
use nightlight_client::api::{SHARE_SERVER_OUTSIDE_US, SHARE_SERVER_US};
use nightlight_client::{NightscoutApi, RemoteClient};
use nightlight_config::{DexcomRegion, NightlightConfig, SourceKind, resolve_dexcom_password};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::basal::BasalSchedule;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::sync::sync_from_cache;
use crate::time::ScheduleZone;

/// Glucose readings are expected every five minutes.
const READING_INTERVAL_MS: i64 = 5 * 60 * 1000;

/// Loop status entries kept for freshness and last-success lookups.
const LOOP_STATUS_COUNT: usize = 24;

type Shared<T> = std::result::Result<T, Arc<Error>>;

// ─────────────────────────────────────────────────────────────────────────────
// Streams
// ─────────────────────────────────────────────────────────────────────────────

/// The cached record streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Sgv,
    TempBasal,
    Bolus,
    UploaderBattery,
    Calibration,
    LoopStatus,
}

impl StreamKind {
    pub const ALL: [StreamKind; 6] = [
        StreamKind::Sgv,
        StreamKind::TempBasal,
        StreamKind::Bolus,
        StreamKind::UploaderBattery,
        StreamKind::Calibration,
        StreamKind::LoopStatus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Sgv => "sgv",
            StreamKind::TempBasal => "temp_basal",
            StreamKind::Bolus => "bolus",
            StreamKind::UploaderBattery => "uploader_battery",
            StreamKind::Calibration => "calibration",
            StreamKind::LoopStatus => "loop_status",
        }
    }

    /// Field the stream is ordered and filtered by.
    pub fn ordering_key(self) -> &'static str {
        match self {
            StreamKind::Sgv | StreamKind::Calibration => "date",
            _ => "created_at",
        }
    }

    /// Fields kept per record; `None` keeps everything.
    pub fn fields(self) -> Option<&'static [&'static str]> {
        match self {
            StreamKind::Sgv => Some(&[
                "date",
                "sgv",
                "trend",
                "direction",
                "filtered",
                "unfiltered",
                "noise",
            ]),
            StreamKind::TempBasal => Some(&["created_at", "duration", "absolute", "percent"]),
            StreamKind::Bolus => Some(&["created_at", "insulin"]),
            _ => None,
        }
    }

    /// Cache bound for a given SGV history length.
    pub fn eviction(self, max_sgv_count: usize) -> Eviction {
        match self {
            StreamKind::Sgv => Eviction::max_age_secs((max_sgv_count as u64 + 1) * 5 * 60),
            StreamKind::TempBasal => Eviction::max_size(max_sgv_count),
            StreamKind::Bolus => Eviction::max_size((max_sgv_count * 6).div_ceil(12)),
            StreamKind::UploaderBattery | StreamKind::Calibration => Eviction::max_size(1),
            StreamKind::LoopStatus => Eviction::max_size(LOOP_STATUS_COUNT),
        }
    }

    /// Records requested per fetch.
    fn count(self, max_sgv_count: usize) -> usize {
        self.eviction(max_sgv_count)
            .size_limit()
            .unwrap_or(max_sgv_count)
    }

    fn url(self, api: &NightscoutApi, max_sgv_count: usize) -> String {
        let count = self.count(max_sgv_count);
        match self {
            StreamKind::Sgv => api.sgv_url(count),
            StreamKind::TempBasal => api.temp_basals_url(count),
            StreamKind::Bolus => api.boluses_url(count),
            StreamKind::UploaderBattery => api.uploader_battery_url(count),
            StreamKind::Calibration => api.calibrations_url(count),
            StreamKind::LoopStatus => api.loop_status_url(count),
        }
    }
}

struct Stream {
    cache: Mutex<BoundedCache<Record>>,
    flight: SingleFlight<String, Shared<Arc<[Record]>>>,
}

impl Stream {
    fn new(kind: StreamKind, max_sgv_count: usize) -> Self {
        Self {
            cache: Mutex::new(BoundedCache::new(kind.name(), kind.eviction(max_sgv_count))),
            flight: SingleFlight::new(kind.name()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Dexcom Share credentials.
#[derive(Clone)]
pub struct DexcomAccount {
    pub server: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for DexcomAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DexcomAccount")
            .field("server", &self.server)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Everything a [`Session`] needs up front.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Nightscout site; required for every stream except vendor glucose.
    pub nightscout_url: Option<String>,
    /// When set, glucose readings come from Dexcom Share.
    pub dexcom: Option<DexcomAccount>,
    pub max_sgv_count: usize,
    pub zone: ScheduleZone,
    pub clock: Arc<dyn Clock>,
}

impl SessionOptions {
    /// Options for a Nightscout-only session.
    pub fn nightscout(url: impl Into<String>) -> Self {
        Self {
            nightscout_url: Some(url.into()),
            dexcom: None,
            max_sgv_count: 144,
            zone: ScheduleZone::Local,
            clock: Arc::new(SystemClock),
        }
    }

    /// Options from a loaded configuration.
    ///
    /// The Dexcom password is resolved from the environment first, then the
    /// config file.
    pub fn from_config(config: &NightlightConfig) -> Result<Self> {
        config.validate()?;
        let source = config.source();

        let dexcom = match source.kind {
            SourceKind::Nightscout => None,
            SourceKind::Dexcom => {
                let dexcom = config.dexcom.clone().unwrap_or_default();
                let password = resolve_dexcom_password(Some(&dexcom))
                    .ok_or_else(|| Error::Config("no Dexcom password configured".to_string()))?;
                Some(DexcomAccount {
                    server: match dexcom.region {
                        DexcomRegion::Us => SHARE_SERVER_US,
                        DexcomRegion::OutsideUs => SHARE_SERVER_OUTSIDE_US,
                    }
                    .to_string(),
                    username: dexcom.username.unwrap_or_default(),
                    password: password.value,
                })
            }
        };

        Ok(Self {
            nightscout_url: source.nightscout_url,
            dexcom,
            max_sgv_count: config.sync().max_sgv_count,
            zone: ScheduleZone::from_offset_minutes(config.schedule().utc_offset_minutes),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_zone(mut self, zone: ScheduleZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_dexcom(mut self, account: DexcomAccount) -> Self {
        self.dexcom = Some(account);
        self
    }

    pub fn with_max_sgv_count(mut self, n: usize) -> Self {
        self.max_sgv_count = n;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Shared session state. See the module docs.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: RemoteClient,
    nightscout_url: Option<String>,
    dexcom: Option<DexcomAccount>,
    zone: ScheduleZone,
    clock: Arc<dyn Clock>,
    max_sgv_count: AtomicUsize,
    streams: [Stream; 6],
    profile: Mutex<Option<Arc<BasalSchedule>>>,
    profile_flight: SingleFlight<String, Shared<Arc<BasalSchedule>>>,
    token: Mutex<Option<String>>,
    token_flight: SingleFlight<String, Shared<String>>,
    pebble_flight: SingleFlight<String, Shared<Option<Value>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("nightscout_url", &self.inner.nightscout_url)
            .field("dexcom", &self.inner.dexcom)
            .field("max_sgv_count", &self.max_sgv_count())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(client: RemoteClient, options: SessionOptions) -> Self {
        let max_sgv_count = options.max_sgv_count.max(1);
        Self {
            inner: Arc::new(SessionInner {
                client,
                nightscout_url: options.nightscout_url,
                dexcom: options.dexcom,
                zone: options.zone,
                clock: options.clock,
                max_sgv_count: AtomicUsize::new(max_sgv_count),
                streams: StreamKind::ALL.map(|kind| Stream::new(kind, max_sgv_count)),
                profile: Mutex::new(None),
                profile_flight: SingleFlight::new("profile"),
                token: Mutex::new(None),
                token_flight: SingleFlight::new("share_login"),
                pebble_flight: SingleFlight::new("pebble"),
            }),
        }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.inner.client
    }

    pub fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    pub fn zone(&self) -> ScheduleZone {
        self.inner.zone
    }

    pub fn max_sgv_count(&self) -> usize {
        self.inner.max_sgv_count.load(Ordering::Relaxed)
    }

    /// Whether glucose readings come from Dexcom Share.
    pub fn uses_dexcom(&self) -> bool {
        self.inner.dexcom.is_some()
    }

    /// The configured Nightscout site.
    pub fn nightscout(&self) -> Result<NightscoutApi> {
        let url = self
            .inner
            .nightscout_url
            .as_deref()
            .ok_or_else(|| Error::Config("no Nightscout URL configured".to_string()))?;
        Ok(self.inner.client.nightscout(url)?)
    }

    fn stream(&self, kind: StreamKind) -> &Stream {
        &self.inner.streams[kind as usize]
    }

    /// Current cache contents for a stream, newest first, without fetching.
    pub fn cached(&self, kind: StreamKind) -> Vec<Record> {
        self.stream(kind).cache.lock().entries().to_vec()
    }

    /// Coalescing counters for a stream.
    pub fn flight_stats(&self, kind: StreamKind) -> FlightStats {
        self.stream(kind).flight.stats()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record streams
    // ─────────────────────────────────────────────────────────────────────────

    /// Sync a stream and return its whole cache, newest first.
    ///
    /// Concurrent calls for the same stream share one fetch. Glucose comes
    /// from Dexcom Share when the session is configured for it.
    pub async fn records(&self, kind: StreamKind) -> Result<Arc<[Record]>> {
        if kind == StreamKind::Sgv
            && let Some(account) = &self.inner.dexcom
        {
            let key = format!("share:{}", account.server);
            let session = self.clone();
            return Ok(self
                .stream(kind)
                .flight
                .run(key, move || async move {
                    session.sync_share_sgvs().await.map_err(Arc::new)
                })
                .await?);
        }

        let api = self.nightscout()?;
        let url = kind.url(&api, self.max_sgv_count());
        let session = self.clone();
        let base_url = url.clone();
        Ok(self
            .stream(kind)
            .flight
            .run(url, move || async move {
                session
                    .sync_nightscout(kind, &base_url)
                    .await
                    .map_err(Arc::new)
            })
            .await?)
    }

    pub async fn sgvs(&self) -> Result<Arc<[Record]>> {
        self.records(StreamKind::Sgv).await
    }

    pub async fn temp_basals(&self) -> Result<Arc<[Record]>> {
        self.records(StreamKind::TempBasal).await
    }

    pub async fn boluses(&self) -> Result<Arc<[Record]>> {
        self.records(StreamKind::Bolus).await
    }

    pub async fn uploader_battery(&self) -> Result<Arc<[Record]>> {
        self.records(StreamKind::UploaderBattery).await
    }

    pub async fn calibrations(&self) -> Result<Arc<[Record]>> {
        self.records(StreamKind::Calibration).await
    }

    pub async fn loop_status(&self) -> Result<Arc<[Record]>> {
        self.records(StreamKind::LoopStatus).await
    }

    async fn sync_nightscout(&self, kind: StreamKind, base_url: &str) -> Result<Arc<[Record]>> {
        let records = sync_from_cache(
            &self.inner.client,
            base_url,
            &self.stream(kind).cache,
            kind.ordering_key(),
            kind.fields(),
            self.now_ms(),
        )
        .await?;
        Ok(records.into())
    }

    async fn sync_share_sgvs(&self) -> Result<Arc<[Record]>> {
        let Some(account) = &self.inner.dexcom else {
            return Err(Error::Config("no Dexcom account configured".to_string()));
        };
        let token = self.dexcom_token().await?;
        let now = self.now_ms();
        let cache = &self.stream(StreamKind::Sgv).cache;

        let newest = cache.lock().newest().map(Record::timestamp);
        let count = share_count(newest, now, self.max_sgv_count());
        let readings = match self
            .inner
            .client
            .share(account.server.clone())
            .latest_glucose(&token, count)
            .await
        {
            Ok(readings) => readings,
            Err(e) => {
                // A rejected token is dropped so the next refresh logs in again.
                if e.is_auth_error() {
                    *self.inner.token.lock() = None;
                    warn!(server = %account.server, "Dexcom Share session rejected");
                }
                return Err(e.into());
            }
        };

        let records: Vec<Record> = readings
            .into_iter()
            .filter(|g| newest.is_none_or(|n| g.date > n))
            .map(Record::from_share)
            .collect();
        let mut cache = cache.lock();
        Ok(cache.update_at(records, now).into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Singletons
    // ─────────────────────────────────────────────────────────────────────────

    /// The basal schedule, fetched once per session.
    ///
    /// Failures are not remembered; the next call retries.
    pub async fn profile(&self) -> Result<Arc<BasalSchedule>> {
        if let Some(schedule) = self.inner.profile.lock().clone() {
            return Ok(schedule);
        }
        let api = self.nightscout()?;
        let session = self.clone();
        Ok(self
            .inner
            .profile_flight
            .run(api.profile_url(), move || async move {
                let doc = api.profile().await.map_err(|e| Arc::new(Error::from(e)))?;
                let schedule = Arc::new(BasalSchedule::from_profile(&doc));
                debug!(entries = schedule.entries().len(), "Loaded basal profile");
                *session.inner.profile.lock() = Some(Arc::clone(&schedule));
                Ok::<_, Arc<Error>>(schedule)
            })
            .await?)
    }

    /// The Dexcom Share session token, logging in on first use and again
    /// after the server rejects the cached one.
    pub async fn dexcom_token(&self) -> Result<String> {
        if let Some(token) = self.inner.token.lock().clone() {
            return Ok(token);
        }
        let account = self
            .inner
            .dexcom
            .clone()
            .ok_or_else(|| Error::Config("no Dexcom account configured".to_string()))?;
        let session = self.clone();
        let key = account.server.clone();
        Ok(self
            .inner
            .token_flight
            .run(key, move || async move {
                let token = session
                    .inner
                    .client
                    .share(account.server.clone())
                    .login(&account.username, &account.password)
                    .await
                    .map_err(|e| Arc::new(Error::from(e)))?;
                info!(server = %account.server, "Logged in to Dexcom Share");
                *session.inner.token.lock() = Some(token.clone());
                Ok::<_, Arc<Error>>(token)
            })
            .await?)
    }

    /// The newest `bgs` entry of the condensed watch endpoint.
    pub async fn pebble_bg(&self) -> Result<Option<Value>> {
        let api = self.nightscout()?;
        Ok(self
            .inner
            .pebble_flight
            .run(api.pebble_url(), move || async move {
                let doc = api.pebble().await.map_err(|e| Arc::new(Error::from(e)))?;
                Ok::<_, Arc<Error>>(doc
                    .get("bgs")
                    .and_then(|bgs| bgs.get(0))
                    .filter(|bg| !bg.is_null())
                    .cloned())
            })
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Drop all cached records, the profile and the vendor token.
    pub fn clear(&self) {
        for stream in &self.inner.streams {
            stream.cache.lock().clear();
        }
        *self.inner.profile.lock() = None;
        *self.inner.token.lock() = None;
        info!("Session cleared");
    }

    /// Re-bound the glucose, temp basal and bolus caches.
    pub fn set_max_sgv_count(&self, n: usize) {
        let n = n.max(1);
        self.inner.max_sgv_count.store(n, Ordering::Relaxed);
        let now = self.now_ms();
        for kind in [StreamKind::Sgv, StreamKind::TempBasal, StreamKind::Bolus] {
            let mut cache = self.stream(kind).cache.lock();
            match kind.eviction(n) {
                Eviction::MaxAge(age) => cache.set_max_age_at(age.as_secs(), now),
                Eviction::MaxSize(size) => cache.set_max_size(size),
            }
        }
        debug!(max_sgv_count = n, "Re-bounded caches");
    }
}

/// Readings to request from Share: enough to cover the gap since the newest
/// cached one, at least one, at most the history length.
fn share_count(newest: Option<i64>, now_ms: i64, max_sgv_count: usize) -> usize {
    match newest {
        None => max_sgv_count,
        Some(newest) => {
            let missed = ((now_ms - newest) / READING_INTERVAL_MS).max(1) as usize;
            missed.min(max_sgv_count)
        }
    }
}
