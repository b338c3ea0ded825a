//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use crate::api::{NightscoutApi, ShareApi};
use crate::error::{Error, Result};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout-bounded HTTP client shared by every data source.
///
/// Cheap to clone; clones share one connection pool.
///
/// # Example
///
/// ```no_run
/// use nightlight_client::RemoteClient;
///
/// # async fn example() -> nightlight_client::Result<()> {
/// let client = RemoteClient::new()?;
/// let text = client.get_text("https://example.com/status.txt").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RemoteClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
struct ClientInner {
    /// HTTP client.
    http: reqwest::Client,
    /// Request timeout.
    timeout: Duration,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl RemoteClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client with default settings.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access a Nightscout site.
    pub fn nightscout(&self, base_url: &str) -> Result<NightscoutApi> {
        NightscoutApi::new(self.clone(), base_url)
    }

    /// Access a Dexcom Share server.
    pub fn share(&self, server: impl Into<String>) -> ShareApi {
        ShareApi::new(self.clone(), server)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue one request, racing the client timeout.
    ///
    /// Resolves with the response body for a 2xx status. A malformed URL is
    /// reported as an error result rather than failing at call time. When
    /// the timeout fires first, the in-progress exchange is dropped (which
    /// aborts the connection) and any later response is never observed.
    pub async fn fetch(
        &self,
        url: &str,
        method: Method,
        headers: HeaderMap,
        body: Option<String>,
    ) -> Result<String> {
        let parsed = Url::parse(url)?;
        debug!(%method, %url, "Sending request");

        let mut request = self.inner.http.request(method, parsed).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Network {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            Ok::<_, Error>(response.text().await?)
        };

        match tokio::time::timeout(self.inner.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%url, timeout = ?self.inner.timeout, "Request timed out");
                Err(Error::TimedOut {
                    url: url.to_string(),
                })
            }
        }
    }

    /// GET a URL as text, bypassing intermediate caches.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        self.fetch(url, Method::GET, headers, None).await
    }

    /// GET a URL and parse the body as JSON.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get_text(url).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST a raw body.
    pub async fn post_text(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Option<String>,
    ) -> Result<String> {
        self.fetch(url, Method::POST, headers, body).await
    }

    /// POST an optional JSON body and parse the response as JSON.
    pub async fn post_json<T, B>(&self, url: &str, headers: HeaderMap, body: Option<&B>) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let body = body.map(serde_json::to_string).transpose()?;
        let text = self.post_text(url, headers, body).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Builder for creating a [`RemoteClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RemoteClient> {
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("nightlight/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder().user_agent(user_agent).build()?;

        Ok(RemoteClient {
            inner: Arc::new(ClientInner {
                http,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
