//! Dexcom Share vendor API.

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::client::RemoteClient;
use crate::error::Result;
use crate::types::{RawShareGlucose, ShareGlucose, ShareLoginRequest};

/// Share server for accounts registered in the US.
pub const SHARE_SERVER_US: &str = "https://share1.dexcom.com";

/// Share server for accounts registered outside the US.
pub const SHARE_SERVER_OUTSIDE_US: &str = "https://shareous1.dexcom.com";

const LOGIN_PATH: &str = "/ShareWebServices/Services/General/LoginPublisherAccountByName";
const LATEST_GLUCOSE_PATH: &str =
    "/ShareWebServices/Services/Publisher/ReadPublisherLatestGlucoseValues";

/// The mobile app's user agent; the service rejects unknown clients.
const SHARE_USER_AGENT: &str = "Dexcom Share/3.0.2.11 CFNetwork/711.2.23 Darwin/14.0.0";

/// How far back the latest-values call looks.
const LOOKBACK_MINUTES: u32 = 1440;

/// Dexcom Share client.
#[derive(Debug, Clone)]
pub struct ShareApi {
    client: RemoteClient,
    server: String,
}

impl ShareApi {
    pub(crate) fn new(client: RemoteClient, server: impl Into<String>) -> Self {
        Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
        }
    }

    /// Server base URL.
    pub fn server(&self) -> &str {
        &self.server
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(SHARE_USER_AGENT));
        headers
    }

    /// Log in and return an opaque session token.
    pub async fn login(&self, account_name: &str, password: &str) -> Result<String> {
        let url = format!("{}{}", self.server, LOGIN_PATH);
        let body = ShareLoginRequest::new(account_name, password);
        self.client.post_json(&url, Self::headers(), Some(&body)).await
    }

    /// Fetch up to `max_count` of the most recent readings, newest first.
    pub async fn latest_glucose(&self, token: &str, max_count: usize) -> Result<Vec<ShareGlucose>> {
        let url = format!(
            "{}{}?sessionId={}&minutes={}&maxCount={}",
            self.server, LATEST_GLUCOSE_PATH, token, LOOKBACK_MINUTES, max_count
        );
        let raw: Vec<RawShareGlucose> = self
            .client
            .post_json::<_, ()>(&url, Self::headers(), None)
            .await?;
        raw.into_iter().map(ShareGlucose::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_login_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(header("user-agent", SHARE_USER_AGENT))
            .and(body_partial_json(serde_json::json!({
                "accountName": "me",
                "password": "secret",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json("abc-123"))
            .expect(1)
            .mount(&server)
            .await;

        let share = RemoteClient::new().unwrap().share(server.uri());
        let token = share.login("me", "secret").await.unwrap();
        assert_eq!(token, "abc-123");
    }

    #[tokio::test]
    async fn test_latest_glucose_converts_dates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LATEST_GLUCOSE_PATH))
            .and(query_param("sessionId", "abc-123"))
            .and(query_param("minutes", "1440"))
            .and(query_param("maxCount", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"Trend": 4, "Value": 128, "WT": "/Date(1462404876000)/"},
                {"Trend": 3, "Value": 120, "WT": "/Date(1462404576000)/"},
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let share = RemoteClient::new().unwrap().share(server.uri());
        let readings = share.latest_glucose("abc-123", 2).await.unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].date, 1462404876000);
        assert_eq!(readings[1].sgv, 120.0);
    }

    #[tokio::test]
    async fn test_bad_credentials_surface_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let share = RemoteClient::new().unwrap().share(server.uri());
        let err = share.login("me", "wrong").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
