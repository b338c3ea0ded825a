//! Incremental sync of one record stream through its cache.
//!
//! A stream fetch asks only for records newer than the cache head:
//!
//! ```text
//! cold:  {base}?count=N
//! warm:  {base}?count=N&find[<key>][$gt]=<newest record's key, url-encoded>
//! ```
//!
//! The page is projected, merged into the cache, and the whole cache
//! contents (not just the new page) are returned.

use nightlight_cache::BoundedCache;
use nightlight_client::RemoteClient;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;
use url::form_urlencoded;

use crate::error::Result;
use crate::record::{Record, project};

/// Build the fetch URL for a stream given its current newest record.
pub fn incremental_url(base_url: &str, newest: Option<&Record>, ordering_key: &str) -> String {
    let Some(cursor) = newest.and_then(|r| r.get(ordering_key)) else {
        return base_url.to_string();
    };
    let raw = match cursor {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let encoded: String = form_urlencoded::byte_serialize(raw.as_bytes()).collect();
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}find[{ordering_key}][$gt]={encoded}")
}

/// Fetch new records for a stream and merge them into `cache`.
///
/// The cache lock is never held across the request.
pub async fn sync_from_cache(
    client: &RemoteClient,
    base_url: &str,
    cache: &Mutex<BoundedCache<Record>>,
    ordering_key: &str,
    keep: Option<&[&str]>,
    now_ms: i64,
) -> Result<Vec<Record>> {
    let url = {
        let cache = cache.lock();
        incremental_url(base_url, cache.newest(), ordering_key)
    };

    let page: Vec<Value> = client.get_json(&url).await?;
    let fetched = page.len();
    let records = project(page, ordering_key, keep);

    let mut cache = cache.lock();
    let merged = cache.update_at(records, now_ms).to_vec();
    debug!(cache = cache.name(), fetched, len = merged.len(), "Stream synced");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightlight_cache::Eviction;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(v: Value, key: &str) -> Record {
        Record::from_json(v, key, None).unwrap()
    }

    #[test]
    fn test_cold_url_has_no_filter() {
        let url = incremental_url("https://ns/api/v1/entries/sgv.json?count=10", None, "date");
        assert_eq!(url, "https://ns/api/v1/entries/sgv.json?count=10");
    }

    #[test]
    fn test_warm_url_appends_encoded_cursor() {
        let numeric = record(json!({"date": 1_700_000_000_000i64}), "date");
        assert_eq!(
            incremental_url("https://ns/x?count=1", Some(&numeric), "date"),
            "https://ns/x?count=1&find[date][$gt]=1700000000000"
        );

        let iso = record(json!({"created_at": "2024-01-01T00:00:00+01:00"}), "created_at");
        assert_eq!(
            incremental_url("https://ns/x", Some(&iso), "created_at"),
            "https://ns/x?find[created_at][$gt]=2024-01-01T00%3A00%3A00%2B01%3A00"
        );
    }

    #[tokio::test]
    async fn test_sync_merges_and_returns_whole_cache() {
        let server = MockServer::start().await;
        let base = format!("{}/api/v1/entries/sgv.json?count=3", server.uri());
        let client = RemoteClient::new().unwrap();
        let cache = Mutex::new(BoundedCache::new("sgv", Eviction::max_size(3)));
        cache
            .lock()
            .update_at(vec![record(json!({"date": 1_000, "sgv": 90}), "date")], 0);

        Mock::given(method("GET"))
            .and(path("/api/v1/entries/sgv.json"))
            .and(query_param("find[date][$gt]", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"date": 3_000, "sgv": 110, "device": "x"},
                {"date": 2_000, "sgv": 100},
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = sync_from_cache(
            &client,
            &base,
            &cache,
            "date",
            Some(&["date", "sgv"]),
            0,
        )
        .await
        .unwrap();

        let dates: Vec<i64> = records.iter().map(Record::timestamp).collect();
        assert_eq!(dates, vec![3_000, 2_000, 1_000]);
        assert!(records[0].get("device").is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = RemoteClient::new().unwrap();
        let cache = Mutex::new(BoundedCache::new("cal", Eviction::max_size(1)));
        cache
            .lock()
            .update_at(vec![record(json!({"date": 5}), "date")], 0);

        let result = sync_from_cache(
            &client,
            &format!("{}/cal.json?count=1", server.uri()),
            &cache,
            "date",
            None,
            0,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(cache.lock().len(), 1);
    }
}
