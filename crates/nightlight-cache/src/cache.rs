//! Newest-first record cache with age or size eviction.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use crate::config::Eviction;

/// A record with an ordering key in epoch milliseconds.
pub trait Timestamped {
    /// Ordering key (epoch milliseconds).
    fn timestamp_ms(&self) -> i64;
}

/// Ordered record cache.
///
/// Entries are kept strictly descending by [`Timestamped::timestamp_ms`].
/// New entries are merged ahead of the existing ones and the active
/// [`Eviction`] policy is applied after every mutation.
#[derive(Debug, Clone)]
pub struct BoundedCache<T> {
    name: String,
    entries: Vec<T>,
    eviction: Eviction,
}

impl<T: Timestamped> BoundedCache<T> {
    /// Create an empty cache.
    pub fn new(name: impl Into<String>, eviction: Eviction) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            eviction,
        }
    }

    /// Cache name, used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active eviction policy.
    pub fn eviction(&self) -> Eviction {
        self.eviction
    }

    /// All entries, newest first.
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// The newest entry, which is the cursor for incremental fetches.
    pub fn newest(&self) -> Option<&T> {
        self.entries.first()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `new_entries` ahead of the existing entries and re-apply the
    /// eviction policy against the current wall clock.
    pub fn update(&mut self, new_entries: Vec<T>) -> &[T] {
        self.update_at(new_entries, now_ms())
    }

    /// Like [`update`](Self::update), evaluating max-age eviction at `now_ms`.
    ///
    /// `new_entries` is expected newest-first. Entries sharing an ordering
    /// key with an entry already ahead of them are dropped, so the result is
    /// strictly descending. An empty input leaves the cache untouched.
    pub fn update_at(&mut self, new_entries: Vec<T>, now_ms: i64) -> &[T] {
        if new_entries.is_empty() {
            return &self.entries;
        }

        let added = new_entries.len();
        let mut merged = new_entries;
        merged.append(&mut self.entries);
        // Stable, so a fresh copy of a record wins over the cached one.
        merged.sort_by(|a, b| b.timestamp_ms().cmp(&a.timestamp_ms()));
        merged.dedup_by(|later, earlier| later.timestamp_ms() == earlier.timestamp_ms());
        self.entries = merged;

        self.evict(now_ms);
        trace!(cache = %self.name, added, len = self.entries.len(), "Cache updated");
        &self.entries
    }

    /// Drop every entry, forcing the next fetch to be a cold one.
    pub fn clear(&mut self) {
        debug!(cache = %self.name, dropped = self.entries.len(), "Cache cleared");
        self.entries.clear();
    }

    /// Switch to max-age eviction and re-trim immediately.
    pub fn set_max_age(&mut self, secs: u64) {
        self.set_max_age_at(secs, now_ms());
    }

    /// Like [`set_max_age`](Self::set_max_age), evaluated at `now_ms`.
    pub fn set_max_age_at(&mut self, secs: u64, now_ms: i64) {
        self.eviction = Eviction::max_age_secs(secs);
        self.evict(now_ms);
    }

    /// Switch to max-size eviction and re-trim immediately.
    pub fn set_max_size(&mut self, n: usize) {
        self.eviction = Eviction::max_size(n);
        self.evict(now_ms());
    }

    fn evict(&mut self, now_ms: i64) {
        let before = self.entries.len();
        match self.eviction {
            Eviction::MaxSize(n) => self.entries.truncate(n),
            Eviction::MaxAge(age) => {
                let cutoff = now_ms.saturating_sub(age.as_millis() as i64);
                // Descending order: everything past the first stale entry is stale.
                let keep = self
                    .entries
                    .iter()
                    .position(|e| e.timestamp_ms() < cutoff)
                    .unwrap_or(self.entries.len());
                self.entries.truncate(keep);
            }
        }

        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(cache = %self.name, evicted, "Evicted cache entries");
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Reading {
        date: i64,
        value: u32,
    }

    impl Timestamped for Reading {
        fn timestamp_ms(&self) -> i64 {
            self.date
        }
    }

    fn r(date: i64, value: u32) -> Reading {
        Reading { date, value }
    }

    fn dates(cache: &BoundedCache<Reading>) -> Vec<i64> {
        cache.entries().iter().map(|e| e.date).collect()
    }

    #[test]
    fn test_max_size_keeps_most_recent() {
        let mut cache = BoundedCache::new("test", Eviction::max_size(3));
        cache.update(vec![r(50, 1), r(40, 1), r(30, 1)]);
        cache.update(vec![r(70, 2), r(60, 2)]);

        assert_eq!(dates(&cache), vec![70, 60, 50]);
        assert_eq!(cache.newest().unwrap().value, 2);
    }

    #[test]
    fn test_max_age_drops_stale_entries() {
        let mut cache = BoundedCache::new("test", Eviction::max_age_secs(10));
        let now = 100_000;
        cache.update_at(vec![r(99_000, 1), r(91_000, 1), r(89_999, 1)], now);

        assert_eq!(dates(&cache), vec![99_000, 91_000]);
        assert!(cache.entries().iter().all(|e| e.date >= now - 10_000));
    }

    #[test]
    fn test_empty_update_is_noop() {
        let mut cache = BoundedCache::new("test", Eviction::max_age_secs(10));
        cache.update_at(vec![r(99_000, 1)], 100_000);

        // A later clock would evict, but an empty update must not touch anything.
        cache.update_at(Vec::new(), 1_000_000);
        assert_eq!(dates(&cache), vec![99_000]);
    }

    #[test]
    fn test_duplicate_head_is_dropped() {
        let mut cache = BoundedCache::new("test", Eviction::max_size(10));
        cache.update(vec![r(20, 1), r(10, 1)]);
        cache.update(vec![r(30, 2), r(20, 2)]);

        assert_eq!(dates(&cache), vec![30, 20, 10]);
        // The freshly fetched copy wins.
        assert_eq!(cache.entries()[1].value, 2);
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let mut cache = BoundedCache::new("test", Eviction::max_size(10));
        cache.update(vec![r(10, 1), r(30, 1), r(20, 1)]);
        assert_eq!(dates(&cache), vec![30, 20, 10]);
    }

    #[test]
    fn test_clear_drops_cursor() {
        let mut cache = BoundedCache::new("test", Eviction::max_size(10));
        cache.update(vec![r(10, 1)]);
        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.newest().is_none());
    }

    #[test]
    fn test_set_max_size_retrims() {
        let mut cache = BoundedCache::new("test", Eviction::max_size(10));
        cache.update(vec![r(40, 1), r(30, 1), r(20, 1), r(10, 1)]);
        cache.set_max_size(2);

        assert_eq!(dates(&cache), vec![40, 30]);
        assert_eq!(cache.eviction(), Eviction::max_size(2));
    }

    #[test]
    fn test_set_max_age_retrims() {
        let mut cache = BoundedCache::new("test", Eviction::max_size(10));
        cache.update(vec![r(95_000, 1), r(50_000, 1)]);
        cache.set_max_age_at(10, 100_000);

        assert_eq!(dates(&cache), vec![95_000]);
    }
}
