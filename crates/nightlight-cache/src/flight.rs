//! Single-flight coalescing of concurrent fetches.
//!
//! While a task for a key is running, further calls with the same key attach
//! to it instead of starting another one. Every caller observes the same
//! settled value, success or failure. The key is released the moment the
//! task settles, so the next call after that starts a fresh task.
//!
//! ```text
//! caller A ─┐
//! caller B ─┼──► SingleFlight ──► one producer future
//! caller C ─┘        ▲                    │
//!                    └── same value ◄─────┘
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::debug;

type InFlight<K, V> = Arc<Mutex<HashMap<K, (u64, Shared<BoxFuture<'static, V>>)>>>;

/// Coalescing statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlightStats {
    /// Calls made.
    pub total_calls: u64,
    /// Calls that attached to an already running task.
    pub coalesced_calls: u64,
    /// Calls that started a new task.
    pub started_tasks: u64,
}

/// Coalesces concurrent calls per key into one running task.
///
/// `V` is usually a `Result` whose error side is cheap to clone (for example
/// wrapped in an `Arc`), since every waiter receives its own clone.
pub struct SingleFlight<K, V> {
    name: &'static str,
    in_flight: InFlight<K, V>,
    next_id: AtomicU64,
    total_calls: AtomicU64,
    coalesced_calls: AtomicU64,
}

impl<K, V> SingleFlight<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a coordinator; `name` shows up in log output.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
            coalesced_calls: AtomicU64::new(0),
        }
    }

    /// Run `producer` for `key`, or join the task already running for it.
    ///
    /// `producer` is only invoked when no task for `key` is outstanding.
    pub async fn run<F, Fut>(&self, key: K, producer: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let task = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some((_, task)) => {
                    self.coalesced_calls.fetch_add(1, Ordering::Relaxed);
                    debug!(flight = self.name, "Joining in-flight task");
                    task.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let registry = Arc::clone(&self.in_flight);
                    let release_key = key.clone();
                    let fut = producer();
                    let task = async move {
                        let value = fut.await;
                        // Release before any waiter sees the value.
                        let mut in_flight = registry.lock();
                        if matches!(in_flight.get(&release_key), Some((current, _)) if *current == id)
                        {
                            in_flight.remove(&release_key);
                        }
                        value
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, (id, task.clone()));
                    debug!(flight = self.name, "Started new task");
                    task
                }
            }
        };

        task.await
    }

    /// Number of keys with a running task.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Snapshot of the coalescing counters.
    pub fn stats(&self) -> FlightStats {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let coalesced_calls = self.coalesced_calls.load(Ordering::Relaxed);
        FlightStats {
            total_calls,
            coalesced_calls,
            started_tasks: total_calls - coalesced_calls,
        }
    }
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("name", &self.name)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_producer(
        calls: &Arc<AtomicUsize>,
        value: Result<u32, Arc<String>>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, Arc<String>>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                value
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_task() {
        let flight: SingleFlight<&str, Result<u32, Arc<String>>> = SingleFlight::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            flight.run("sgv", counting_producer(&calls, Ok(7))),
            flight.run("sgv", counting_producer(&calls, Ok(8))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(flight.stats().coalesced_calls, 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let flight: SingleFlight<&str, Result<u32, Arc<String>>> = SingleFlight::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let err = Err(Arc::new("boom".to_string()));

        let (a, b) = tokio::join!(
            flight.run("sgv", counting_producer(&calls, err.clone())),
            flight.run("sgv", counting_producer(&calls, Ok(1))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, err);
        assert_eq!(b, err);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight: SingleFlight<&str, Result<u32, Arc<String>>> = SingleFlight::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            flight.run("sgv", counting_producer(&calls, Ok(1))),
            flight.run("cal", counting_producer(&calls, Ok(2))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!((a, b), (Ok(1), Ok(2)));
    }

    #[tokio::test]
    async fn test_settled_key_starts_fresh_task() {
        let flight: SingleFlight<&str, Result<u32, Arc<String>>> = SingleFlight::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let first = flight.run("sgv", counting_producer(&calls, Ok(1))).await;
        let second = flight.run("sgv", counting_producer(&calls, Ok(2))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!((first, second), (Ok(1), Ok(2)));
        assert_eq!(flight.stats().started_tasks, 2);
    }
}
