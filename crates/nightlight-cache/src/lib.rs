//! Bounded, time-ordered record caches and single-flight coalescing.
//!
//! This crate provides the two building blocks the sync engine writes
//! through:
//! - [`BoundedCache`]: records kept newest-first, bounded by age or count
//! - [`SingleFlight`]: one in-flight task per key, its result fanned out to
//!   every caller that arrived while it was running
//!
//! # Example
//!
//! ```rust,ignore
//! use nightlight_cache::{BoundedCache, Eviction};
//!
//! let mut cache = BoundedCache::new("sgv", Eviction::max_age_secs(3600));
//! cache.update(fetched_newest_first);
//! ```

mod cache;
mod config;
mod flight;

pub use cache::{BoundedCache, Timestamped};
pub use config::Eviction;
pub use flight::{FlightStats, SingleFlight};
