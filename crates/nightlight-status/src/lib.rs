//! Data aggregation engine for nightlight.
//!
//! Turns heterogeneous, occasionally stale device records into one short
//! status string plus an age indicator:
//!
//! - [`sync`]: incremental, projected fetches written through bounded caches
//! - [`session`]: explicit session state (caches, profile, vendor token)
//!   with one single-flight coordinator per stream
//! - [`basal`]: daily schedule + temp basal timeline reconstruction
//! - [`loop_status`]: automated-loop freshness and success classification
//! - [`aggregator`]: display mode dispatch with per-source failure isolation
//!
//! # Example
//!
//! ```rust,ignore
//! use nightlight_status::{Aggregator, Session, SessionOptions};
//!
//! let session = Session::new(client, SessionOptions::from_config(&config)?);
//! let aggregator = Aggregator::new(session, &config);
//! let line = aggregator.refresh().await;
//! println!("{} ({:?}s old)", line.text, line.recency);
//! ```

pub mod aggregator;
pub mod basal;
pub mod clock;
pub mod error;
pub mod format;
pub mod line;
pub mod loop_status;
pub mod producers;
pub mod record;
pub mod session;
pub mod sync;
pub mod time;

pub use aggregator::Aggregator;
pub use basal::{ActiveBasal, ActiveTemp, BasalInterval, BasalSchedule, IntervalSource, TempBasal};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use line::StatusLine;
pub use loop_status::{LoopDisplayOptions, LoopField, LoopStatusEntry};
pub use record::Record;
pub use session::{DexcomAccount, Session, SessionOptions, StreamKind};
pub use time::ScheduleZone;
