//! HTTP client for the glucose data sources nightlight reads from.
//!
//! Two API families are covered:
//!
//! - **Nightscout**: read-only time-series endpoints (`entries`, `treatments`,
//!   `devicestatus`, `profile`), JSON arrays newest first
//! - **Dexcom Share**: session-token vendor API returning recent readings
//!
//! Every request races the configured timeout. A timed-out request is
//! aborted and reported as [`Error::TimedOut`]; non-2xx answers become
//! [`Error::Network`].
//!
//! # Example
//!
//! ```no_run
//! use nightlight_client::{RemoteClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = RemoteClient::builder()
//!     .timeout(std::time::Duration::from_secs(15))
//!     .build()?;
//!
//! let nightscout = client.nightscout("https://my-site.example")?;
//! let readings: Vec<serde_json::Value> =
//!     client.get_json(&nightscout.sgv_url(24)).await?;
//! println!("{} readings", readings.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use api::{NightscoutApi, ShareApi};
pub use client::{ClientBuilder, RemoteClient};
pub use error::{Error, Result};
pub use types::*;
