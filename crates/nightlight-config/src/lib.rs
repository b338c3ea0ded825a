//! Configuration system for nightlight.
//!
//! Provides TOML-based configuration with:
//! - Data source selection (Nightscout site or Dexcom Share account)
//! - Status line content (display mode, composite sub-lines, thresholds)
//! - Sync bounds and request timeouts
//! - Config file layering (XDG user config + project-local overrides)
//! - Share password resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_dexcom_password};
pub use types::*;
