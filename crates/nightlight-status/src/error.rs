//! Error types for status derivation.

use std::sync::Arc;

/// Error type for sync and status operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request to a data source failed.
    #[error(transparent)]
    Client(#[from] nightlight_client::Error),

    /// A failure fanned out by a single-flight coordinator to several waiters.
    #[error(transparent)]
    Shared(#[from] Arc<Error>),

    /// Configuration could not be turned into a session.
    #[error(transparent)]
    InvalidConfig(#[from] nightlight_config::ConfigError),

    /// A producer needs a setting that is not configured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The underlying client error, looking through shared wrappers.
    pub fn client_error(&self) -> Option<&nightlight_client::Error> {
        match self {
            Error::Client(e) => Some(e),
            Error::Shared(inner) => inner.client_error(),
            _ => None,
        }
    }
}

/// Result type for sync and status operations.
pub type Result<T> = std::result::Result<T, Error>;
