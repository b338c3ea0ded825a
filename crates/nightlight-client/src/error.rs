//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Server answered with a non-2xx status.
    #[error("Request failed, status {status}: {url}")]
    Network {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// No response before the client timeout elapsed.
    #[error("Request timed out: {url}")]
    TimedOut {
        /// Requested URL.
        url: String,
    },

    /// Response body was not the expected JSON.
    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level failure (connect, TLS, body read).
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vendor payload was well-formed JSON but not in the expected shape.
    #[error("Unexpected vendor response: {0}")]
    Vendor(String),
}

impl Error {
    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut { .. })
    }

    /// Check if this is an authentication failure.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Network { status: 401 | 403, .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Network { status, .. } if *status >= 500)
    }

    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Network { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let err = Error::Network {
            status: 503,
            url: "http://x".to_string(),
        };
        assert!(err.is_server_error());
        assert!(!err.is_timeout());
        assert_eq!(err.status(), Some(503));

        let err = Error::TimedOut {
            url: "http://x".to_string(),
        };
        assert!(err.is_timeout());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_display_carries_status_and_url() {
        let err = Error::Network {
            status: 404,
            url: "http://x/api".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed, status 404: http://x/api");
    }
}
