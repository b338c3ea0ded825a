//! The text + recency pair every producer yields.

use serde_json::json;

/// Placeholder shown when a source has no usable data.
pub const UNAVAILABLE: &str = "-";

/// One status result: display text and the age of the data behind it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusLine {
    /// Display text.
    pub text: String,
    /// Age of the backing data in seconds, when known.
    pub recency: Option<i64>,
}

impl StatusLine {
    /// A line with text and no recency.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            recency: None,
        }
    }

    /// A line with text and recency.
    pub fn with_recency(text: impl Into<String>, recency: i64) -> Self {
        Self {
            text: text.into(),
            recency: Some(recency),
        }
    }

    /// The unavailable placeholder.
    pub fn unavailable() -> Self {
        Self::new(UNAVAILABLE)
    }

    /// Empty text.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this is the unavailable placeholder.
    pub fn is_unavailable(&self) -> bool {
        self.text == UNAVAILABLE
    }

    /// JSON form used by the CLI's `--json` output.
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "text": self.text, "recency": self.recency })
    }
}
