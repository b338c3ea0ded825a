//! Eviction policies for bounded caches.

use std::time::Duration;

/// How a [`BoundedCache`](crate::BoundedCache) bounds its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Drop entries whose ordering key is older than `now - max_age`.
    MaxAge(Duration),

    /// Keep only the `n` most recent entries.
    MaxSize(usize),
}

impl Eviction {
    /// Max-age policy from a number of seconds.
    pub fn max_age_secs(secs: u64) -> Self {
        Eviction::MaxAge(Duration::from_secs(secs))
    }

    /// Max-size policy.
    pub fn max_size(n: usize) -> Self {
        Eviction::MaxSize(n)
    }

    /// The size bound, if this is a max-size policy.
    pub fn size_limit(&self) -> Option<usize> {
        match self {
            Eviction::MaxSize(n) => Some(*n),
            Eviction::MaxAge(_) => None,
        }
    }

    /// The age bound, if this is a max-age policy.
    pub fn age_limit(&self) -> Option<Duration> {
        match self {
            Eviction::MaxAge(age) => Some(*age),
            Eviction::MaxSize(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits() {
        assert_eq!(Eviction::max_size(3).size_limit(), Some(3));
        assert_eq!(Eviction::max_size(3).age_limit(), None);
        assert_eq!(
            Eviction::max_age_secs(60).age_limit(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(Eviction::max_age_secs(60).size_limit(), None);
    }
}
