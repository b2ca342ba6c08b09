//! Fixed-delay retry policy used while waiting for the device to show up.

use std::time::Duration;

/// Delay used between discovery attempts.
pub const DISCOVERY_BACKOFF: Duration = Duration::from_secs(5);

/// How often and how patiently an operation is retried.
///
/// `max_attempts: None` retries forever; the caller is expected to check for
/// cancellation between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever(DISCOVERY_BACKOFF)
    }
}

impl RetryPolicy {
    pub const fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub const fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}
