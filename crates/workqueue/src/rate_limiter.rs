//! Per-item rate limiting for requeued keys.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::backoff::ExponentialBackoff;

/// Decides how long a key has to wait before it is retried.
pub trait RateLimiter: Send + Sync {
    /// Record a failure for `key` and return how long to wait before retrying it
    fn when(&self, key: &str) -> Duration;

    /// Stop tracking `key`, resetting its backoff
    fn forget(&self, key: &str);

    /// Number of failures recorded for `key` since it was last forgotten
    fn num_requeues(&self, key: &str) -> u32;
}

/// Rate limiter whose delay doubles with each consecutive failure of a key.
///
/// Retries are unbounded: a key keeps being retried at the capped delay until
/// it is forgotten.
#[derive(Debug, Default)]
pub struct ItemExponentialRateLimiter {
    backoff: ExponentialBackoff,
    failures: Mutex<HashMap<String, u32>>,
}

impl ItemExponentialRateLimiter {
    /// Create a limiter with the given backoff policy
    #[must_use]
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for ItemExponentialRateLimiter {
    fn when(&self, key: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(key.to_string()).or_insert(0);
        let delay = self.backoff.delay_for(*count);
        *count = count.saturating_add(1);
        delay
    }

    fn forget(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn num_requeues(&self, key: &str) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}
