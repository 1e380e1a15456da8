//! # Exponential Backoff
//!
//! Computes per-item retry delays that double with every consecutive failure.
//! The first failure waits `base`, the second `2 * base`, the third `4 * base`,
//! and so on until the delay is capped at `max`.
//!
//! With the controller defaults (5ms base, 1000s cap) a key that keeps failing
//! is retried at 5ms, 10ms, 20ms, ... and reaches the cap after 18 failures.

use std::time::Duration;

/// Default delay before the first retry of a failing key
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default upper bound for a single retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Exponential backoff calculator
///
/// Stateless: callers keep the failure count and ask for the delay that
/// corresponds to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay for the first failure
    base: Duration,
    /// Cap applied to every delay
    max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with the given base delay and cap
    ///
    /// # Arguments
    ///
    /// * `base` - Delay returned for the first failure
    /// * `max` - Maximum delay ever returned
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Calculate the delay for a given number of previous failures
    ///
    /// `failures` is 0-indexed: 0 means this is the first failure of the item.
    /// Overflow saturates to `max`.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures);
        match factor.and_then(|factor| self.base.checked_mul(factor)) {
            Some(delay) => delay.min(self.max),
            None => self.max,
        }
    }
}
