//! Work queue for controller reconcile keys
//!
//! Keys (`namespace/name`) are deduplicated while waiting, serialized while in
//! flight and retried with per-key exponential backoff. Workers loop on
//! [`WorkQueue::get`], run their handler, then call [`WorkQueue::done`] and
//! either [`WorkQueue::forget`] (success or terminal failure) or
//! [`WorkQueue::add_rate_limited`] (retriable failure).

pub mod backoff;
pub mod queue;
pub mod rate_limiter;

pub use backoff::ExponentialBackoff;
pub use queue::WorkQueue;
pub use rate_limiter::{ItemExponentialRateLimiter, RateLimiter};
