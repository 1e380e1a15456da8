//! Deduplicating work queue with delayed and rate-limited insertion.
//!
//! A key is in at most one of three places at a time:
//! - queued, waiting for a worker,
//! - processing, handed out by `get` and not yet released by `done`,
//! - both processing and dirty, meaning it was re-added while in flight and
//!   is put back on the queue as soon as the in-flight run calls `done`.
//!
//! This guarantees a single worker per key without any per-key locking in
//! the caller, and that no notification is lost while a key is in flight.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::rate_limiter::{ItemExponentialRateLimiter, RateLimiter};

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

struct Inner {
    name: String,
    state: Mutex<State>,
    /// Signalled when a key becomes available or the queue shuts down
    available: Notify,
    /// Signalled when the last in-flight key is released
    drained: Notify,
    rate_limiter: Box<dyn RateLimiter>,
}

/// Rate-limited work queue of reconcile keys.
///
/// Cheap to clone; all clones share the same queue.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl WorkQueue {
    /// Create a queue using the default per-item exponential rate limiter
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rate_limiter(name, ItemExponentialRateLimiter::default())
    }

    /// Create a queue with a custom rate limiter
    pub fn with_rate_limiter(name: impl Into<String>, rate_limiter: impl RateLimiter + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State::default()),
                available: Notify::new(),
                drained: Notify::new(),
                rate_limiter: Box::new(rate_limiter),
            }),
        }
    }

    /// Name used in logs and metrics
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing processing.
    ///
    /// A key already waiting is not queued twice. A key currently being
    /// processed is redelivered once its worker calls [`WorkQueue::done`].
    /// Keys added after shutdown are ignored.
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            debug!(queue = %self.inner.name, key = %key, "Key in flight, marked dirty");
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.inner.available.notify_one();
    }

    /// Add `key` once `delay` has elapsed.
    ///
    /// Must be called from within a Tokio runtime when `delay` is non-zero.
    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if self.is_shutting_down() {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Add `key` after the delay the rate limiter assigns to it.
    pub fn add_rate_limited(&self, key: impl Into<String>) {
        let key = key.into();
        let delay = self.inner.rate_limiter.when(&key);
        debug!(queue = %self.inner.name, key = %key, delay = ?delay, "Requeueing with backoff");
        self.add_after(key, delay);
    }

    /// Clear the rate limiter history for `key`.
    ///
    /// Call after a successful or terminally failed run so the next failure
    /// starts from the base delay again.
    pub fn forget(&self, key: &str) {
        self.inner.rate_limiter.forget(key);
    }

    /// Number of times `key` has been requeued through the rate limiter
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.inner.rate_limiter.num_requeues(key)
    }

    /// Wait for the next key.
    ///
    /// Returns `None` once the queue is shutting down and nothing is left to
    /// hand out. Every `Some(key)` must be released with [`WorkQueue::done`].
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.available.notified();
            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Release `key` after processing.
    pub fn done(&self, key: &str) {
        let mut state = self.state();
        state.processing.remove(key);
        let requeued = state.dirty.contains(key) && !state.shutting_down;
        if requeued {
            state.queue.push_back(key.to_string());
        }
        let drained = state.processing.is_empty();
        drop(state);

        if requeued {
            self.inner.available.notify_one();
        }
        if drained {
            self.inner.drained.notify_waiters();
        }
    }

    /// Number of keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    /// Whether no keys are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`WorkQueue::shut_down`] has been called
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Stop accepting keys and wake every waiting worker.
    ///
    /// Keys already queued are still handed out by `get`; in-flight keys are
    /// not redelivered.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        info!(queue = %self.inner.name, "Shutting down work queue");
        self.inner.available.notify_waiters();
    }

    /// Shut down and wait until every in-flight key has been released.
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let drained = self.inner.drained.notified();
            if self.state().processing.is_empty() {
                return;
            }
            drained.await;
        }
    }
}
