//! Worker pool draining one work queue into a sync handler.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use workqueue::WorkQueue;

use crate::metrics::{Metrics, RESULT_DROPPED, RESULT_RETRY, RESULT_SUCCESS};
use crate::reconciler::SyncHandler;

#[derive(Clone)]
pub struct WorkerPool {
    queue: WorkQueue,
    handler: Arc<dyn SyncHandler>,
    metrics: Metrics,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("queue", &self.queue)
            .field("kind", &self.handler.kind())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(queue: WorkQueue, handler: Arc<dyn SyncHandler>, metrics: Metrics) -> Self {
        Self {
            queue,
            handler,
            metrics,
        }
    }

    /// Run `workers` workers until `token` is cancelled.
    ///
    /// On cancellation the queue stops handing out keys; in-flight syncs are
    /// allowed to finish before this returns.
    pub async fn run(self, workers: usize, token: CancellationToken) {
        let kind = self.handler.kind();
        info!("Starting {} {} workers", workers, kind);

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let pool = self.clone();
            let token = token.clone();
            tasks.spawn(async move { while pool.process_next_work_item(&token).await {} });
        }

        token.cancelled().await;
        info!("Shutting down {} workers", kind);
        self.queue.shut_down_with_drain().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("{} worker panicked: {}", kind, e);
            }
        }
        info!("{} workers stopped", kind);
    }

    /// Process one key. Returns `false` once the worker should exit.
    pub async fn process_next_work_item(&self, token: &CancellationToken) -> bool {
        let key = tokio::select! {
            () = token.cancelled() => return false,
            key = self.queue.get() => key,
        };
        let Some(key) = key else {
            return false;
        };

        let kind = self.handler.kind();
        let started = Instant::now();
        let result = self.handler.sync(&key).await;

        let label = match &result {
            Ok(outcome) => {
                debug!("Successfully synced '{}' ({:?})", key, outcome);
                self.queue.forget(&key);
                RESULT_SUCCESS
            }
            Err(e) if e.is_retriable() => {
                warn!("Error syncing {} '{}', requeuing: {}", kind, key, e);
                self.queue.add_rate_limited(key.clone());
                RESULT_RETRY
            }
            Err(e) => {
                error!("Dropping {} '{}' out of the queue: {}", kind, key, e);
                self.queue.forget(&key);
                RESULT_DROPPED
            }
        };
        self.queue.done(&key);

        self.metrics.record_sync(kind, label, started.elapsed().as_secs_f64());
        self.metrics.set_queue_depth(kind, self.queue.len());
        true
    }
}
