//! Controller metrics
//!
//! Every series is registered on a registry owned by the process and served
//! from the admin server's `/metrics` endpoint.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_RETRY: &str = "retry";
pub const RESULT_DROPPED: &str = "dropped";

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_total: IntCounterVec,
    reconcile_duration: HistogramVec,
    queue_depth: IntGaugeVec,
    queue_retries: IntCounterVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new("ingress_operator_reconcile_total", "Total number of syncs by result"),
            &["controller", "result"],
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "ingress_operator_reconcile_duration_seconds",
                "Sync duration in seconds",
            ),
            &["controller"],
        )?;
        let queue_depth = IntGaugeVec::new(
            Opts::new("ingress_operator_workqueue_depth", "Keys waiting in the work queue"),
            &["controller"],
        )?;
        let queue_retries = IntCounterVec::new(
            Opts::new("ingress_operator_workqueue_retries_total", "Keys requeued with backoff"),
            &["controller"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(queue_retries.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            reconcile_duration,
            queue_depth,
            queue_retries,
        })
    }

    /// Record one finished sync
    pub fn record_sync(&self, controller: &str, result: &str, duration_secs: f64) {
        self.reconcile_total.with_label_values(&[controller, result]).inc();
        self.reconcile_duration
            .with_label_values(&[controller])
            .observe(duration_secs);
        if result == RESULT_RETRY {
            self.queue_retries.with_label_values(&[controller]).inc();
        }
    }

    pub fn set_queue_depth(&self, controller: &str, depth: usize) {
        self.queue_depth
            .with_label_values(&[controller])
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    /// Prometheus text exposition of every series
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
