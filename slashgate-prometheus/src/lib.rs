//! Prometheus metrics for `slashgate`.
//! Bring your own `prometheus::Registry`; counters and a duration histogram are registered into it.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use slashgate::{InteractionEvent, MetricsStrategy};
use std::sync::Arc;
use tracing::debug;

/// Histogram buckets for command run time, in seconds.
pub const DURATION_BUCKETS: &[f64] =
    &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// [`MetricsStrategy`] backed by Prometheus, labelled by command path.
#[derive(Clone, Debug)]
pub struct PrometheusMetrics {
    registry: Arc<Registry>,
    handled: IntCounterVec,
    succeeded: IntCounterVec,
    failed: IntCounterVec,
    duration: HistogramVec,
}

impl PrometheusMetrics {
    /// Create the metrics and register them into the provided registry.
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered (e.g. name conflict).
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let handled = IntCounterVec::new(
            Opts::new("slashgate_commands_handled_total", "Command dispatches started"),
            &["command"],
        )?;
        let succeeded = IntCounterVec::new(
            Opts::new("slashgate_commands_succeeded_total", "Command dispatches that succeeded"),
            &["command"],
        )?;
        let failed = IntCounterVec::new(
            Opts::new("slashgate_commands_failed_total", "Command dispatches that failed"),
            &["command"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "slashgate_command_duration_seconds",
                "Run time of successful commands",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["command"],
        )?;
        registry.register(Box::new(handled.clone()))?;
        registry.register(Box::new(succeeded.clone()))?;
        registry.register(Box::new(failed.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        debug!(target: "slashgate::prometheus", "registered command metrics");
        Ok(Self {
            registry,
            handled,
            succeeded,
            failed,
            duration,
        })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handled count for one command.
    pub fn handled(&self, command: &str) -> u64 {
        self.handled.with_label_values(&[command]).get()
    }

    /// Success count for one command.
    pub fn succeeded(&self, command: &str) -> u64 {
        self.succeeded.with_label_values(&[command]).get()
    }

    /// Failure count for one command.
    pub fn failed(&self, command: &str) -> u64 {
        self.failed.with_label_values(&[command]).get()
    }

    /// Observed durations for one command.
    pub fn duration_samples(&self, command: &str) -> u64 {
        self.duration.with_label_values(&[command]).get_sample_count()
    }
}

impl MetricsStrategy for PrometheusMetrics {
    fn inc_handled(&self, event: &InteractionEvent) {
        self.handled.with_label_values(&[event.command_path()]).inc();
    }

    fn inc_succeeded(&self, event: &InteractionEvent, elapsed_ms: u64) {
        let command = event.command_path();
        self.succeeded.with_label_values(&[command]).inc();
        self.duration.with_label_values(&[command]).observe(elapsed_ms as f64 / 1_000.0);
    }

    fn inc_failed(&self, event: &InteractionEvent) {
        self.failed.with_label_values(&[event.command_path()]).inc();
    }
}
