//! Execution counters.
//!
//! The executor reports through a [`MetricsStrategy`]: one `inc_handled` per
//! dispatch, then exactly one of `inc_succeeded` or `inc_failed`. Sinks are
//! called from many dispatches at once and must tolerate concurrent use.

use crate::event::InteractionEvent;
use crate::rate_limit::purge::panic_message;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Sink for dispatch counters.
pub trait MetricsStrategy: Send + Sync {
    /// A dispatch started.
    fn inc_handled(&self, event: &InteractionEvent);
    /// The body returned normally after `elapsed_ms` whole milliseconds.
    fn inc_succeeded(&self, event: &InteractionEvent, elapsed_ms: u64);
    /// The dispatch ended in any other way.
    fn inc_failed(&self, event: &InteractionEvent);
}

impl<M: MetricsStrategy + ?Sized> MetricsStrategy for Arc<M> {
    fn inc_handled(&self, event: &InteractionEvent) {
        (**self).inc_handled(event)
    }

    fn inc_succeeded(&self, event: &InteractionEvent, elapsed_ms: u64) {
        (**self).inc_succeeded(event, elapsed_ms)
    }

    fn inc_failed(&self, event: &InteractionEvent) {
        (**self).inc_failed(event)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetrics;

impl MetricsStrategy for NullMetrics {
    fn inc_handled(&self, _event: &InteractionEvent) {}
    fn inc_succeeded(&self, _event: &InteractionEvent, _elapsed_ms: u64) {}
    fn inc_failed(&self, _event: &InteractionEvent) {}
}

/// Writes each signal as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMetrics;

impl MetricsStrategy for LogMetrics {
    fn inc_handled(&self, event: &InteractionEvent) {
        info!(target: "slashgate::metrics", command = event.command_path(), "handled");
    }

    fn inc_succeeded(&self, event: &InteractionEvent, elapsed_ms: u64) {
        info!(
            target: "slashgate::metrics",
            command = event.command_path(),
            elapsed_ms,
            "succeeded"
        );
    }

    fn inc_failed(&self, event: &InteractionEvent) {
        info!(target: "slashgate::metrics", command = event.command_path(), "failed");
    }
}

/// Counts in memory; for tests and diagnostics. Clones share counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetrics {
    handled: Arc<AtomicU64>,
    succeeded: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    durations: Arc<Mutex<Vec<(String, u64)>>>,
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Dispatches started.
    pub handled: u64,
    /// Dispatches that succeeded.
    pub succeeded: u64,
    /// Dispatches that failed.
    pub failed: u64,
}

impl MemoryMetrics {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            handled: self.handled.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    /// `(command path, elapsed ms)` for each success, in report order.
    pub fn durations(&self) -> Vec<(String, u64)> {
        self.durations.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl MetricsStrategy for MemoryMetrics {
    fn inc_handled(&self, _event: &InteractionEvent) {
        self.handled.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_succeeded(&self, event: &InteractionEvent, elapsed_ms: u64) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.durations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.command_path().to_owned(), elapsed_ms));
    }

    fn inc_failed(&self, _event: &InteractionEvent) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Call into a sink, containing any panic it raises.
pub(crate) fn report_best_effort<F>(signal: &'static str, report: F)
where
    F: FnOnce(),
{
    if let Err(panic) = catch_unwind(AssertUnwindSafe(report)) {
        warn!(
            target: "slashgate::metrics",
            signal,
            panic = %panic_message(panic.as_ref()),
            "metrics sink panicked; signal dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MemoryResponder;

    fn event() -> InteractionEvent {
        InteractionEvent::builder("ping", 1, Arc::new(MemoryResponder::new())).build()
    }

    #[test]
    fn memory_metrics_clones_share_counters() {
        let metrics = MemoryMetrics::new();
        let shared: Arc<dyn MetricsStrategy> = Arc::new(metrics.clone());
        let e = event();
        shared.inc_handled(&e);
        shared.inc_succeeded(&e, 12);
        shared.inc_handled(&e);
        shared.inc_failed(&e);

        assert_eq!(metrics.snapshot(), MetricsSnapshot {
            handled: 2,
            succeeded: 1,
            failed: 1,
        });
        assert_eq!(metrics.durations(), vec![("ping".to_owned(), 12)]);
    }

    #[test]
    fn best_effort_report_contains_panics() {
        struct Exploding;
        impl MetricsStrategy for Exploding {
            fn inc_handled(&self, _event: &InteractionEvent) {
                panic!("sink down");
            }
            fn inc_succeeded(&self, _event: &InteractionEvent, _elapsed_ms: u64) {}
            fn inc_failed(&self, _event: &InteractionEvent) {}
        }

        let e = event();
        report_best_effort("handled", || Exploding.inc_handled(&e));
    }
}
