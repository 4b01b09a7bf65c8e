use super::RateLimitRegistry;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Periodic expired-bucket purge running on its own tokio task.
///
/// Holds a weak reference to the registry; the task ends when the registry is
/// dropped, and is aborted when this handle is dropped.
#[derive(Debug)]
pub struct PurgeTask {
    handle: JoinHandle<()>,
    period: Duration,
}

impl PurgeTask {
    /// Start purging `registry` every `period`, first run one period from now.
    pub fn spawn(runtime: &Handle, registry: &Arc<RateLimitRegistry>, period: Duration) -> Self {
        let registry: Weak<RateLimitRegistry> = Arc::downgrade(registry);
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    debug!(
                        target: "slashgate::rate_limit",
                        "registry dropped; stopping purge task"
                    );
                    break;
                };
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| registry.purge_expired())) {
                    error!(
                        target: "slashgate::rate_limit",
                        panic = %panic_message(panic.as_ref()),
                        "purge cycle panicked; next cycle still scheduled"
                    );
                }
            }
        });
        Self { handle, period }
    }

    /// Purge period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PurgeTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::RateLimitPolicy;

    #[tokio::test(start_paused = true)]
    async fn purges_on_each_tick() {
        let clock = ManualClock::new(0);
        let registry = Arc::new(RateLimitRegistry::with_clock(Arc::new(clock.clone())));
        let policy = RateLimitPolicy::per_user(1, Duration::from_secs(1)).unwrap();
        registry.acquire_key(&policy, "U:1:ping");

        let task = PurgeTask::spawn(&Handle::current(), &registry, Duration::from_secs(60));
        clock.advance(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(registry.is_empty());
        assert!(!task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_registry_dropped() {
        let registry = Arc::new(RateLimitRegistry::new());
        let task = PurgeTask::spawn(&Handle::current(), &registry, Duration::from_secs(1));
        drop(registry);
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(task.is_finished());
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let err = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "boom");
        let err = catch_unwind(|| panic!("{}", String::from("owned"))).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "owned");
    }
}
