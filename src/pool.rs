//! Bounded worker pool dispatches are submitted to.

use crate::error::DispatchError;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::warn;

/// Runs at most `pool_size` futures at once with up to `queue_depth` more
/// waiting for a slot.
///
/// [`submit`](Self::submit) never blocks: it either admits the work or returns
/// [`DispatchError::Saturated`].
#[derive(Debug, Clone)]
pub struct WorkerPool {
    runtime: Handle,
    workers: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    pool_size: usize,
    queue_depth: usize,
}

impl WorkerPool {
    /// Pool spawning onto `runtime`.
    pub fn new(runtime: Handle, pool_size: usize, queue_depth: usize) -> Self {
        Self {
            runtime,
            workers: Arc::new(Semaphore::new(pool_size)),
            admission: Arc::new(Semaphore::new(pool_size + queue_depth)),
            pool_size,
            queue_depth,
        }
    }

    /// Admit `work` and return immediately.
    pub fn submit<F>(&self, work: F) -> Result<(), DispatchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = match Arc::clone(&self.admission).try_acquire_owned() {
            Ok(ticket) => ticket,
            Err(_) => {
                let err = DispatchError::Saturated {
                    in_flight: self.in_flight(),
                    max: self.capacity(),
                };
                warn!(target: "slashgate::pool", error = %err, "dispatch rejected");
                return Err(err);
            }
        };
        let workers = Arc::clone(&self.workers);
        self.runtime.spawn(async move {
            let _ticket = ticket;
            let Ok(_slot) = workers.acquire_owned().await else {
                return;
            };
            work.await;
        });
        Ok(())
    }

    /// Dispatches admitted and not yet finished (running or queued).
    pub fn in_flight(&self) -> usize {
        self.capacity().saturating_sub(self.admission.available_permits())
    }

    /// Dispatches currently running.
    pub fn running(&self) -> usize {
        self.pool_size.saturating_sub(self.workers.available_permits())
    }

    /// Running plus queued limit.
    pub fn capacity(&self) -> usize {
        self.pool_size + self.queue_depth
    }

    /// Concurrent workers.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Waiting slots.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_submitted_work() {
        let pool = WorkerPool::new(Handle::current(), 2, 2);
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for _ in 0..3 {
            let counter = counter.clone();
            let tx = tx.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            })
            .unwrap();
        }
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejects_when_pool_and_queue_are_full() {
        let pool = WorkerPool::new(Handle::current(), 1, 1);
        let gate = Arc::new(tokio::sync::Notify::new());

        for _ in 0..2 {
            let gate = gate.clone();
            pool.submit(async move { gate.notified().await }).unwrap();
        }
        assert_eq!(pool.in_flight(), 2);

        let err = pool.submit(async {}).unwrap_err();
        assert!(err.is_saturated());
        match err {
            DispatchError::Saturated { in_flight, max } => {
                assert_eq!(in_flight, 2);
                assert_eq!(max, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn limits_concurrency_to_pool_size() {
        let pool = WorkerPool::new(Handle::current(), 3, 20);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(tokio::sync::Semaphore::new(0));

        for _ in 0..15 {
            let current = current.clone();
            let peak = peak.clone();
            let done = done.clone();
            pool.submit(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                done.add_permits(1);
            })
            .unwrap();
        }
        let _all = done.acquire_many(15).await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn slots_are_released_after_completion() {
        let pool = WorkerPool::new(Handle::current(), 1, 0);
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.submit(async move {
            let _ = tx.send(());
        })
        .unwrap();
        rx.await.unwrap();
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if pool.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.submit(async {}).is_ok());
    }
}
