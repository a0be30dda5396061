use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Bounded queue for cache and mirror writes that callers do not wait on.
///
/// Every spawned task gets a [`JoinHandle`] so callers can still await a
/// specific write, and [`BackgroundTasks::shutdown`] waits for all of them.
/// At most `max_in_flight` tasks run at once; the rest wait for a permit.
#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Queue `task` on the current tokio runtime.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            // Semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            task.await
        })
    }

    /// Tasks queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task queued so far has finished.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait for queued tasks and leave the tracker closed.
    ///
    /// This does not reject later `spawn` calls: such tasks still run and
    /// hand back their output, but nothing waits for them on exit. Call it
    /// once, after the last operation that queues work.
    pub async fn shutdown(&self) {
        let pending = self.pending();
        if pending > 0 {
            tracing::debug!(pending, "waiting for background tasks");
        }
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_returns_output() {
        let tasks = BackgroundTasks::default();
        let handle = tasks.spawn(async { 21 * 2 });
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_drain_waits_for_all() {
        let tasks = BackgroundTasks::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = Arc::clone(&done);
            tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        tasks.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tasks.pending(), 0);

        // Still usable after a drain
        assert_eq!(tasks.spawn(async { 1 }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let tasks = BackgroundTasks::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        tasks.shutdown().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_still_runs() {
        let tasks = BackgroundTasks::new(1);
        tasks.spawn(tokio::time::sleep(Duration::from_millis(10)));
        assert_eq!(tasks.pending(), 1);
        tasks.shutdown().await;
        assert_eq!(tasks.pending(), 0);

        let late = tasks.spawn(async { "late" });
        assert_eq!(late.await.unwrap(), "late");
        // Already closed and empty: returns without waiting
        tasks.shutdown().await;
        assert_eq!(tasks.pending(), 0);
    }
}
