//! Execution substrate used for health probes.
//!
//! The core never sleeps or blocks; it hands timed work to an `Executor` and
//! keeps the returned handle so the work can be cancelled.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;

/// Unit of asynchronous work.
pub type Task = BoxFuture<'static, ()>;

/// Handle to scheduled work.
pub trait Cancellable: Send + Sync {
    /// Cancel the work if it has not completed. Idempotent.
    fn cancel(&self);
}

/// Schedules asynchronous work.
pub trait Executor: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, task: Task) -> Box<dyn Cancellable>;

    /// Run `task` as soon as possible.
    fn run_async(&self, task: Task) -> Box<dyn Cancellable>;
}

impl Cancellable for tokio::task::AbortHandle {
    fn cancel(&self) {
        self.abort();
    }
}

/// Executor backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Executor for TokioExecutor {
    fn schedule_after(&self, delay: Duration, task: Task) -> Box<dyn Cancellable> {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        Box::new(join.abort_handle())
    }

    fn run_async(&self, task: Task) -> Box<dyn Cancellable> {
        Box::new(self.handle.spawn(task).abort_handle())
    }
}

struct Scheduled {
    delay: Duration,
    task: Task,
    cancelled: Arc<AtomicBool>,
}

struct ManualHandle(Arc<AtomicBool>);

impl Cancellable for ManualHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Deterministic executor that only runs work when told to.
///
/// Delays are recorded but not waited on. Useful for tests and simulations
/// that need to control exactly when probes complete.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<Vec<Scheduled>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued, uncancelled tasks.
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .iter()
            .filter(|s| !s.cancelled.load(Ordering::Acquire))
            .count()
    }

    /// Delays of the queued, uncancelled tasks in scheduling order.
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.queue
            .lock()
            .iter()
            .filter(|s| !s.cancelled.load(Ordering::Acquire))
            .map(|s| s.delay)
            .collect()
    }

    /// Run every task queued so far to completion on the calling thread.
    ///
    /// Tasks scheduled while running stay queued for the next call. Returns
    /// the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue.lock());
        let mut ran = 0;
        for scheduled in batch {
            if scheduled.cancelled.load(Ordering::Acquire) {
                continue;
            }
            futures::executor::block_on(scheduled.task);
            ran += 1;
        }
        ran
    }

    fn push(&self, delay: Duration, task: Task) -> Box<dyn Cancellable> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.queue.lock().push(Scheduled {
            delay,
            task,
            cancelled: Arc::clone(&cancelled),
        });
        Box::new(ManualHandle(cancelled))
    }
}

impl Executor for ManualExecutor {
    fn schedule_after(&self, delay: Duration, task: Task) -> Box<dyn Cancellable> {
        self.push(delay, task)
    }

    fn run_async(&self, task: Task) -> Box<dyn Cancellable> {
        self.push(Duration::ZERO, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_manual_executor_runs_and_cancels() {
        let executor = ManualExecutor::new();
        let counter = Arc::new(AtomicU32::new(0));

        let c1 = Arc::clone(&counter);
        executor.schedule_after(
            Duration::from_secs(1),
            async move {
                c1.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );
        let c2 = Arc::clone(&counter);
        let handle = executor.run_async(
            async move {
                c2.fetch_add(10, Ordering::SeqCst);
            }
            .boxed(),
        );

        assert_eq!(executor.pending_delays(), vec![Duration::from_secs(1), Duration::ZERO]);

        handle.cancel();
        assert_eq!(executor.pending(), 1);
        assert_eq!(executor.run_pending(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(executor.pending(), 0);
    }

    #[tokio::test]
    async fn test_tokio_executor_cancel() {
        let executor = TokioExecutor::current();
        let counter = Arc::new(AtomicU32::new(0));

        let c = Arc::clone(&counter);
        let handle = executor.schedule_after(
            Duration::from_millis(50),
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );
        handle.cancel();

        let c = Arc::clone(&counter);
        executor.schedule_after(
            Duration::from_millis(1),
            async move {
                c.fetch_add(10, Ordering::SeqCst);
            }
            .boxed(),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
