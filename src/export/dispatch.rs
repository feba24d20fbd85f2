use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Fire-and-forget runner for real-time writes.
///
/// Tasks are tracked so shutdown can wait for in-flight writes. Once a
/// drain has begun the dispatcher is closed and later submissions are
/// dropped.
#[derive(Clone, Default)]
pub(crate) struct Dispatcher {
    tasks: Arc<Mutex<JoinSet<()>>>,
    /// Set under the `tasks` lock
    closed: Arc<AtomicBool>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the current runtime; dropped with a warning when
    /// called outside one.
    pub(crate) fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, dropping export write");
            return;
        };

        let mut tasks = self.lock();
        if self.closed.load(Ordering::Acquire) {
            debug!("Dispatcher closed, dropping export write");
            return;
        }
        // Reap finished writes so the set stays small
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(task, &runtime);
    }

    /// Number of writes not yet reaped.
    pub(crate) fn pending(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the dispatcher, wait up to `timeout` for in-flight writes,
    /// then abort the rest.
    pub(crate) async fn drain(&self, timeout: Duration) {
        let mut tasks = {
            let mut guard = self.lock();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *guard)
        };
        if tasks.is_empty() {
            return;
        }

        let count = tasks.len();
        let joined = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        match joined {
            Ok(()) => debug!(count, "Drained pending export writes"),
            Err(_) => {
                warn!(
                    remaining = tasks.len(),
                    timeout_secs = timeout.as_secs(),
                    "Timed out waiting for pending export writes"
                );
                tasks.shutdown().await;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_drain_waits_for_submitted_tasks() {
        let dispatcher = Dispatcher::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = Arc::clone(&done);
            dispatcher.submit(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        dispatcher.drain(Duration::from_secs(5)).await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_timeout() {
        let dispatcher = Dispatcher::new();
        dispatcher.submit(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let started = std::time::Instant::now();
        dispatcher.drain(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_drain_is_dropped() {
        let dispatcher = Dispatcher::new();
        let ran = Arc::new(AtomicUsize::new(0));
        dispatcher.drain(Duration::from_secs(1)).await;
        assert!(dispatcher.is_closed());

        let r = Arc::clone(&ran);
        dispatcher.submit(async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(dispatcher.pending(), 0);

        tokio::task::yield_now().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_submit_without_runtime_is_dropped() {
        let dispatcher = Dispatcher::new();
        dispatcher.submit(async {});
        assert_eq!(dispatcher.pending(), 0);
    }
}
