use super::SubscriptionHandle;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Work run on every tick of a repeating timer.
pub type TickCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Clock/timer facility.
pub trait Scheduler: Send + Sync {
    /// Run `callback` every `every` until the returned handle is cancelled.
    fn schedule_repeating(&self, every: Duration, callback: TickCallback) -> SubscriptionHandle;
}

/// Timers backed by tokio tasks.
///
/// Each timer is one task; ticks of the same timer never overlap because
/// the callback is awaited before the next tick. Must be used from within a
/// tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, every: Duration, callback: TickCallback) -> SubscriptionHandle {
        let period = every.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            // Skip missed ticks to prevent a flush backlog under load
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // first tick fires immediately

            loop {
                ticker.tick().await;
                debug!(interval_secs = period.as_secs(), "Timer tick");
                callback().await;
            }
        });

        SubscriptionHandle::new(move || task.abort())
    }
}

/// Scheduler whose timers only fire when told to.
///
/// Useful for driving the export pipeline deterministically, e.g. from tests
/// or from a host that owns its own clock.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    timers: Arc<Mutex<BTreeMap<u64, (Duration, TickCallback)>>>,
    next_id: Arc<AtomicU64>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live timers.
    pub fn timer_count(&self) -> usize {
        self.lock().len()
    }

    /// Periods of all live timers, sorted.
    pub fn active_intervals(&self) -> Vec<Duration> {
        let mut intervals: Vec<Duration> = self.lock().values().map(|(every, _)| *every).collect();
        intervals.sort();
        intervals
    }

    /// Fire every live timer registered with period `every`.
    ///
    /// Returns how many timers fired.
    pub async fn fire(&self, every: Duration) -> usize {
        let callbacks: Vec<TickCallback> = self
            .lock()
            .values()
            .filter(|(period, _)| *period == every)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in &callbacks {
            callback().await;
        }
        callbacks.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, (Duration, TickCallback)>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, every: Duration, callback: TickCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, (every, callback));

        let timers = Arc::downgrade(&self.timers);
        SubscriptionHandle::new(move || {
            if let Some(timers) = timers.upgrade() {
                timers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        })
    }
}
