//! Export coordinator.
//!
//! Owns the per-entity export policy and keeps the live wiring in line
//! with it: one change subscription per real-time entity, one repeating
//! timer per distinct batch interval among batch entities.
//!
//! All mutations go through `&mut self`; callers that share a coordinator
//! wrap it in a mutex so there is a single writer.

use super::capture::{capture_lines, sample};
use super::dispatch::Dispatcher;
use super::{EntityConfig, ExportMapping, ExportMode};
use crate::state::{ChangeEvents, ChangeHandler, StateChange, StateStore};
use crate::subscription::{Scheduler, SubscriptionHandle, TickCallback};
use crate::writer::MetricSink;
use chrono::Utc;
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Called with `(entity_id, realtime)` after every mode change.
pub type ModeListener = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Registration token returned by [`ExportCoordinator::on_mode_change`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Capture behavior shared by every entity.
#[derive(Clone, Debug)]
pub struct CaptureOptions {
    /// Emit domain attribute lines next to the primary line
    pub attributes: bool,
    /// How long shutdown waits for in-flight real-time writes
    pub drain_timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            attributes: true,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

type SharedConfigs = Arc<RwLock<BTreeMap<String, EntityConfig>>>;

pub struct ExportCoordinator {
    /// Read by flush callbacks at tick time
    configs: SharedConfigs,
    store: Arc<dyn StateStore>,
    events: Arc<dyn ChangeEvents>,
    scheduler: Arc<dyn Scheduler>,
    sink: Arc<dyn MetricSink>,
    options: CaptureOptions,
    dispatcher: Dispatcher,

    /// Exactly the real-time entities while running
    entity_subs: HashMap<String, SubscriptionHandle>,

    /// Keyed by interval in seconds
    batch_timers: BTreeMap<u64, SubscriptionHandle>,

    listeners: Vec<(ListenerId, ModeListener)>,
    next_listener_id: u64,
    lifecycle: Lifecycle,
}

impl ExportCoordinator {
    pub fn new(
        entities: impl IntoIterator<Item = EntityConfig>,
        store: Arc<dyn StateStore>,
        events: Arc<dyn ChangeEvents>,
        scheduler: Arc<dyn Scheduler>,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        let configs = entities
            .into_iter()
            .map(|config| (config.entity_id().to_string(), config))
            .collect();

        Self {
            configs: Arc::new(RwLock::new(configs)),
            store,
            events,
            scheduler,
            sink,
            options: CaptureOptions::default(),
            dispatcher: Dispatcher::new(),
            entity_subs: HashMap::new(),
            batch_timers: BTreeMap::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            lifecycle: Lifecycle::Idle,
        }
    }

    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Wire up subscriptions and timers. Calling it again does nothing.
    pub fn start(&mut self) {
        if self.lifecycle != Lifecycle::Idle {
            debug!("Export coordinator already started");
            return;
        }
        self.lifecycle = Lifecycle::Running;

        let snapshot = self.entity_configs();
        let realtime: Vec<&EntityConfig> = snapshot.iter().filter(|c| c.is_realtime()).collect();
        for config in &realtime {
            self.subscribe_realtime(config);
        }
        self.sync_batch_timers();

        if !realtime.is_empty() {
            let ids: Vec<&str> = realtime.iter().map(|c| c.entity_id()).collect();
            info!(
                count = ids.len(),
                entities = %ids.join(", "),
                "Tracking entities in real-time mode"
            );
        }

        let mut by_interval: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
        for config in snapshot.iter().filter(|c| !c.is_realtime()) {
            by_interval
                .entry(config.batch_interval())
                .or_default()
                .push(config.entity_id());
        }
        for (interval, ids) in by_interval {
            info!(
                interval_secs = interval,
                count = ids.len(),
                entities = %ids.join(", "),
                "Tracking entities in batch mode"
            );
        }
    }

    /// Switch an entity between real-time and batch delivery.
    ///
    /// Returns false for unknown entities and when the mode is unchanged.
    pub fn set_realtime(&mut self, entity_id: &str, realtime: bool) -> bool {
        if self.rejects_mutation("set_realtime") {
            return false;
        }
        let Some(mut updated) = self.entity_config(entity_id) else {
            debug!(entity_id = %entity_id, "Ignoring mode change for unknown entity");
            return false;
        };
        let mode = ExportMode::from_realtime(realtime);
        if updated.mode == mode {
            return false;
        }

        if let Some(handle) = self.entity_subs.remove(entity_id) {
            handle.cancel();
        }
        updated.mode = mode;
        self.write_configs()
            .insert(entity_id.to_string(), updated.clone());

        if self.is_running() {
            if realtime {
                self.subscribe_realtime(&updated);
            }
            self.sync_batch_timers();
        }

        info!(entity_id = %entity_id, mode = %mode, "Export mode changed");
        self.notify_mode_change(entity_id, realtime);
        true
    }

    /// Change how often a batch entity is sampled. Zero is rejected.
    pub fn set_batch_interval(&mut self, entity_id: &str, seconds: u64) -> bool {
        if self.rejects_mutation("set_batch_interval") {
            return false;
        }
        if seconds == 0 {
            warn!(entity_id = %entity_id, "Batch interval must be at least one second");
            return false;
        }

        let changed = match self.write_configs().get_mut(entity_id) {
            Some(config) if config.batch_interval != seconds => {
                config.batch_interval = seconds;
                true
            }
            _ => false,
        };
        if !changed {
            return false;
        }

        if self.is_running() {
            self.sync_batch_timers();
        }
        info!(entity_id = %entity_id, interval_secs = seconds, "Batch interval changed");
        true
    }

    /// Start tracking another entity. Returns false if it is already tracked.
    pub fn add_entity(&mut self, config: EntityConfig) -> bool {
        if self.rejects_mutation("add_entity") {
            return false;
        }
        {
            let mut configs = self.write_configs();
            if configs.contains_key(config.entity_id()) {
                return false;
            }
            configs.insert(config.entity_id().to_string(), config.clone());
        }

        if self.is_running() {
            if config.is_realtime() {
                self.subscribe_realtime(&config);
            }
            self.sync_batch_timers();
        }
        info!(
            entity_id = %config.entity_id(),
            metric = %config.metric_name(),
            mode = %config.mode(),
            "Entity added to export"
        );
        true
    }

    /// Stop tracking an entity. Unknown ids are a no-op.
    pub fn remove_entity(&mut self, entity_id: &str) -> Option<EntityConfig> {
        if self.rejects_mutation("remove_entity") {
            return None;
        }
        let removed = self.write_configs().remove(entity_id)?;

        if let Some(handle) = self.entity_subs.remove(entity_id) {
            handle.cancel();
        }
        if self.is_running() {
            self.sync_batch_timers();
        }
        info!(entity_id = %entity_id, "Entity removed from export");
        Some(removed)
    }

    /// Register a mode-change listener. Listeners run in registration order.
    pub fn on_mode_change(
        &mut self,
        listener: impl Fn(&str, bool) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_mode_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn entity_config(&self, entity_id: &str) -> Option<EntityConfig> {
        self.read_configs().get(entity_id).cloned()
    }

    /// Snapshot of all entity configs, ordered by entity id.
    pub fn entity_configs(&self) -> Vec<EntityConfig> {
        self.read_configs().values().cloned().collect()
    }

    pub fn mappings(&self) -> Vec<ExportMapping> {
        self.read_configs().values().map(ExportMapping::from).collect()
    }

    /// Intervals (seconds) with a live batch timer.
    pub fn active_batch_intervals(&self) -> Vec<u64> {
        self.batch_timers.keys().copied().collect()
    }

    /// Entities with a live change subscription, sorted.
    pub fn realtime_subscriptions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entity_subs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Tear down subscriptions and timers, wait for in-flight writes,
    /// send one final sample of every entity, then close the sink.
    /// Calling it again does nothing.
    pub async fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::Stopped {
            debug!("Export coordinator already stopped");
            return;
        }
        self.lifecycle = Lifecycle::Stopped;

        for (_, handle) in self.entity_subs.drain() {
            handle.cancel();
        }
        while let Some((_, handle)) = self.batch_timers.pop_first() {
            handle.cancel();
        }

        debug!(pending = self.dispatcher.pending(), "Waiting for export writes");
        self.dispatcher.drain(self.options.drain_timeout).await;

        let lines = {
            let configs = self.read_configs();
            sample(
                configs.values(),
                self.store.as_ref(),
                now_ns(),
                self.options.attributes,
            )
        };
        let count = lines.len();
        if count > 0 && !self.sink.write_batch(lines).await {
            warn!(count, "Final export flush failed");
        }

        self.sink.close().await;
        info!(lines = count, "Export coordinator stopped");
    }

    /// Wait for all real-time writes dispatched so far. Later changes are
    /// no longer dispatched.
    #[cfg(test)]
    pub(crate) async fn drain_dispatched(&self) {
        self.dispatcher.drain(self.options.drain_timeout).await;
    }

    /// Subscribe `config`'s entity to change events.
    ///
    /// A capture that is only the primary line goes through `write_single`.
    /// When attribute lines come with it, all lines go out together through
    /// `write_batch` as one request.
    fn subscribe_realtime(&mut self, config: &EntityConfig) {
        let target = config.clone();
        let sink = Arc::clone(&self.sink);
        let dispatcher = self.dispatcher.clone();
        let attributes = self.options.attributes;

        let handler: ChangeHandler = Arc::new(move |change: &StateChange| {
            let Some(state) = change.new_state.as_ref() else {
                return;
            };
            let mut lines = capture_lines(&target, state, state.timestamp_ns(), attributes);
            if lines.is_empty() {
                return;
            }

            let sink = Arc::clone(&sink);
            dispatcher.submit(async move {
                if lines.len() == 1 {
                    sink.write_single(lines.remove(0)).await;
                } else {
                    sink.write_batch(lines).await;
                }
            });
        });

        let handle = self.events.subscribe(config.entity_id(), handler);
        if let Some(previous) = self.entity_subs.insert(config.entity_id().to_string(), handle) {
            previous.cancel();
        }
    }

    /// Make the live timers match the distinct intervals of batch entities.
    fn sync_batch_timers(&mut self) {
        let needed: BTreeSet<u64> = self
            .read_configs()
            .values()
            .filter(|c| !c.is_realtime())
            .map(|c| c.batch_interval())
            .collect();

        let stale: Vec<u64> = self
            .batch_timers
            .keys()
            .filter(|interval| !needed.contains(interval))
            .copied()
            .collect();
        for interval in stale {
            if let Some(handle) = self.batch_timers.remove(&interval) {
                handle.cancel();
                debug!(interval_secs = interval, "Stopped batch timer");
            }
        }

        for interval in needed {
            if self.batch_timers.contains_key(&interval) {
                continue;
            }
            let callback = self.flush_callback(interval);
            let handle = self
                .scheduler
                .schedule_repeating(Duration::from_secs(interval), callback);
            self.batch_timers.insert(interval, handle);
            debug!(interval_secs = interval, "Started batch timer");
        }
    }

    /// Tick work for one interval: sample the batch entities on it and
    /// write them as one batch.
    fn flush_callback(&self, interval: u64) -> TickCallback {
        let configs = Arc::clone(&self.configs);
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);
        let attributes = self.options.attributes;

        Arc::new(move || {
            let lines = {
                let configs = configs.read().unwrap_or_else(PoisonError::into_inner);
                sample(
                    configs
                        .values()
                        .filter(|c| !c.is_realtime() && c.batch_interval() == interval),
                    store.as_ref(),
                    now_ns(),
                    attributes,
                )
            };
            let sink = Arc::clone(&sink);

            async move {
                if lines.is_empty() {
                    return;
                }
                let count = lines.len();
                if sink.write_batch(lines).await {
                    debug!(interval_secs = interval, count, "Batch flushed");
                } else {
                    warn!(interval_secs = interval, count, "Batch flush failed");
                }
            }
            .boxed()
        })
    }

    fn notify_mode_change(&self, entity_id: &str, realtime: bool) {
        for (_, listener) in &self.listeners {
            listener(entity_id, realtime);
        }
    }

    fn rejects_mutation(&self, operation: &str) -> bool {
        if self.lifecycle == Lifecycle::Stopped {
            warn!(operation, "Export coordinator is stopped, ignoring change");
            return true;
        }
        false
    }

    fn read_configs(&self) -> RwLockReadGuard<'_, BTreeMap<String, EntityConfig>> {
        self.configs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_configs(&self) -> RwLockWriteGuard<'_, BTreeMap<String, EntityConfig>> {
        self.configs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
