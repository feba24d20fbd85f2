use crate::state::entity::{EntityState, StateChange};
use crate::state::store::{ChangeEvents, ChangeHandler, StateStore};
use crate::subscription::SubscriptionHandle;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// In-memory state store.
///
/// Holds the latest state per entity and calls subscribed handlers
/// synchronously, in subscription order, on every change.
pub struct StateEngine {
    /// Lock-free concurrent map for fast reads
    entities: DashMap<String, EntityState>,

    /// Change handlers per entity id
    handlers: Arc<DashMap<String, Vec<(u64, ChangeHandler)>>>,

    next_handler_id: AtomicU64,
}

impl StateEngine {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            handlers: Arc::new(DashMap::new()),
            next_handler_id: AtomicU64::new(0),
        }
    }

    /// Set the state of an entity, stamped with the current time.
    pub fn set_state(
        &self,
        entity_id: &str,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
    ) -> StateChange {
        self.set_state_at(entity_id, state, attributes, Utc::now())
    }

    /// Set the state of an entity with an explicit update time.
    pub fn set_state_at(
        &self,
        entity_id: &str,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
        last_updated: DateTime<Utc>,
    ) -> StateChange {
        let new_state = EntityState {
            entity_id: entity_id.to_string(),
            state: state.into(),
            attributes,
            last_updated,
        };

        let old_state = self
            .entities
            .insert(entity_id.to_string(), new_state.clone());

        let change = StateChange {
            entity_id: entity_id.to_string(),
            old_state,
            new_state: Some(new_state),
        };
        self.notify(&change);
        change
    }

    /// Remove an entity; subscribers see a change with no new state.
    pub fn remove_state(&self, entity_id: &str) -> Option<EntityState> {
        let removed = self.entities.remove(entity_id).map(|(_, state)| state);

        if removed.is_some() {
            info!(entity_id = %entity_id, "Entity state removed");
            let change = StateChange {
                entity_id: entity_id.to_string(),
                old_state: removed.clone(),
                new_state: None,
            };
            self.notify(&change);
        }

        removed
    }

    /// All known entity states.
    pub fn get_all(&self) -> Vec<EntityState> {
        self.entities.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of live change subscriptions for `entity_id`.
    pub fn subscriber_count(&self, entity_id: &str) -> usize {
        self.handlers.get(entity_id).map(|h| h.len()).unwrap_or(0)
    }

    fn notify(&self, change: &StateChange) {
        // Clone handlers out so no shard lock is held while they run
        let handlers: Vec<ChangeHandler> = match self.handlers.get(&change.entity_id) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };

        debug!(
            entity_id = %change.entity_id,
            subscribers = handlers.len(),
            "Dispatching state change"
        );
        for handler in handlers {
            handler(change);
        }
    }
}

impl Default for StateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for StateEngine {
    fn get_current(&self, entity_id: &str) -> Option<EntityState> {
        self.entities.get(entity_id).map(|e| e.clone())
    }
}

impl ChangeEvents for StateEngine {
    fn subscribe(&self, entity_id: &str, handler: ChangeHandler) -> SubscriptionHandle {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .entry(entity_id.to_string())
            .or_default()
            .push((id, handler));

        let handlers = Arc::downgrade(&self.handlers);
        let key = entity_id.to_string();
        SubscriptionHandle::new(move || {
            let Some(handlers) = handlers.upgrade() else {
                return;
            };
            let now_empty = match handlers.get_mut(&key) {
                Some(mut entry) => {
                    entry.retain(|(handler_id, _)| *handler_id != id);
                    entry.is_empty()
                }
                None => false,
            };
            if now_empty {
                handlers.remove_if(&key, |_, entry| entry.is_empty());
            }
        })
    }
}
