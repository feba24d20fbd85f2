use super::{EntityState, StateChange};
use crate::subscription::SubscriptionHandle;
use std::sync::Arc;

/// Callback invoked for every change of a subscribed entity.
pub type ChangeHandler = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Synchronous read access to current entity states.
pub trait StateStore: Send + Sync {
    /// Current state of `entity_id`, or `None` if the store does not know it.
    fn get_current(&self, entity_id: &str) -> Option<EntityState>;
}

/// Change-event stream keyed by entity id.
pub trait ChangeEvents: Send + Sync {
    /// Call `handler` for every change of `entity_id` until the handle is cancelled.
    fn subscribe(&self, entity_id: &str, handler: ChangeHandler) -> SubscriptionHandle;
}
