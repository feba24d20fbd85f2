use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Current state of one entity in the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity identifier (e.g., "sensor.kitchen_temperature")
    pub entity_id: String,

    /// Raw textual state
    pub state: String,

    /// Attribute key-value pairs (unit, friendly name, domain extras)
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Last update timestamp
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    /// Domain part of the entity id ("sensor" for "sensor.temp").
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    /// `last_updated` in nanoseconds since the Unix epoch.
    pub fn timestamp_ns(&self) -> i64 {
        self.last_updated.timestamp_nanos_opt().unwrap_or_default()
    }
}

/// Change notification pushed to subscribers.
///
/// `new_state` is `None` when the entity was removed from the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: String,
    pub old_state: Option<EntityState>,
    pub new_state: Option<EntityState>,
}
