use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Delivery policy of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Send on every state change
    Realtime,
    /// Sample on the timer matching the entity's batch interval
    Batch,
}

impl ExportMode {
    pub fn from_realtime(realtime: bool) -> Self {
        if realtime {
            ExportMode::Realtime
        } else {
            ExportMode::Batch
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Realtime => "realtime",
            ExportMode::Batch => "batch",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export settings for one tracked entity.
///
/// `entity_id`, `metric_name` and `extra_tags` are fixed at construction.
/// Mode and batch interval change only through the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityConfig {
    entity_id: String,
    metric_name: String,
    extra_tags: BTreeMap<String, String>,
    pub(crate) mode: ExportMode,
    pub(crate) batch_interval: u64,
}

impl EntityConfig {
    pub fn new(
        entity_id: impl Into<String>,
        metric_name: impl Into<String>,
        extra_tags: BTreeMap<String, String>,
        realtime: bool,
        batch_interval: u64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            metric_name: metric_name.into(),
            extra_tags,
            mode: ExportMode::from_realtime(realtime),
            batch_interval,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn extra_tags(&self) -> &BTreeMap<String, String> {
        &self.extra_tags
    }

    pub fn mode(&self) -> ExportMode {
        self.mode
    }

    pub fn is_realtime(&self) -> bool {
        self.mode == ExportMode::Realtime
    }

    /// Seconds between batch flushes.
    pub fn batch_interval(&self) -> u64 {
        self.batch_interval
    }
}

/// Read-only view of one entity's export mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportMapping {
    pub source_entity: String,
    pub metric_name: String,
    pub mode: ExportMode,
    pub batch_interval: u64,
}

impl From<&EntityConfig> for ExportMapping {
    fn from(config: &EntityConfig) -> Self {
        Self {
            source_entity: config.entity_id.clone(),
            metric_name: config.metric_name.clone(),
            mode: config.mode,
            batch_interval: config.batch_interval,
        }
    }
}
