mod env;

use crate::export::{CaptureOptions, EntityConfig};
use crate::writer::WriterConfig;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8428;
pub const DEFAULT_BATCH_INTERVAL: u64 = 300;
pub const DEFAULT_METRIC_PREFIX: &str = "hass";

/// Complete exporter configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub export: ExportSettings,
    /// Tracked entities keyed by entity id
    #[serde(default)]
    pub entities: BTreeMap<String, EntitySettings>,
    #[serde(default)]
    pub api: ApiConfig,
}

/// VictoriaMetrics connection
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Bearer token; empty means none
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_health_timeout() -> u64 {
    10
}

fn default_write_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    1000
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ssl: false,
            verify_ssl: true,
            token: String::new(),
            health_timeout_secs: default_health_timeout(),
            write_timeout_secs: default_write_timeout(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl EndpointConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Defaults shared by all entities
#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
    /// Seconds; used by entities without their own interval
    #[serde(default = "default_batch_interval")]
    pub batch_interval: u64,
    /// Emit domain attribute lines
    #[serde(default = "default_true")]
    pub attributes: bool,
    /// How long shutdown waits for in-flight writes
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_metric_prefix() -> String {
    DEFAULT_METRIC_PREFIX.to_string()
}

fn default_batch_interval() -> u64 {
    DEFAULT_BATCH_INTERVAL
}

fn default_drain_timeout() -> u64 {
    30
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            metric_prefix: default_metric_prefix(),
            batch_interval: default_batch_interval(),
            attributes: true,
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

/// Per-entity settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitySettings {
    /// Overrides `<prefix>_<object_id>`
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub realtime: bool,
    #[serde(default)]
    pub batch_interval: Option<u64>,
}

/// HTTP control surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Required as a bearer token on mutating routes; empty disables the check
    #[serde(default)]
    pub admin_token: String,
}

fn default_listen() -> String {
    "127.0.0.1:8429".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            admin_token: String::new(),
        }
    }
}

impl ApiConfig {
    pub fn admin_token(&self) -> Option<String> {
        Some(self.admin_token.clone()).filter(|t| !t.is_empty())
    }
}

impl ExporterConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            bail!("endpoint.host must not be empty");
        }
        if self.endpoint.max_attempts == 0 {
            bail!("endpoint.max_attempts must be at least 1");
        }
        if self.export.batch_interval == 0 {
            bail!("export.batch_interval must be at least 1 second");
        }
        for (entity_id, settings) in &self.entities {
            if !entity_id.contains('.') {
                bail!("Entity id '{}' must look like '<domain>.<object_id>'", entity_id);
            }
            if settings.batch_interval == Some(0) {
                bail!("entities.\"{}\".batch_interval must be at least 1 second", entity_id);
            }
        }
        Ok(())
    }

    pub fn writer_config(&self) -> WriterConfig {
        let endpoint = &self.endpoint;
        WriterConfig {
            token: Some(endpoint.token.clone()).filter(|t| !t.is_empty()),
            verify_ssl: endpoint.verify_ssl,
            health_timeout: Duration::from_secs(endpoint.health_timeout_secs),
            write_timeout: Duration::from_secs(endpoint.write_timeout_secs),
            max_attempts: endpoint.max_attempts,
            retry_backoff: Duration::from_millis(endpoint.retry_backoff_ms),
            ..WriterConfig::new(endpoint.base_url())
        }
    }

    /// Resolved per-entity export configs, ordered by entity id.
    pub fn entity_configs(&self) -> Vec<EntityConfig> {
        self.entities
            .iter()
            .map(|(entity_id, settings)| {
                EntityConfig::new(
                    entity_id.clone(),
                    build_metric_name(
                        &self.export.metric_prefix,
                        entity_id,
                        settings.metric_name.as_deref(),
                    ),
                    settings.tags.clone(),
                    settings.realtime,
                    settings.batch_interval.unwrap_or(self.export.batch_interval),
                )
            })
            .collect()
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            attributes: self.export.attributes,
            drain_timeout: Duration::from_secs(self.export.drain_timeout_secs),
        }
    }
}

/// Measurement name for an entity: the override when given, otherwise
/// `<prefix>_<object_id>` (just `<object_id>` for an empty prefix).
pub fn build_metric_name(prefix: &str, entity_id: &str, override_name: Option<&str>) -> String {
    if let Some(name) = override_name.filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    let object_id = entity_id
        .split_once('.')
        .map(|(_, object_id)| object_id)
        .unwrap_or(entity_id);
    if prefix.is_empty() {
        object_id.to_string()
    } else {
        format!("{}_{}", prefix, object_id)
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<ExporterConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ExporterConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ExporterConfig::default();
        assert_eq!(config.endpoint.port, 8428);
        assert_eq!(config.endpoint.base_url(), "http://localhost:8428");
        assert_eq!(config.export.metric_prefix, "hass");
        assert_eq!(config.export.batch_interval, 300);
        assert!(config.export.attributes);
        assert_eq!(config.api.listen, "127.0.0.1:8429");
        assert!(config.api.admin_token().is_none());
        assert!(config.validate().is_ok());

        let writer = config.writer_config();
        assert_eq!(writer.max_attempts, 3);
        assert_eq!(writer.retry_backoff, Duration::from_secs(1));
        assert_eq!(writer.health_timeout, Duration::from_secs(10));
        assert_eq!(writer.write_timeout, Duration::from_secs(30));
        assert!(writer.token.is_none());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [endpoint]
            host = "vm.local"
            port = 443
            ssl = true
            verify_ssl = false
            token = "abc"

            [export]
            metric_prefix = "ha"
            batch_interval = 120
            attributes = false

            [entities."sensor.temp"]
            tags = { room = "kitchen" }
            batch_interval = 60

            [entities."switch.pump"]
            metric_name = "pump_state"
            realtime = true

            [api]
            listen = "0.0.0.0:9000"
            admin_token = "admin"
        "#;

        let config: ExporterConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint.base_url(), "https://vm.local:443");
        assert_eq!(config.writer_config().token.as_deref(), Some("abc"));
        assert!(!config.writer_config().verify_ssl);
        assert!(!config.capture_options().attributes);
        assert_eq!(config.api.admin_token().as_deref(), Some("admin"));

        let entities = config.entity_configs();
        assert_eq!(entities.len(), 2);

        assert_eq!(entities[0].entity_id(), "sensor.temp");
        assert_eq!(entities[0].metric_name(), "ha_temp");
        assert_eq!(entities[0].batch_interval(), 60);
        assert!(!entities[0].is_realtime());
        assert_eq!(entities[0].extra_tags()["room"], "kitchen");

        assert_eq!(entities[1].metric_name(), "pump_state");
        assert_eq!(entities[1].batch_interval(), 120);
        assert!(entities[1].is_realtime());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = ExporterConfig::default();
        config.export.batch_interval = 0;
        assert!(config.validate().is_err());

        let mut config = ExporterConfig::default();
        config
            .entities
            .insert("no_domain".to_string(), EntitySettings::default());
        assert!(config.validate().is_err());

        let mut config = ExporterConfig::default();
        config.entities.insert(
            "sensor.x".to_string(),
            EntitySettings {
                batch_interval: Some(0),
                ..EntitySettings::default()
            },
        );
        assert!(config.validate().is_err());

        let mut config = ExporterConfig::default();
        config.endpoint.host = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ExporterConfig::default();
        config.endpoint.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_metric_name() {
        assert_eq!(build_metric_name("hass", "sensor.temp", None), "hass_temp");
        assert_eq!(build_metric_name("", "sensor.temp", None), "temp");
        assert_eq!(build_metric_name("ha", "sensor.temp", Some("custom")), "custom");
        assert_eq!(build_metric_name("ha", "sensor.temp", Some("")), "ha_temp");
        assert_eq!(build_metric_name("ha", "sensor.a.b", None), "ha_a.b");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [endpoint]
            port = 9428

            [entities."light.desk"]
            realtime = true
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.endpoint.port, 9428);
        assert_eq!(config.endpoint.host, "localhost");
        assert_eq!(config.entity_configs()[0].metric_name(), "hass_desk");
    }

    #[test]
    fn test_load_config_errors() {
        assert!(load_config("/nonexistent/vmexport.toml").is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[endpoint\nport = ").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
