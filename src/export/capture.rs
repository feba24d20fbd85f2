//! Turning entity states into line-protocol points.

use super::EntityConfig;
use crate::line::{encode_line, normalize_attribute, normalize_state};
use crate::state::{EntityState, StateStore};
use serde_json::Value;
use std::collections::BTreeMap;

/// Numeric attributes exported per domain, each as `<metric>_<attribute>`.
pub const DOMAIN_ATTRIBUTES: &[(&str, &[&str])] = &[
    (
        "climate",
        &[
            "current_temperature",
            "target_temperature",
            "target_temperature_high",
            "target_temperature_low",
            "current_humidity",
            "target_humidity",
            "hvac_action",
        ],
    ),
    (
        "weather",
        &[
            "temperature",
            "apparent_temperature",
            "humidity",
            "pressure",
            "wind_speed",
            "wind_bearing",
            "wind_gust_speed",
            "uv_index",
            "visibility",
            "dew_point",
            "cloud_coverage",
        ],
    ),
    ("fan", &["percentage"]),
    ("light", &["brightness", "color_temp", "color_temp_kelvin"]),
    ("cover", &["current_position", "current_tilt_position"]),
    ("humidifier", &["current_humidity", "target_humidity"]),
    ("water_heater", &["current_temperature", "target_temperature"]),
    (
        "media_player",
        &[
            "volume_level",
            "media_position",
            "media_duration",
            "is_volume_muted",
        ],
    ),
    ("vacuum", &["battery_level"]),
];

/// Unit tag; carried on the primary line only.
const UNIT_TAG: &str = "unit";

/// Tags for every line of one entity: identity, presentation attributes,
/// then the configured extra tags (which win on conflict).
pub(crate) fn build_tags(config: &EntityConfig, state: &EntityState) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("entity_id".to_string(), config.entity_id().to_string());
    tags.insert("domain".to_string(), state.domain().to_string());

    for (tag, attribute) in [
        ("friendly_name", "friendly_name"),
        ("device_class", "device_class"),
        (UNIT_TAG, "unit_of_measurement"),
    ] {
        if let Some(text) = state.attributes.get(attribute).and_then(attribute_text) {
            tags.insert(tag.to_string(), text);
        }
    }

    tags.extend(
        config
            .extra_tags()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    tags
}

fn attribute_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// All lines for one entity at one instant.
///
/// The primary line comes first when the state normalizes; attribute lines
/// follow whether or not it does.
pub(crate) fn capture_lines(
    config: &EntityConfig,
    state: &EntityState,
    timestamp_ns: i64,
    attributes: bool,
) -> Vec<String> {
    let tags = build_tags(config, state);
    let mut lines = Vec::new();

    if let Some(value) = normalize_state(&state.state) {
        lines.push(encode_line(config.metric_name(), &tags, &value, timestamp_ns));
    }

    if attributes {
        lines.extend(attribute_lines(config, state, tags, timestamp_ns));
    }
    lines
}

fn attribute_lines(
    config: &EntityConfig,
    state: &EntityState,
    mut tags: BTreeMap<String, String>,
    timestamp_ns: i64,
) -> Vec<String> {
    let Some((_, names)) = DOMAIN_ATTRIBUTES
        .iter()
        .find(|(domain, _)| *domain == state.domain())
    else {
        return Vec::new();
    };

    tags.remove(UNIT_TAG);
    names
        .iter()
        .filter_map(|name| {
            let value = normalize_attribute(state.attributes.get(*name)?)?;
            let measurement = format!("{}_{}", config.metric_name(), name);
            Some(encode_line(&measurement, &tags, &value, timestamp_ns))
        })
        .collect()
}

/// Lines for every listed entity the store knows, all stamped `timestamp_ns`.
pub(crate) fn sample<'a>(
    configs: impl IntoIterator<Item = &'a EntityConfig>,
    store: &dyn StateStore,
    timestamp_ns: i64,
    attributes: bool,
) -> Vec<String> {
    configs
        .into_iter()
        .filter_map(|config| {
            let state = store.get_current(config.entity_id())?;
            Some(capture_lines(config, &state, timestamp_ns, attributes))
        })
        .flatten()
        .collect()
}
