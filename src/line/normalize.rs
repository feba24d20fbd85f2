use serde_json::Value;

/// Boolean-like state vocabulary and the numeric value each word maps to.
pub const STATE_MAP: &[(&str, f64)] = &[
    ("on", 1.0),
    ("off", 0.0),
    ("open", 1.0),
    ("closed", 0.0),
    ("home", 1.0),
    ("not_home", 0.0),
    ("away", 0.0),
    ("true", 1.0),
    ("false", 0.0),
    ("locked", 1.0),
    ("unlocked", 0.0),
    ("active", 1.0),
    ("inactive", 0.0),
    ("yes", 1.0),
    ("no", 0.0),
    ("connected", 1.0),
    ("disconnected", 0.0),
];

/// States that never produce a line.
const SKIPPED_STATES: [&str; 3] = ["unknown", "unavailable", ""];

/// A state reduced to something the line protocol can carry.
///
/// `Number` becomes the `value` field, `Text` becomes the quoted
/// `state_text` field.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Number(f64),
    Text(String),
}

/// Normalize a raw textual state.
///
/// Returns `None` for the sentinel states and for non-finite numbers.
/// Numeric strings become numbers, boolean-like words are mapped through
/// [`STATE_MAP`] (case-insensitive), everything else is kept verbatim.
pub fn normalize_state(raw: &str) -> Option<NormalizedValue> {
    if SKIPPED_STATES.contains(&raw) {
        return None;
    }

    if let Ok(number) = raw.trim().parse::<f64>() {
        return number.is_finite().then_some(NormalizedValue::Number(number));
    }

    let lower = raw.to_lowercase();
    if let Some((_, mapped)) = STATE_MAP.iter().find(|(word, _)| *word == lower) {
        return Some(NormalizedValue::Number(*mapped));
    }

    Some(NormalizedValue::Text(raw.to_string()))
}

/// Normalize an attribute value.
///
/// Native booleans map to 1.0/0.0 and native numbers pass through before
/// strings fall back to [`normalize_state`]. Null, arrays and objects are
/// skipped.
pub fn normalize_attribute(raw: &Value) -> Option<NormalizedValue> {
    match raw {
        Value::Bool(b) => Some(NormalizedValue::Number(if *b { 1.0 } else { 0.0 })),
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(NormalizedValue::Number),
        Value::String(s) => normalize_state(s),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
