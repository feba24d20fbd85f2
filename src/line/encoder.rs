//! Line protocol encoder.
//!
//! ```text
//! measurement[,tag=val,...] value=<number> <timestamp_ns>
//! measurement[,tag=val,...] state_text="<text>" <timestamp_ns>
//! ```

use super::NormalizedValue;
use std::collections::BTreeMap;

/// Field name for numeric values.
const NUMBER_FIELD: &str = "value";

/// Field name for textual values.
const TEXT_FIELD: &str = "state_text";

/// Encode one point.
///
/// Tags come out in key order (the map is sorted) and tags with an empty
/// key or value are left out. Exactly one field is written: `value` for
/// numbers, `state_text` for text.
pub fn encode_line(
    measurement: &str,
    tags: &BTreeMap<String, String>,
    value: &NormalizedValue,
    timestamp_ns: i64,
) -> String {
    let mut line = escape_measurement(measurement);

    for (key, val) in tags
        .iter()
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
    {
        line.push(',');
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&escape_tag(val));
    }

    line.push(' ');
    match value {
        NormalizedValue::Number(v) => {
            line.push_str(NUMBER_FIELD);
            line.push('=');
            line.push_str(&v.to_string());
        }
        NormalizedValue::Text(text) => {
            line.push_str(TEXT_FIELD);
            line.push_str("=\"");
            line.push_str(&escape_string_field(text));
            line.push('"');
        }
    }

    line.push(' ');
    line.push_str(&timestamp_ns.to_string());
    line
}

/// Backslash, space and comma are reserved in measurement names.
fn escape_measurement(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | ' ' | ',' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Tag keys and values additionally reserve `=`.
fn escape_tag(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | ' ' | ',' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_string_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '"' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_numeric_point_without_tags() {
        let line = encode_line(
            "ha_temp",
            &BTreeMap::new(),
            &NormalizedValue::Number(21.3),
            1_700_000_000_000_000_000,
        );
        assert_eq!(line, "ha_temp value=21.3 1700000000000000000");
    }

    #[test]
    fn test_tags_sorted_and_empty_dropped() {
        let line = encode_line(
            "hass_door",
            &tags(&[
                ("entity_id", "binary_sensor.door"),
                ("domain", "binary_sensor"),
                ("unit", ""),
            ]),
            &NormalizedValue::Number(1.0),
            5,
        );
        assert_eq!(
            line,
            "hass_door,domain=binary_sensor,entity_id=binary_sensor.door value=1 5"
        );
        assert!(!line.contains("unit"));
    }

    #[test]
    fn test_empty_tag_key_dropped() {
        let line = encode_line(
            "m",
            &tags(&[("", "x"), ("room", "den")]),
            &NormalizedValue::Number(1.0),
            1,
        );
        assert_eq!(line, "m,room=den value=1 1");
    }

    #[test]
    fn test_text_field_is_quoted() {
        let line = encode_line(
            "hass_cover",
            &tags(&[("domain", "cover")]),
            &NormalizedValue::Text("partially_open".to_string()),
            42,
        );
        assert_eq!(line, "hass_cover,domain=cover state_text=\"partially_open\" 42");
        assert!(!line.contains("value="));
    }

    #[test]
    fn test_numeric_field_is_never_quoted() {
        let line = encode_line("m", &BTreeMap::new(), &NormalizedValue::Number(-0.5), 1);
        assert!(line.contains(" value=-0.5 "));
        assert!(!line.contains('"'));
        assert!(!line.contains("state_text"));
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        let line = encode_line(
            "my metric,x",
            &tags(&[("friendly name", "Living Room, East=1"), ("path", "a\\b")]),
            &NormalizedValue::Number(2.0),
            9,
        );
        assert_eq!(
            line,
            "my\\ metric\\,x,friendly\\ name=Living\\ Room\\,\\ East\\=1,path=a\\\\b value=2 9"
        );
    }

    #[test]
    fn test_measurement_keeps_equals_sign() {
        let line = encode_line("a=b", &BTreeMap::new(), &NormalizedValue::Number(1.0), 1);
        assert!(line.starts_with("a=b value=1"));
    }

    #[test]
    fn test_text_field_escapes_quotes_and_newlines() {
        let line = encode_line(
            "m",
            &BTreeMap::new(),
            &NormalizedValue::Text("say \"hi\"\nthen \\ leave".to_string()),
            3,
        );
        assert_eq!(line, "m state_text=\"say \\\"hi\\\"\\nthen \\\\ leave\" 3");
    }

    #[test]
    fn test_single_spaces_between_sections() {
        let line = encode_line(
            "m",
            &tags(&[("k", "v")]),
            &NormalizedValue::Number(1.5),
            77,
        );
        let sections: Vec<&str> = line.split(' ').collect();
        assert_eq!(sections, vec!["m,k=v", "value=1.5", "77"]);
    }
}
