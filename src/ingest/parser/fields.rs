// SPDX-License-Identifier: Apache-2.0

//! Small accessors over `serde_json` objects shared by the parsers.

use serde_json::{Map, Value};

use crate::ingest::event::{normalize_timestamp, timestamp_from_millis};

/// Parse a line as a JSON object. Anything else yields `None`.
pub(crate) fn parse_object(line: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Non-empty string field
pub(crate) fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub(crate) fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    str_field(obj, key).map(str::to_string)
}

/// First non-empty string among `keys`
pub(crate) fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| string_field(obj, k))
}

pub(crate) fn object_field<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}

/// Interpret a JSON value as a timestamp: RFC 3339 text or epoch milliseconds
pub(crate) fn timestamp_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(timestamp_from_millis),
        _ => None,
    }
}

/// Render a scalar as text; objects and arrays are serialized compactly
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
