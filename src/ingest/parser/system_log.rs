// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Value};

use super::fields::{
    first_string, object_field, parse_object, str_field, timestamp_value, value_to_text,
};
use crate::ingest::event::{Event, SourceType};

/// Level names indexed by numeric level
const LEVEL_NAMES: [&str; 7] = ["silly", "trace", "debug", "info", "warn", "error", "fatal"];

/// Map a numeric level (0-6) to its name
pub fn level_name(level: u64) -> Option<&'static str> {
    LEVEL_NAMES.get(level as usize).copied()
}

/// Parser for structured runtime logs.
///
/// Handles both flat records (`{"time":..,"level":"info","msg":..}`) and
/// positional records where arguments are stored under `"0"`, `"1"`, ...
/// with metadata under `_meta`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLogParser;

impl SystemLogParser {
    pub fn parse_line(&self, line: &str, source_file: &str) -> Option<Event> {
        let obj = parse_object(line)?;
        let meta = object_field(&obj, "_meta");

        // Child loggers serialize their bindings as JSON text in the first slot
        let bindings = obj
            .get("0")
            .and_then(Value::as_str)
            .and_then(parse_object);

        let subsystem = first_string(&obj, &["subsystem", "module"])
            .or_else(|| bindings.as_ref().and_then(|b| first_string(b, &["subsystem"])))
            .or_else(|| meta.and_then(|m| first_string(m, &["name"])));

        let event_type = match subsystem {
            Some(ref s) => format!("log:{}", s),
            None => "log".to_string(),
        };

        let ts = ["time", "timestamp", "ts"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(timestamp_value))
            .or_else(|| meta.and_then(|m| m.get("date")).and_then(timestamp_value));

        let mut event = Event::new(SourceType::SystemLog, source_file, event_type, line)
            .with_ts(ts)
            .with_preview(extract_message(&obj, bindings.is_some()));
        event.level = extract_level(&obj, meta);
        Some(event)
    }
}

fn extract_level(obj: &Map<String, Value>, meta: Option<&Map<String, Value>>) -> Option<String> {
    let from_value = |v: &Value| match v {
        Value::Number(n) => n.as_u64().and_then(level_name).map(str::to_string),
        Value::String(s) if !s.is_empty() => Some(s.to_lowercase()),
        _ => None,
    };

    obj.get("level")
        .and_then(from_value)
        .or_else(|| meta.and_then(|m| m.get("logLevelId")).and_then(from_value))
        .or_else(|| {
            meta.and_then(|m| str_field(m, "logLevelName"))
                .map(str::to_lowercase)
        })
}

fn extract_message(obj: &Map<String, Value>, first_is_bindings: bool) -> Option<String> {
    if let Some(msg) = first_string(obj, &["msg", "message"]) {
        return Some(msg);
    }
    let positional = if first_is_bindings { "1" } else { "0" };
    obj.get(positional).and_then(value_to_text)
}
