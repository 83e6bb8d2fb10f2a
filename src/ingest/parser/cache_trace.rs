// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Value};

use super::fields::{parse_object, str_field, string_field, timestamp_value};
use crate::ingest::event::{Event, SourceType};

/// Parser for the cache-trace stream.
///
/// Every record carries `ts`, `seq` and `stage`; records missing any of them
/// are not cache-trace events and are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheTraceParser;

impl CacheTraceParser {
    pub fn parse_line(&self, line: &str, source_file: &str) -> Option<Event> {
        let obj = parse_object(line)?;

        let raw_ts = obj.get("ts").filter(|v| v.is_string())?;
        obj.get("seq").filter(|v| v.is_number())?;
        let stage = obj.get("stage").and_then(Value::as_str)?;

        let error = error_message(&obj);

        let mut event = Event::new(
            SourceType::CacheTrace,
            source_file,
            format!("cache:{}", stage),
            line,
        )
        .with_ts(timestamp_value(raw_ts))
        .with_preview(preview(&obj, error.as_deref()));

        if error.is_some() {
            event.level = Some("error".to_string());
        }
        event.session_id = string_field(&obj, "sessionId");
        event.run_id = string_field(&obj, "runId");
        event.provider = string_field(&obj, "provider");
        event.model_id = string_field(&obj, "modelId");
        Some(event)
    }
}

fn error_message(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("error")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(err) => {
            Some(string_field(err, "message").unwrap_or_else(|| "unknown".to_string()))
        }
        _ => None,
    }
}

fn preview(obj: &Map<String, Value>, error: Option<&str>) -> Option<String> {
    if let Some(note) = str_field(obj, "note") {
        return Some(note.to_string());
    }
    if let Some(err) = error {
        return Some(format!("error: {}", err));
    }
    obj.get("messageCount")
        .filter(|v| v.is_number())
        .map(|count| format!("messages: {}", count))
}
