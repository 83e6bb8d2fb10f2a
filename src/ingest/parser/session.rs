// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::fields::{object_field, parse_object, str_field, string_field, timestamp_value};
use crate::ingest::event::{Event, SourceType};

static AGENT_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"agents/([^/]+)/sessions/").expect("agent directory regex is valid")
});

/// Agent identifier from an `agents/<id>/sessions/` path segment
pub fn agent_id_from_path(path: &str) -> Option<String> {
    let normalized = path.replace('\\', "/");
    AGENT_DIR
        .captures(&normalized)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Session identifier from a transcript file name, e.g. `abc.part2.jsonl` -> `abc`
pub fn session_id_from_path(path: &str) -> Option<String> {
    let name = Path::new(path).file_name()?.to_str()?;
    let stem = name.split('.').next().unwrap_or(name);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Parser for per-agent session transcripts.
///
/// Records are discriminated by `type`: a `session` header opens the
/// transcript, `message` records carry one conversational turn, and any other
/// type is stored generically.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionParser;

impl SessionParser {
    pub fn parse_line(&self, line: &str, source_file: &str) -> Option<Event> {
        let obj = parse_object(line)?;
        let record_type = obj.get("type").and_then(Value::as_str)?;
        let record_ts = obj.get("timestamp").and_then(timestamp_value);

        let mut event = match record_type {
            "session" => {
                let id = str_field(&obj, "id")?;
                let mut event = Event::new(SourceType::Session, source_file, "session:start", line)
                    .with_ts(record_ts);
                event.session_id = Some(id.to_string());
                event
            }
            "message" => {
                let message = object_field(&obj, "message")?;
                let role = message.get("role").and_then(Value::as_str)?;

                let ts = message
                    .get("timestamp")
                    .and_then(timestamp_value)
                    .or(record_ts);

                let mut event = Event::new(
                    SourceType::Session,
                    source_file,
                    format!("session:message:{}", role),
                    line,
                )
                .with_ts(ts)
                .with_preview(content_preview(message));
                event.role = Some(role.to_string());
                event.provider = string_field(message, "provider");
                event.model_id = string_field(message, "model");
                event
            }
            other => Event::new(
                SourceType::Session,
                source_file,
                format!("session:{}", other),
                line,
            )
            .with_ts(record_ts),
        };

        if event.session_id.is_none() {
            event.session_id = session_id_from_path(source_file);
        }
        event.agent_id = agent_id_from_path(source_file);
        Some(event)
    }
}

/// Text of a message: plain string content, or the first text block.
fn content_preview(message: &Map<String, Value>) -> Option<String> {
    match message.get("content")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(Value::as_object)
            .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|b| string_field(b, "text")),
        _ => None,
    }
}
