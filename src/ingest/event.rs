// SPDX-License-Identifier: Apache-2.0

//! The unified event record produced by every parser.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept in `message_preview`.
pub const MESSAGE_PREVIEW_MAX_CHARS: usize = 500;

/// The recognized log formats. Selects which parser handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Structured runtime logs
    SystemLog,
    /// The cache-tracing event stream
    CacheTrace,
    /// Per-agent session transcripts
    Session,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [
        SourceType::SystemLog,
        SourceType::CacheTrace,
        SourceType::Session,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::SystemLog => "system_log",
            SourceType::CacheTrace => "cache_trace",
            SourceType::Session => "session",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "system_log" | "log" | "system" => Ok(SourceType::SystemLog),
            "cache_trace" | "cache" => Ok(SourceType::CacheTrace),
            "session" | "sessions" => Ok(SourceType::Session),
            _ => Err(format!(
                "Invalid source type '{}'. Valid options: system_log, cache_trace, session",
                s
            )),
        }
    }
}

/// A single parsed log line, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub ts: String,
    pub source_type: SourceType,
    pub source_file: String,
    pub event_type: String,
    pub level: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
    pub provider: Option<String>,
    pub model_id: Option<String>,
    pub role: Option<String>,
    pub message_preview: Option<String>,
    /// The verbatim source line
    pub raw_json: String,
    pub ingested_at: String,
}

impl Event {
    /// Create an event with only the mandatory fields set. `ts` defaults to
    /// the ingestion time until a parser supplies the producer's timestamp.
    pub fn new(
        source_type: SourceType,
        source_file: impl Into<String>,
        event_type: impl Into<String>,
        raw_json: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            ts: now.clone(),
            source_type,
            source_file: source_file.into(),
            event_type: event_type.into(),
            level: None,
            session_id: None,
            agent_id: None,
            run_id: None,
            provider: None,
            model_id: None,
            role: None,
            message_preview: None,
            raw_json: raw_json.into(),
            ingested_at: now,
        }
    }

    /// Set `ts` if the producer supplied a usable timestamp.
    pub fn with_ts(mut self, ts: Option<String>) -> Self {
        if let Some(ts) = ts {
            self.ts = ts;
        }
        self
    }

    pub fn with_preview(mut self, preview: Option<String>) -> Self {
        self.message_preview = preview.map(|p| truncate_preview(&p));
        self
    }
}

/// Current time in the format used for every stored timestamp.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize an RFC 3339 / ISO-8601 timestamp to UTC with millisecond precision.
/// Returns `None` for anything unparseable.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    // Timestamps without an offset are taken as UTC
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| {
            Utc.from_utc_datetime(&naive)
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        })
}

/// Convert epoch milliseconds to the stored timestamp format.
pub fn timestamp_from_millis(ms: i64) -> Option<String> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Truncate to at most `MESSAGE_PREVIEW_MAX_CHARS` characters.
pub fn truncate_preview(text: &str) -> String {
    text.chars().take(MESSAGE_PREVIEW_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_from_str() {
        assert_eq!(
            "system_log".parse::<SourceType>().unwrap(),
            SourceType::SystemLog
        );
        assert_eq!(
            "cache-trace".parse::<SourceType>().unwrap(),
            SourceType::CacheTrace
        );
        assert_eq!("SESSION".parse::<SourceType>().unwrap(), SourceType::Session);
        assert!("metrics".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_source_type_display_matches_serde() {
        for st in SourceType::ALL {
            let json = serde_json::to_string(&st).unwrap();
            assert_eq!(json, format!("\"{}\"", st));
        }
    }

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(
            normalize_timestamp("2024-01-01T12:00:00Z").as_deref(),
            Some("2024-01-01T12:00:00.000Z")
        );
        assert_eq!(
            normalize_timestamp("2024-01-01T14:00:00.250+02:00").as_deref(),
            Some("2024-01-01T12:00:00.250Z")
        );
        assert_eq!(
            normalize_timestamp("2024-01-01T12:00:00.5").as_deref(),
            Some("2024-01-01T12:00:00.500Z")
        );
        assert!(normalize_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_timestamp_from_millis() {
        assert_eq!(
            timestamp_from_millis(1704110400000).as_deref(),
            Some("2024-01-01T12:00:00.000Z")
        );
    }

    #[test]
    fn test_truncate_preview_counts_chars() {
        let long = "é".repeat(600);
        let truncated = truncate_preview(&long);
        assert_eq!(truncated.chars().count(), MESSAGE_PREVIEW_MAX_CHARS);

        assert_eq!(truncate_preview("short"), "short");
    }

    #[test]
    fn test_event_new_defaults_ts_to_ingestion_time() {
        let event = Event::new(SourceType::SystemLog, "/tmp/a.log", "log", "{}");
        assert_eq!(event.ts, event.ingested_at);
        assert!(event.level.is_none());

        let event = event.with_ts(Some("2024-01-01T00:00:00.000Z".to_string()));
        assert_eq!(event.ts, "2024-01-01T00:00:00.000Z");
    }
}
