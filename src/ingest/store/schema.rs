// SPDX-License-Identifier: Apache-2.0

//! Table definitions for the event store.
//!
//! `tracked_files` holds one read cursor per source file. `events` holds the
//! normalized records; the indexes serve the read side, which lives outside
//! this crate.

pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS tracked_files (
    path TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    byte_offset INTEGER NOT NULL DEFAULT 0,
    file_size INTEGER NOT NULL DEFAULT 0,
    last_seen_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts TEXT NOT NULL,
    source_type TEXT NOT NULL,
    source_file TEXT NOT NULL,
    event_type TEXT NOT NULL,
    level TEXT,
    session_id TEXT,
    agent_id TEXT,
    run_id TEXT,
    provider TEXT,
    model_id TEXT,
    role TEXT,
    message_preview TEXT,
    raw_json TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);
";

pub const CREATE_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts);
CREATE INDEX IF NOT EXISTS idx_events_source_type ON events(source_type);
CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_session_id ON events(session_id);
CREATE INDEX IF NOT EXISTS idx_events_agent_id ON events(agent_id);
CREATE INDEX IF NOT EXISTS idx_events_run_id ON events(run_id);
CREATE INDEX IF NOT EXISTS idx_events_level ON events(level);
";

pub const INSERT_EVENT: &str = "
INSERT INTO events (
    ts, source_type, source_file, event_type, level, session_id, agent_id,
    run_id, provider, model_id, role, message_preview, raw_json, ingested_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
";

pub const UPSERT_TRACKED_FILE: &str = "
INSERT INTO tracked_files (path, source_type, byte_offset, file_size, last_seen_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(path) DO UPDATE SET
    source_type = excluded.source_type,
    byte_offset = excluded.byte_offset,
    file_size = excluded.file_size,
    last_seen_at = excluded.last_seen_at
";

pub const SELECT_TRACKED_FILE: &str = "
SELECT path, source_type, byte_offset, file_size, last_seen_at
FROM tracked_files
WHERE path = ?1
";
