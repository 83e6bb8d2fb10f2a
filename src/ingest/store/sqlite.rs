// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use tracing::debug;

use super::{FilePass, TrackedFile};
use super::schema::{
    CREATE_INDEXES, CREATE_TABLES, INSERT_EVENT, SELECT_TRACKED_FILE, UPSERT_TRACKED_FILE,
};
use crate::ingest::error::{Error, Result};
use crate::ingest::event::{Event, SourceType, now_rfc3339};

/// SQLite-backed store for events and file cursors
pub struct EventStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("path", &self.path)
            .finish()
    }
}

impl EventStore {
    /// Open or create the database at `path`, creating parent directories
    /// as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn,
            path: Some(path),
        };
        store.ensure_schema()?;
        debug!(path = ?store.path, "Opened event store");
        Ok(store)
    }

    /// Open a database that must already exist. Nothing is created on disk
    /// when it is missing.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::StoreNotFound(path));
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let store = Self {
            conn,
            path: Some(path),
        };
        store.ensure_schema()?;
        debug!(path = ?store.path, "Opened existing event store");
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create tables and indexes if they do not exist. Safe to call repeatedly.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(CREATE_TABLES)?;
        self.conn.execute_batch(CREATE_INDEXES)?;
        Ok(())
    }

    /// Record the cursor for `path`, replacing any previous one
    pub fn upsert_tracked_file(
        &self,
        path: &str,
        source_type: SourceType,
        byte_offset: u64,
        file_size: u64,
    ) -> Result<()> {
        upsert_cursor(&self.conn, path, source_type, byte_offset, file_size)
    }

    pub fn get_tracked_file(&self, path: &str) -> Result<Option<TrackedFile>> {
        let tracked = self
            .conn
            .query_row(SELECT_TRACKED_FILE, params![path], map_tracked_file)
            .optional()?;
        Ok(tracked)
    }

    /// Insert all events in one transaction. Either every row is written or
    /// none is.
    pub fn insert_events_batch(&mut self, events: &[Event]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let inserted = insert_rows(&tx, events)?;
        // Dropping an uncommitted transaction rolls it back
        tx.commit()?;
        Ok(inserted)
    }

    /// Write a file pass's events in groups of `batch_size` and advance its
    /// cursor, all in one transaction. On error nothing from the pass is
    /// kept and the previous cursor stays in place.
    pub fn commit_file_pass(&mut self, pass: &FilePass<'_>, batch_size: usize) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        for chunk in pass.events.chunks(batch_size.max(1)) {
            inserted += insert_rows(&tx, chunk)?;
        }
        upsert_cursor(
            &tx,
            pass.path,
            pass.source_type,
            pass.byte_offset,
            pass.file_size,
        )?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn count_tracked_files(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tracked_files", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn count_events(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Event counts grouped by source type
    pub fn count_events_by_source(&self) -> Result<BTreeMap<SourceType, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_type, COUNT(*) FROM events GROUP BY source_type")?;
        let rows = stmt.query_map([], |row| {
            let source_type = source_type_column(row, 0)?;
            let count: i64 = row.get(1)?;
            Ok((source_type, count.max(0) as u64))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (source_type, count) = row?;
            counts.insert(source_type, count);
        }
        Ok(counts)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, surfacing any error from the final flush
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Store(e))
    }
}

fn insert_rows(conn: &Connection, events: &[Event]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(INSERT_EVENT)?;
    for event in events {
        stmt.execute(params![
            event.ts,
            event.source_type.as_str(),
            event.source_file,
            event.event_type,
            event.level,
            event.session_id,
            event.agent_id,
            event.run_id,
            event.provider,
            event.model_id,
            event.role,
            event.message_preview,
            event.raw_json,
            event.ingested_at,
        ])?;
    }
    Ok(events.len())
}

fn upsert_cursor(
    conn: &Connection,
    path: &str,
    source_type: SourceType,
    byte_offset: u64,
    file_size: u64,
) -> Result<()> {
    conn.execute(
        UPSERT_TRACKED_FILE,
        params![
            path,
            source_type.as_str(),
            to_sql_int(byte_offset),
            to_sql_int(file_size),
            now_rfc3339()
        ],
    )?;
    Ok(())
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn source_type_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<SourceType> {
    let raw: String = row.get(idx)?;
    raw.parse::<SourceType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn map_tracked_file(row: &Row<'_>) -> rusqlite::Result<TrackedFile> {
    let byte_offset: i64 = row.get(2)?;
    let file_size: i64 = row.get(3)?;
    Ok(TrackedFile {
        path: row.get(0)?,
        source_type: source_type_column(row, 1)?,
        byte_offset: byte_offset.max(0) as u64,
        file_size: file_size.max(0) as u64,
        last_seen_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(event_type: &str, source_type: SourceType) -> Event {
        Event::new(source_type, "/s/logs/a.log", event_type, "{}")
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("ingest/nested/events.db");

        let store = EventStore::open(&db).unwrap();
        assert!(db.exists());
        assert_eq!(store.path(), Some(db.as_path()));
        store.close().unwrap();
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let store = EventStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(store.count_events().unwrap(), 0);
    }

    #[test]
    fn test_tracked_file_upsert_overwrites() {
        let store = EventStore::open_in_memory().unwrap();
        assert!(store.get_tracked_file("/s/logs/a.log").unwrap().is_none());

        store
            .upsert_tracked_file("/s/logs/a.log", SourceType::SystemLog, 100, 120)
            .unwrap();
        store
            .upsert_tracked_file("/s/logs/a.log", SourceType::SystemLog, 40, 40)
            .unwrap();

        let tracked = store.get_tracked_file("/s/logs/a.log").unwrap().unwrap();
        assert_eq!(tracked.byte_offset, 40);
        assert_eq!(tracked.file_size, 40);
        assert_eq!(tracked.source_type, SourceType::SystemLog);
        assert_eq!(store.count_tracked_files().unwrap(), 1);
    }

    #[test]
    fn test_insert_and_count_by_source() {
        let mut store = EventStore::open_in_memory().unwrap();
        let events = vec![
            event("log", SourceType::SystemLog),
            event("log:gw", SourceType::SystemLog),
            event("cache:s", SourceType::CacheTrace),
        ];

        assert_eq!(store.insert_events_batch(&events).unwrap(), 3);
        assert_eq!(store.insert_events_batch(&[]).unwrap(), 0);
        assert_eq!(store.count_events().unwrap(), 3);

        let by_source = store.count_events_by_source().unwrap();
        assert_eq!(by_source.get(&SourceType::SystemLog), Some(&2));
        assert_eq!(by_source.get(&SourceType::CacheTrace), Some(&1));
        assert_eq!(by_source.get(&SourceType::Session), None);
    }

    #[test]
    fn test_batch_rolls_back_on_row_failure() {
        let mut store = EventStore::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON events
                 WHEN NEW.event_type = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned'); END;",
            )
            .unwrap();

        let events = vec![
            event("log", SourceType::SystemLog),
            event("poison", SourceType::SystemLog),
            event("log", SourceType::SystemLog),
        ];

        let err = store.insert_events_batch(&events).unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(store.count_events().unwrap(), 0);

        // The connection is still usable after the rollback
        store.insert_events_batch(&events[..1]).unwrap();
        assert_eq!(store.count_events().unwrap(), 1);
    }

    #[test]
    fn test_file_pass_is_all_or_nothing() {
        let mut store = EventStore::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON events
                 WHEN NEW.event_type = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned'); END;",
            )
            .unwrap();

        fn pass(events: &[Event]) -> FilePass<'_> {
            FilePass {
                path: "/s/logs/a.log",
                source_type: SourceType::SystemLog,
                byte_offset: 90,
                file_size: 90,
                events,
            }
        }

        let mut events: Vec<Event> = (0..5).map(|_| event("log", SourceType::SystemLog)).collect();
        // Lands in the second group of two
        events[3] = event("poison", SourceType::SystemLog);
        assert!(matches!(
            store.commit_file_pass(&pass(&events), 2),
            Err(Error::Store(_))
        ));
        assert_eq!(store.count_events().unwrap(), 0);
        assert!(store.get_tracked_file("/s/logs/a.log").unwrap().is_none());

        events[3] = event("log", SourceType::SystemLog);
        assert_eq!(store.commit_file_pass(&pass(&events), 2).unwrap(), 5);
        assert_eq!(store.count_events().unwrap(), 5);
        let tracked = store.get_tracked_file("/s/logs/a.log").unwrap().unwrap();
        assert_eq!(tracked.byte_offset, 90);
    }

    #[test]
    fn test_open_existing_does_not_create() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("ingest/events.db");

        let err = EventStore::open_existing(&db).unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(ref p) if p == &db));
        assert!(!db.exists());
        assert!(!dir.path().join("ingest").exists());

        EventStore::open(&db).unwrap().close().unwrap();
        let store = EventStore::open_existing(&db).unwrap();
        assert_eq!(store.count_events().unwrap(), 0);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("events.db");

        let mut store = EventStore::open(&db).unwrap();
        store
            .insert_events_batch(&[event("log", SourceType::SystemLog)])
            .unwrap();
        store
            .upsert_tracked_file("/s/logs/a.log", SourceType::SystemLog, 3, 3)
            .unwrap();
        store.close().unwrap();

        let store = EventStore::open(&db).unwrap();
        assert_eq!(store.count_events().unwrap(), 1);
        assert_eq!(
            store.get_tracked_file("/s/logs/a.log").unwrap().unwrap().byte_offset,
            3
        );
    }
}
