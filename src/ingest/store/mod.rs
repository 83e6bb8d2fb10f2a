// SPDX-License-Identifier: Apache-2.0

//! Durable storage for events and per-file read cursors.
//!
//! Backed by SQLite in WAL mode so readers outside this process can query
//! while ingestion is running.

mod schema;
mod sqlite;

pub use sqlite::EventStore;


use serde::Serialize;

use crate::ingest::event::{Event, SourceType};

/// Everything one read of a file produced: its events and the cursor to
/// store once they are written.
#[derive(Debug, Clone, Copy)]
pub struct FilePass<'a> {
    pub path: &'a str,
    pub source_type: SourceType,
    pub byte_offset: u64,
    pub file_size: u64,
    pub events: &'a [Event],
}

/// The stored read cursor for one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedFile {
    pub path: String,
    pub source_type: SourceType,
    /// Position just past the last line handed to a parser
    pub byte_offset: u64,
    /// File size observed on the last read
    pub file_size: u64,
    pub last_seen_at: String,
}
