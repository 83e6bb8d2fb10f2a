// SPDX-License-Identifier: Apache-2.0

//! Incremental ingestion of local log files into an event store.
//!
//! Three formats are recognized: structured runtime logs, the cache-trace
//! stream and per-agent session transcripts. Files are matched by glob
//! descriptors, tailed from a persisted byte cursor, parsed line by line and
//! written to SQLite.
//!
//! Features:
//! - Cursor persistence for resume after restarts
//! - Rotation and truncation detection
//! - Bounded bootstrap reads for large existing files
//! - Native or polling change detection with write-burst settling

pub mod config;
pub mod debounce;
pub mod error;
pub mod event;
pub mod ingestor;
pub mod input;
pub mod parser;
pub mod store;
pub mod watcher;

pub use config::{IngestorConfig, default_descriptors};
pub use error::{Error, Result};
pub use event::{Event, SourceType};
pub use ingestor::{BackfillSummary, FileIngestOutcome, Ingestor, IngestorState, IngestorStatus};
pub use input::{TailRead, WatchDescriptor, read_new_lines};
pub use parser::LineParser;
pub use store::{EventStore, FilePass, TrackedFile};
pub use watcher::{WatchEventKind, WatchMode, WatchNotification, Watcher, WatcherConfig};
