// SPDX-License-Identifier: Apache-2.0

//! Backend-neutral types shared by the native and polling watchers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("watcher initialization failed: {0}")]
    Init(String),

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel error: {0}")]
    Channel(String),
}

/// Raw change kind reported by a backend. Only a hint: the settle tracker
/// re-stats every path before deciding what to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Create,
    Modify,
    Remove,
    Other,
}

/// A raw file system event
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub paths: Vec<PathBuf>,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, paths: Vec<PathBuf>) -> Self {
        Self { kind, paths }
    }

    pub fn create(path: PathBuf) -> Self {
        Self::new(FileEventKind::Create, vec![path])
    }

    pub fn modify(path: PathBuf) -> Self {
        Self::new(FileEventKind::Modify, vec![path])
    }

    pub fn remove(path: PathBuf) -> Self {
        Self::new(FileEventKind::Remove, vec![path])
    }
}

/// A source of raw file system events.
///
/// Implementations either subscribe to OS notifications or periodically
/// rescan the watched directories.
pub trait FileWatcher {
    /// Start watching a directory. With `recursive`, changes in any
    /// subdirectory are reported too.
    fn watch(&mut self, path: &Path, recursive: bool) -> Result<(), WatcherError>;

    /// Block until events are available or `timeout` expires. Returns an
    /// empty vector on timeout.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
