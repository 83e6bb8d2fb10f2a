// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::ingest::watcher::WatcherError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(String),

    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("Event store not found at {0}")]
    StoreNotFound(std::path::PathBuf),

    #[error("File pass worker failed: {0}")]
    Worker(String),

    #[error("Ingestor is not watching")]
    NotWatching,

    #[error("Ingestor is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
