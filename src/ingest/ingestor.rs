// SPDX-License-Identifier: Apache-2.0

//! The ingestion pipeline: discover, tail, parse, store.
//!
//! The [`Ingestor`] owns the event store exclusively. [`Ingestor::run`] hands
//! the store to a blocking worker for each debounced pass and takes it back
//! when the pass ends, so passes never overlap. The watcher thread only feeds
//! notifications into a channel.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ingest::config::IngestorConfig;
use crate::ingest::debounce::DebounceState;
use crate::ingest::error::{Error, Result};
use crate::ingest::event::SourceType;
use crate::ingest::input::pattern::is_ignored_hidden;
use crate::ingest::input::{CompiledDescriptor, FileFinder, classify, compile_all, read_new_lines};
use crate::ingest::parser::LineParser;
use crate::ingest::store::{EventStore, FilePass};
use crate::ingest::watcher::{WatchEventKind, WatchNotification, Watcher, WatcherHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestorState {
    Created,
    Watching,
    Stopped,
    Closed,
}

/// Totals for one pass over all existing files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub files_processed: usize,
    pub events_inserted: usize,
}

/// What a single `ingest_file` call did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileIngestOutcome {
    pub path: PathBuf,
    pub source_type: SourceType,
    pub lines_read: usize,
    pub lines_skipped: usize,
    pub events_inserted: usize,
    /// Cursor stored after this pass
    pub cursor: u64,
    pub truncated: bool,
    pub reset: bool,
}

/// Point-in-time view of the ingestor and its store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestorStatus {
    pub state: IngestorState,
    pub store_path: String,
    pub watching: bool,
    pub tracked_files: u64,
    pub total_events: u64,
    pub events_by_source: BTreeMap<SourceType, u64>,
    /// Debounced passes run by this instance
    pub passes_completed: u64,
}

pub struct Ingestor {
    config: IngestorConfig,
    descriptors: Vec<CompiledDescriptor>,
    store: Option<EventStore>,
    state: IngestorState,
    watcher: Option<WatcherHandle>,
    notifications: Option<mpsc::UnboundedReceiver<WatchNotification>>,
    debounce: DebounceState,
    /// Source type reported by the watcher, used when re-classification fails
    notified_types: HashMap<PathBuf, SourceType>,
    passes_completed: u64,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("state", &self.state)
            .field("store", &self.store)
            .field("pending", &self.debounce.pending_len())
            .finish()
    }
}

impl Ingestor {
    /// Validate the configuration and open the store it names
    pub fn open(config: IngestorConfig) -> Result<Self> {
        let config = config.into_absolute()?;
        config.validate()?;
        let store = EventStore::open(config.db_path())?;
        Self::with_store(config, store)
    }

    /// Like [`open`](Ingestor::open), but fails with `StoreNotFound` rather
    /// than creating a store that does not exist yet.
    pub fn open_existing(config: IngestorConfig) -> Result<Self> {
        let config = config.into_absolute()?;
        config.validate()?;
        let store = EventStore::open_existing(config.db_path())?;
        Self::with_store(config, store)
    }

    /// Build an ingestor around an already open store
    pub fn with_store(config: IngestorConfig, store: EventStore) -> Result<Self> {
        let config = config.into_absolute()?;
        config.validate()?;
        let descriptors = compile_all(&config.descriptors())?;
        let debounce = DebounceState::new(config.debounce);
        Ok(Self {
            config,
            descriptors,
            store: Some(store),
            state: IngestorState::Created,
            watcher: None,
            notifications: None,
            debounce,
            notified_types: HashMap::new(),
            passes_completed: 0,
        })
    }

    pub fn state(&self) -> IngestorState {
        self.state
    }

    pub fn config(&self) -> &IngestorConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            IngestorState::Closed => Err(Error::Closed),
            _ => Ok(()),
        }
    }

    /// Ingest every file currently matching a descriptor. Failures on one
    /// file are logged and do not stop the others.
    pub fn ingest_existing(&mut self) -> Result<BackfillSummary> {
        self.ensure_open()?;

        let finder = FileFinder::new(self.config.descriptors());
        let files = finder.find_files()?;
        let mut summary = BackfillSummary::default();

        for (path, source_type) in files {
            if is_ignored_hidden(&path, &self.config.state_dir) {
                continue;
            }
            match self.ingest_file(&path, source_type) {
                Ok(outcome) => {
                    summary.files_processed += 1;
                    summary.events_inserted += outcome.events_inserted;
                }
                Err(Error::Closed) => return Err(Error::Closed),
                Err(e) => error!("Failed to ingest {:?}: {}", path, e),
            }
        }

        info!(
            files = summary.files_processed,
            events = summary.events_inserted,
            "Backfill complete"
        );
        Ok(summary)
    }

    /// Backfill, then attach the watcher. Changes are processed by [`run`].
    ///
    /// [`run`]: Ingestor::run
    pub fn start_watching(&mut self) -> Result<BackfillSummary> {
        self.ensure_open()?;
        if self.state == IngestorState::Watching {
            debug!("Already watching");
            return Ok(BackfillSummary::default());
        }

        let summary = self.ingest_existing()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Watcher::new(
            self.config.descriptors(),
            self.config.state_dir.clone(),
            self.config.watcher_config(),
        )?;
        let handle = watcher.start(move |notification| {
            // The receiver is gone only while shutting down
            let _ = tx.send(notification);
        })?;

        self.watcher = Some(handle);
        self.notifications = Some(rx);
        self.state = IngestorState::Watching;
        info!(state_dir = ?self.config.state_dir, "Watching for changes");
        Ok(summary)
    }

    /// Process notifications until `cancel` fires, then stop watching.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.ensure_open()?;
        let mut rx = self.notifications.take().ok_or(Error::NotWatching)?;

        loop {
            let deadline = self.debounce.deadline();
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Cancellation received, stopping ingestion loop");
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(notification) => self.on_notification(notification),
                    None => {
                        warn!("Watcher channel closed, stopping ingestion loop");
                        break;
                    }
                },
                _ = wait_until(deadline) => {
                    if let Err(e) = self.process_due(&mut rx).await {
                        self.abandon();
                        return Err(e);
                    }
                }
            }
        }

        drop(rx);
        self.stop_watching()
    }

    fn on_notification(&mut self, notification: WatchNotification) {
        if notification.kind == WatchEventKind::Unlink {
            debug!(path = ?notification.path, "File removed, ignoring");
            return;
        }
        self.notified_types
            .insert(notification.path.clone(), notification.source_type);
        self.debounce.enqueue(notification.path, Instant::now());
    }

    /// Run one debounced pass if it is due. Notifications that arrived during
    /// the pass are buffered before the pass is marked finished.
    async fn process_due(
        &mut self,
        rx: &mut mpsc::UnboundedReceiver<WatchNotification>,
    ) -> Result<()> {
        let Some(paths) = self.debounce.take_due(Instant::now()) else {
            return Ok(());
        };
        self.passes_completed += 1;
        debug!(files = paths.len(), "Processing changed files");

        let work: Vec<(PathBuf, SourceType)> = paths
            .into_iter()
            .filter_map(|path| {
                let notified = self.notified_types.remove(&path);
                match classify(&self.descriptors, &path).or(notified) {
                    Some(source_type) => Some((path, source_type)),
                    None => {
                        debug!(path = ?path, "No descriptor matches, skipping");
                        None
                    }
                }
            })
            .collect();

        let mut store = self.store.take().ok_or(Error::Closed)?;
        let limits = self.limits();
        let worker = tokio::task::spawn_blocking(move || {
            for (path, source_type) in work {
                match ingest_path(&mut store, &path, source_type, limits) {
                    Ok(outcome) if outcome.events_inserted > 0 => info!(
                        path = ?outcome.path,
                        events = outcome.events_inserted,
                        skipped = outcome.lines_skipped,
                        "Ingested new events"
                    ),
                    Ok(_) => {}
                    Err(e) => error!("Failed to ingest {:?}: {}", path, e),
                }
            }
            store
        });

        match worker.await {
            Ok(store) => self.store = Some(store),
            Err(e) => return Err(Error::Worker(e.to_string())),
        }

        while let Ok(notification) = rx.try_recv() {
            self.on_notification(notification);
        }
        self.debounce.finish_pass(Instant::now());
        Ok(())
    }

    /// The store went down with a failed worker: detach and close.
    fn abandon(&mut self) {
        error!("File pass worker failed, closing ingestor");
        self.debounce.cancel();
        self.notified_types.clear();
        if let Some(mut handle) = self.watcher.take() {
            handle.stop();
        }
        self.state = IngestorState::Closed;
    }

    fn limits(&self) -> PassLimits {
        PassLimits {
            max_read_bytes: self.config.max_read_bytes,
            batch_size: self.config.batch_size,
        }
    }

    /// Detach the watcher and drop anything pending
    pub fn stop_watching(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.debounce.cancel();
        self.notified_types.clear();
        self.notifications = None;
        if let Some(mut handle) = self.watcher.take() {
            handle.stop();
        }
        if self.state == IngestorState::Watching {
            self.state = IngestorState::Stopped;
            info!("Stopped watching");
        }
        Ok(())
    }

    /// Read whatever was appended to `path` since its cursor, store the parsed
    /// events and advance the cursor. Events and cursor are committed
    /// together: if storing fails nothing from the pass is kept, so the same
    /// lines are read again next time.
    pub fn ingest_file(&mut self, path: &Path, source_type: SourceType) -> Result<FileIngestOutcome> {
        let limits = self.limits();
        let store = self.store.as_mut().ok_or(Error::Closed)?;
        ingest_path(store, path, source_type, limits)
    }

    pub fn status(&self) -> Result<IngestorStatus> {
        let store = self.store.as_ref().ok_or(Error::Closed)?;
        let store_path = store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());

        Ok(IngestorStatus {
            state: self.state,
            store_path,
            watching: self.state == IngestorState::Watching,
            tracked_files: store.count_tracked_files()?,
            total_events: store.count_events()?,
            events_by_source: store.count_events_by_source()?,
            passes_completed: self.passes_completed,
        })
    }

    /// Stop watching and close the store. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == IngestorState::Closed {
            return Ok(());
        }
        self.stop_watching()?;
        self.state = IngestorState::Closed;
        if let Some(store) = self.store.take() {
            store.close()?;
        }
        info!("Ingestor closed");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct PassLimits {
    max_read_bytes: u64,
    batch_size: usize,
}

fn ingest_path(
    store: &mut EventStore,
    path: &Path,
    source_type: SourceType,
    limits: PassLimits,
) -> Result<FileIngestOutcome> {
    let path = std::path::absolute(path)?;
    let key = path.to_string_lossy().into_owned();

    let cursor = store.get_tracked_file(&key)?.map(|t| t.byte_offset);
    let read = read_new_lines(&path, cursor, limits.max_read_bytes)?;
    if !read.exists {
        debug!(path = %key, "File is gone, nothing to read");
        return Ok(FileIngestOutcome {
            path,
            source_type,
            lines_read: 0,
            lines_skipped: 0,
            events_inserted: 0,
            cursor: cursor.unwrap_or(0),
            truncated: false,
            reset: false,
        });
    }
    if read.truncated {
        warn!(
            path = %key,
            size = read.file_size,
            "Unread span exceeds read cap, skipping to the tail"
        );
    } else if read.reset {
        info!(path = %key, "File shrank below its cursor, reading from the start");
    }

    let parser = LineParser::for_source(source_type);
    let events = parser.parse_all(&read.lines, &key);
    let lines_skipped = read.lines.len() - events.len();
    if lines_skipped > 0 {
        debug!(path = %key, skipped = lines_skipped, "Skipped unparseable lines");
    }

    let pass = FilePass {
        path: &key,
        source_type,
        byte_offset: read.cursor,
        file_size: read.file_size,
        events: &events,
    };
    let events_inserted = store.commit_file_pass(&pass, limits.batch_size)?;

    debug!(
        path = %key,
        lines = read.lines.len(),
        events = events_inserted,
        cursor = read.cursor,
        "File pass complete"
    );

    Ok(FileIngestOutcome {
        path,
        source_type,
        lines_read: read.lines.len(),
        lines_skipped,
        events_inserted,
        cursor: read.cursor,
        truncated: read.truncated,
        reset: read.reset,
    })
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
