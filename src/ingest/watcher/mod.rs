// SPDX-License-Identifier: Apache-2.0

//! File system monitoring for the ingestor.
//!
//! Two backends are available:
//! - **Native**: OS notifications (inotify on Linux, FSEvents on macOS,
//!   ReadDirectoryChangesW on Windows).
//! - **Poll**: periodic rescans, for network file systems or containers
//!   where notifications are unreliable.
//!
//! `auto` tries native first and falls back to polling. Either way, raw
//! events are classified against the watch descriptors, filtered for hidden
//! paths, and held by a [`SettleTracker`] until each write burst is quiet.

mod native;
mod poll;
mod settle;
mod traits;

pub use native::NativeWatcher;
pub use poll::PollWatcher;
pub use settle::SettleTracker;
pub use traits::{FileEvent, FileEventKind, FileWatcher, WatcherError};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ingest::error::Result;
use crate::ingest::event::SourceType;
use crate::ingest::input::pattern::{is_ignored_hidden, watch_root};
use crate::ingest::input::{CompiledDescriptor, FileFinder, WatchDescriptor, classify, compile_all};

/// Backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Native notifications, falling back to polling if they cannot start
    #[default]
    Auto,
    Native,
    Poll,
}

impl std::str::FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(WatchMode::Auto),
            "native" => Ok(WatchMode::Native),
            "poll" | "polling" => Ok(WatchMode::Poll),
            _ => Err(format!(
                "Invalid watch mode '{}'. Valid options: auto, native, poll",
                s
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub mode: WatchMode,
    /// How often pending paths are re-checked (and the poll backend rescans)
    pub poll_interval: Duration,
    /// How long a file's size must hold still before it is reported
    pub stability_threshold: Duration,
    /// Report files that already exist at startup as `Add`
    pub emit_existing: bool,
    /// Persistent backend errors for this long trigger a switch to polling
    pub max_error_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            poll_interval: Duration::from_millis(100),
            stability_threshold: Duration::from_millis(500),
            emit_existing: false,
            max_error_duration: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    Add,
    Change,
    Unlink,
}

/// A settled change to a file matching one of the watch descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNotification {
    pub path: PathBuf,
    pub source_type: SourceType,
    pub kind: WatchEventKind,
}

/// Create a backend for `mode`. In `Auto` mode a native watcher that fails
/// to initialize is replaced by a poll watcher.
pub fn create_watcher(
    mode: WatchMode,
    poll_interval: Duration,
) -> std::result::Result<Box<dyn FileWatcher + Send>, WatcherError> {
    match mode {
        WatchMode::Native => Ok(Box::new(NativeWatcher::new()?)),
        WatchMode::Poll => Ok(Box::new(PollWatcher::new(poll_interval))),
        WatchMode::Auto => match NativeWatcher::new() {
            Ok(watcher) => Ok(Box::new(watcher)),
            Err(e) => {
                warn!(
                    "Native file watching unavailable ({}), falling back to polling",
                    e
                );
                Ok(Box::new(PollWatcher::new(poll_interval)))
            }
        },
    }
}

/// Directories to watch for a set of patterns.
///
/// Roots that do not exist yet are replaced by their nearest existing
/// ancestor, watched recursively so the missing directories are seen when
/// they appear.
pub fn watch_roots(descriptors: &[WatchDescriptor]) -> Vec<(PathBuf, bool)> {
    let mut roots: BTreeMap<PathBuf, bool> = BTreeMap::new();

    for descriptor in descriptors {
        let (mut root, mut recursive) = watch_root(&descriptor.pattern);
        while !root.is_dir() {
            match root.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    root = parent.to_path_buf();
                    recursive = true;
                }
                _ => {
                    root = PathBuf::from(".");
                    recursive = true;
                    break;
                }
            }
        }
        *roots.entry(root).or_insert(false) |= recursive;
    }

    roots.into_iter().collect()
}

/// Watches a set of descriptors and reports settled changes to a callback.
pub struct Watcher {
    descriptors: Vec<WatchDescriptor>,
    compiled: Vec<CompiledDescriptor>,
    state_dir: PathBuf,
    config: WatcherConfig,
}

impl Watcher {
    /// `state_dir` anchors the hidden-path rule: only components below it
    /// are checked.
    pub fn new(
        descriptors: Vec<WatchDescriptor>,
        state_dir: impl Into<PathBuf>,
        config: WatcherConfig,
    ) -> Result<Self> {
        let compiled = compile_all(&descriptors)?;
        Ok(Self {
            descriptors,
            compiled,
            state_dir: state_dir.into(),
            config,
        })
    }

    /// Start monitoring on a dedicated thread. The callback runs on that
    /// thread, once per settled change.
    pub fn start<F>(self, callback: F) -> Result<WatcherHandle>
    where
        F: FnMut(WatchNotification) + Send + 'static,
    {
        let mut backend = create_watcher(self.config.mode, self.config.poll_interval)?;
        let roots = watch_roots(&self.descriptors);
        for (root, recursive) in &roots {
            // A root that cannot be watched is reported and skipped
            if let Err(e) = backend.watch(root, *recursive) {
                warn!("Failed to watch {:?}: {}", root, e);
            }
        }
        info!(
            backend = backend.backend_name(),
            roots = roots.len(),
            "File watcher started"
        );

        let cancel = CancellationToken::new();
        let thread_cancel = cancel.clone();
        let coordinator = WatchLoop {
            backend,
            roots,
            compiled: self.compiled,
            finder: FileFinder::new(self.descriptors),
            state_dir: self.state_dir,
            tracker: SettleTracker::new(self.config.stability_threshold),
            config: self.config,
            first_error: None,
            callback,
        };

        let thread = std::thread::Builder::new()
            .name("ingestd-watcher".to_string())
            .spawn(move || coordinator.run(thread_cancel))?;

        Ok(WatcherHandle {
            cancel,
            thread: Some(thread),
        })
    }
}

/// Stops the watcher thread when `stop` is called or the handle is dropped.
#[derive(Debug)]
pub struct WatcherHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Stop monitoring and wait for the watcher thread to exit. No callback
    /// runs after this returns.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Watcher thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WatchLoop<F> {
    backend: Box<dyn FileWatcher + Send>,
    roots: Vec<(PathBuf, bool)>,
    compiled: Vec<CompiledDescriptor>,
    finder: FileFinder,
    state_dir: PathBuf,
    tracker: SettleTracker,
    config: WatcherConfig,
    first_error: Option<Instant>,
    callback: F,
}

impl<F> WatchLoop<F>
where
    F: FnMut(WatchNotification),
{
    fn run(mut self, cancel: CancellationToken) {
        self.seed_existing(&cancel);

        loop {
            if cancel.is_cancelled() {
                debug!("Cancellation received, stopping file watcher");
                break;
            }

            match self.backend.recv_timeout(self.config.poll_interval) {
                Ok(events) => {
                    if self.first_error.take().is_some() {
                        debug!("Watcher recovered after previous errors");
                    }
                    let now = Instant::now();
                    for event in events {
                        for path in event.paths {
                            self.observe(&path, now);
                        }
                    }
                }
                Err(e) => self.handle_error(e),
            }

            for (path, kind) in self.tracker.tick(Instant::now()) {
                if cancel.is_cancelled() {
                    break;
                }
                self.emit(path, kind);
            }
        }
    }

    /// Register files present at startup, optionally reporting them as added
    fn seed_existing(&mut self, cancel: &CancellationToken) {
        let files = match self.finder.find_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Initial file scan failed: {}", e);
                return;
            }
        };

        for (path, source_type) in files {
            if cancel.is_cancelled() {
                return;
            }
            if is_ignored_hidden(&path, &self.state_dir) {
                continue;
            }
            self.tracker.mark_known(path.clone());
            if self.config.emit_existing {
                (self.callback)(WatchNotification {
                    path,
                    source_type,
                    kind: WatchEventKind::Add,
                });
            }
        }
    }

    fn classify(&self, path: &Path) -> Option<SourceType> {
        if is_ignored_hidden(path, &self.state_dir) {
            return None;
        }
        classify(&self.compiled, path)
    }

    fn observe(&mut self, path: &Path, now: Instant) {
        if self.classify(path).is_none() {
            return;
        }
        if let Some(kind) = self.tracker.observe(path, now) {
            self.emit(path.to_path_buf(), kind);
        }
    }

    fn emit(&mut self, path: PathBuf, kind: WatchEventKind) {
        let Some(source_type) = self.classify(&path) else {
            return;
        };
        debug!(path = ?path, ?kind, %source_type, "File change settled");
        (self.callback)(WatchNotification {
            path,
            source_type,
            kind,
        });
    }

    fn handle_error(&mut self, e: WatcherError) {
        let first_error = *self.first_error.get_or_insert_with(Instant::now);
        let elapsed = first_error.elapsed();

        if elapsed < self.config.max_error_duration {
            warn!("Watcher error (errors started {:?} ago): {}", elapsed, e);
            std::thread::sleep(self.config.poll_interval);
            return;
        }

        warn!(
            "Watcher errors persisted for {:?}, falling back to polling: {}",
            elapsed, e
        );
        let mut poll = PollWatcher::new(self.config.poll_interval);
        for (root, recursive) in &self.roots {
            if let Err(e) = poll.watch(root, *recursive) {
                warn!("Failed to watch {:?}: {}", root, e);
            }
        }
        self.backend = Box::new(poll);
        self.first_error = None;
        info!("Switched to polling mode");
    }
}
