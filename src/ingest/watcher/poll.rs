// SPDX-License-Identifier: Apache-2.0

//! Polling backend for file systems where native notifications are
//! unavailable or unreliable (NFS, some container mounts).

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tracing::debug;

use super::traits::{FileEvent, FileWatcher, WatcherError};

#[derive(Debug, Clone, PartialEq)]
struct FileState {
    modified: Option<SystemTime>,
    size: u64,
}

impl FileState {
    fn from_metadata(metadata: &fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            size: metadata.len(),
        }
    }
}

/// Periodically rescans watched directories and diffs file size and mtime.
pub struct PollWatcher {
    /// Watched directories and whether each is scanned recursively
    watched: Vec<(PathBuf, bool)>,
    file_states: HashMap<PathBuf, FileState>,
    poll_interval: Duration,
    last_poll: Instant,
}

impl PollWatcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            watched: Vec::new(),
            file_states: HashMap::new(),
            poll_interval,
            last_poll: Instant::now(),
        }
    }

    /// Rescan everything and return the differences since the last scan
    fn scan_all(&mut self) -> Vec<FileEvent> {
        let mut events = Vec::new();
        let mut seen = HashSet::with_capacity(self.file_states.len());

        for (dir, recursive) in self.watched.clone() {
            self.scan_directory(&dir, recursive, &mut seen, &mut events);
        }

        self.file_states.retain(|path, _| {
            if seen.contains(path) {
                true
            } else {
                events.push(FileEvent::remove(path.clone()));
                false
            }
        });

        self.last_poll = Instant::now();
        events
    }

    fn scan_directory(
        &mut self,
        dir: &Path,
        recursive: bool,
        seen: &mut HashSet<PathBuf>,
        events: &mut Vec<FileEvent>,
    ) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Error scanning directory {:?}: {}", dir, e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                continue;
            };

            if metadata.is_dir() {
                if recursive {
                    self.scan_directory(&path, true, seen, events);
                }
                continue;
            }
            if !metadata.is_file() || !seen.insert(path.clone()) {
                continue;
            }

            let state = FileState::from_metadata(&metadata);
            match self.file_states.entry(path) {
                Entry::Vacant(entry) => {
                    events.push(FileEvent::create(entry.key().clone()));
                    entry.insert(state);
                }
                Entry::Occupied(mut entry) => {
                    if *entry.get() != state {
                        events.push(FileEvent::modify(entry.key().clone()));
                        entry.insert(state);
                    }
                }
            }
        }
    }
}

impl FileWatcher for PollWatcher {
    fn watch(&mut self, path: &Path, recursive: bool) -> Result<(), WatcherError> {
        if !fs::metadata(path)?.is_dir() {
            return Err(WatcherError::Watch(format!(
                "{}: not a directory",
                path.display()
            )));
        }

        match self.watched.iter_mut().find(|(p, _)| p == path) {
            Some(existing) => existing.1 |= recursive,
            None => self.watched.push((path.to_path_buf(), recursive)),
        }

        // Baseline scan: files already present are not reported as created
        let _ = self.scan_all();
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.last_poll.elapsed() >= self.poll_interval {
                let events = self.scan_all();
                if !events.is_empty() {
                    return Ok(events);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            let to_next_poll = self.poll_interval.saturating_sub(self.last_poll.elapsed());
            let sleep = to_next_poll.min(deadline.saturating_duration_since(now));
            if !sleep.is_zero() {
                std::thread::sleep(sleep);
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}
