// SPDX-License-Identifier: Apache-2.0

//! Write-burst settling.
//!
//! A changed file is held back until its size has stopped moving for the
//! stability window, so readers see whole bursts instead of every append.
//! Removals are reported straight away.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::WatchEventKind;

#[derive(Debug, Clone, Copy)]
struct Pending {
    size: u64,
    changed_at: Instant,
    kind: WatchEventKind,
}

#[derive(Debug)]
pub struct SettleTracker {
    stability: Duration,
    pending: HashMap<PathBuf, Pending>,
    /// Paths already reported (or present at startup); later changes are `Change`
    known: HashSet<PathBuf>,
}

impl SettleTracker {
    pub fn new(stability: Duration) -> Self {
        Self {
            stability,
            pending: HashMap::new(),
            known: HashSet::new(),
        }
    }

    /// Treat `path` as already seen
    pub fn mark_known(&mut self, path: PathBuf) {
        self.known.insert(path);
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Record activity on `path`. Returns `Some(Unlink)` when the path is
    /// gone and had been seen before; other changes wait for [`tick`].
    ///
    /// [`tick`]: SettleTracker::tick
    pub fn observe(&mut self, path: &Path, now: Instant) -> Option<WatchEventKind> {
        match file_size(path) {
            Ok(Some(size)) => {
                if !self.pending.contains_key(path) {
                    let kind = if self.known.contains(path) {
                        WatchEventKind::Change
                    } else {
                        WatchEventKind::Add
                    };
                    self.pending.insert(
                        path.to_path_buf(),
                        Pending {
                            size,
                            changed_at: now,
                            kind,
                        },
                    );
                }
                None
            }
            // Directories and other non-files are not tracked
            Ok(None) => None,
            Err(_) => self.forget(path),
        }
    }

    /// Re-check every pending path and return the ones that have settled.
    pub fn tick(&mut self, now: Instant) -> Vec<(PathBuf, WatchEventKind)> {
        let mut ready = Vec::new();
        let mut gone = Vec::new();

        for (path, pending) in self.pending.iter_mut() {
            match file_size(path) {
                Ok(Some(size)) if size != pending.size => {
                    pending.size = size;
                    pending.changed_at = now;
                }
                Ok(Some(_)) => {
                    if now.saturating_duration_since(pending.changed_at) >= self.stability {
                        ready.push((path.clone(), pending.kind));
                    }
                }
                Ok(None) | Err(_) => gone.push(path.clone()),
            }
        }

        for path in gone {
            if let Some(kind) = self.forget(&path) {
                ready.push((path, kind));
            }
        }
        for (path, kind) in &ready {
            if *kind != WatchEventKind::Unlink {
                self.pending.remove(path);
                self.known.insert(path.clone());
            }
        }

        ready.sort();
        ready
    }

    fn forget(&mut self, path: &Path) -> Option<WatchEventKind> {
        let was_pending = self.pending.remove(path).is_some();
        let was_known = self.known.remove(path);
        (was_known || was_pending).then_some(WatchEventKind::Unlink)
    }
}

/// `Ok(None)` for anything that is not a regular file
fn file_size(path: &Path) -> io::Result<Option<u64>> {
    let metadata = fs::metadata(path)?;
    Ok(metadata.is_file().then(|| metadata.len()))
}
