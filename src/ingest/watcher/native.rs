// SPDX-License-Identifier: Apache-2.0

//! OS notification backend (inotify, FSEvents, ReadDirectoryChangesW) via `notify`.

use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, channel};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

use super::traits::{FileEvent, FileEventKind, FileWatcher, WatcherError};

pub struct NativeWatcher {
    watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
}

impl NativeWatcher {
    pub fn new() -> Result<Self, WatcherError> {
        let (tx, rx) = channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            watcher,
            receiver: rx,
        })
    }

    fn convert_event(event: Event) -> Option<FileEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Create,
            EventKind::Modify(_) => FileEventKind::Modify,
            EventKind::Remove(_) => FileEventKind::Remove,
            EventKind::Access(_) => return None,
            EventKind::Other | EventKind::Any => FileEventKind::Other,
        };

        if event.paths.is_empty() {
            return None;
        }
        Some(FileEvent::new(kind, event.paths))
    }

    fn push(events: &mut Vec<FileEvent>, res: notify::Result<Event>) {
        match res {
            Ok(event) => events.extend(Self::convert_event(event)),
            // Backend errors are reported and monitoring continues
            Err(e) => warn!("File watcher error: {}", e),
        }
    }
}

impl FileWatcher for NativeWatcher {
    fn watch(&mut self, path: &Path, recursive: bool) -> Result<(), WatcherError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watcher
            .watch(path, mode)
            .map_err(|e| WatcherError::Watch(format!("{}: {}", path.display(), e)))
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError> {
        let mut events = Vec::new();

        match self.receiver.recv_timeout(timeout) {
            Ok(res) => Self::push(&mut events, res),
            Err(RecvTimeoutError::Timeout) => return Ok(events),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(WatcherError::Channel("watcher channel disconnected".into()));
            }
        }

        // Drain whatever else is already queued
        loop {
            match self.receiver.try_recv() {
                Ok(res) => Self::push(&mut events, res),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(WatcherError::Channel("watcher channel disconnected".into()));
                }
            }
        }

        Ok(events)
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}
