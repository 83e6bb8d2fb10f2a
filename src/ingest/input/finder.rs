// SPDX-License-Identifier: Apache-2.0

use glob::glob_with;
use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

use crate::ingest::error::{Error, Result};
use crate::ingest::event::SourceType;
use crate::ingest::input::pattern::{MATCH_OPTIONS, WatchDescriptor};

/// FileFinder resolves watch descriptors to the files currently on disk
#[derive(Debug, Clone)]
pub struct FileFinder {
    descriptors: Vec<WatchDescriptor>,
}

impl FileFinder {
    pub fn new(descriptors: Vec<WatchDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Find all regular files matching any descriptor, tagged with the source
    /// type of the first descriptor that matched. Each path appears once.
    pub fn find_files(&self) -> Result<Vec<(PathBuf, SourceType)>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for descriptor in &self.descriptors {
            let matches = glob_with(&descriptor.pattern, MATCH_OPTIONS)
                .map_err(|e| Error::InvalidPattern(format!("{}: {}", descriptor.pattern, e)))?;

            for entry in matches {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        // Unreadable directories are skipped, not fatal
                        debug!("Skipping unreadable path during discovery: {}", e);
                        continue;
                    }
                };

                if !path.is_file() {
                    continue;
                }

                if seen.insert(path.clone()) {
                    files.push((path, descriptor.source_type));
                }
            }
        }

        Ok(files)
    }
}
