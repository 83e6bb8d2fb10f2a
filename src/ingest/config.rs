// SPDX-License-Identifier: Apache-2.0

//! Configuration for the ingestor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::error::{Error, Result};
use crate::ingest::event::SourceType;
use crate::ingest::input::{DEFAULT_MAX_READ_BYTES, WatchDescriptor, compile_all};
use crate::ingest::watcher::{WatchMode, WatcherConfig};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_millis(500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Location of the store below the state directory
const DEFAULT_DB_RELATIVE: &str = "ingest/events.db";

#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Root under which logs, transcripts and the store live
    pub state_dir: PathBuf,
    /// Store location; `<state_dir>/ingest/events.db` when unset
    pub db_path: Option<PathBuf>,
    /// Events per insert transaction
    pub batch_size: usize,
    /// Upper bound on bytes read from one file in one pass
    pub max_read_bytes: u64,
    /// Quiet period between the first notification and a processing pass
    pub debounce: Duration,
    /// How long a file must stop growing before the watcher reports it
    pub stability_window: Duration,
    pub poll_interval: Duration,
    pub watch_mode: WatchMode,
    /// Replaces the default descriptors when non-empty
    pub watch: Vec<WatchDescriptor>,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::new(),
            db_path: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            debounce: DEFAULT_DEBOUNCE,
            stability_window: DEFAULT_STABILITY_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch_mode: WatchMode::Auto,
            watch: Vec::new(),
        }
    }
}

impl IngestorConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Default::default()
        }
    }

    /// Resolve the state directory, an explicit store path and relative watch
    /// patterns against the working directory. Watchers report absolute paths
    /// and cursors are keyed by them.
    pub fn into_absolute(mut self) -> Result<Self> {
        if !self.state_dir.as_os_str().is_empty() {
            self.state_dir = std::path::absolute(&self.state_dir)?;
        }
        if let Some(db_path) = self.db_path.take() {
            self.db_path = Some(std::path::absolute(db_path)?);
        }
        for descriptor in &mut self.watch {
            let pattern = Path::new(&descriptor.pattern);
            if !descriptor.pattern.is_empty() && pattern.is_relative() {
                descriptor.pattern = std::path::absolute(pattern)?
                    .to_string_lossy()
                    .into_owned();
            }
        }
        Ok(self)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join(DEFAULT_DB_RELATIVE))
    }

    /// The effective descriptors, in match-priority order
    pub fn descriptors(&self) -> Vec<WatchDescriptor> {
        if self.watch.is_empty() {
            default_descriptors(&self.state_dir)
        } else {
            self.watch.clone()
        }
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            mode: self.watch_mode,
            poll_interval: self.poll_interval,
            stability_threshold: self.stability_window,
            emit_existing: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(Error::Config("state directory must be specified".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be greater than zero".to_string()));
        }
        if self.max_read_bytes == 0 {
            return Err(Error::Config(
                "max read bytes must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        compile_all(&self.descriptors())?;
        Ok(())
    }
}

/// The standard layout below a state directory. The cache-trace file is
/// listed before the catch-all log patterns so it keeps its own type.
pub fn default_descriptors(state_dir: &Path) -> Vec<WatchDescriptor> {
    let root = state_dir.display();
    vec![
        WatchDescriptor::new(
            format!("{}/logs/cache-trace.jsonl", root),
            SourceType::CacheTrace,
        ),
        WatchDescriptor::new(format!("{}/logs/**/*.log", root), SourceType::SystemLog),
        WatchDescriptor::new(format!("{}/logs/**/*.jsonl", root), SourceType::SystemLog),
        WatchDescriptor::new(
            format!("{}/agents/*/sessions/*.jsonl", root),
            SourceType::Session,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::input::classify;

    #[test]
    fn test_defaults() {
        let config = IngestorConfig::new("/home/u/.state");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_read_bytes, 10 * 1024 * 1024);
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.stability_window, Duration::from_millis(500));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.db_path(), PathBuf::from("/home/u/.state/ingest/events.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_descriptors_classify() {
        let compiled = compile_all(&default_descriptors(Path::new("/s"))).unwrap();
        let cases = [
            ("/s/logs/cache-trace.jsonl", Some(SourceType::CacheTrace)),
            ("/s/logs/gateway.log", Some(SourceType::SystemLog)),
            ("/s/logs/2024/01/gateway.jsonl", Some(SourceType::SystemLog)),
            ("/s/agents/main/sessions/abc.jsonl", Some(SourceType::Session)),
            ("/s/agents/main/sessions/abc.json", None),
            ("/s/ingest/events.db", None),
        ];
        for (path, expected) in cases {
            assert_eq!(classify(&compiled, Path::new(path)), expected, "{}", path);
        }
    }

    #[test]
    fn test_watch_override_replaces_defaults() {
        let mut config = IngestorConfig::new("/s");
        config.watch = vec![WatchDescriptor::new("/var/log/*.log", SourceType::SystemLog)];
        assert_eq!(config.descriptors().len(), 1);
    }

    #[test]
    fn test_into_absolute_resolves_relative_settings() {
        let cwd = std::env::current_dir().unwrap();
        let mut config = IngestorConfig::new("state");
        config.db_path = Some(PathBuf::from("db/events.db"));
        config.watch = vec![
            WatchDescriptor::new("logs/*.log", SourceType::SystemLog),
            WatchDescriptor::new("/var/log/*.log", SourceType::SystemLog),
        ];

        let config = config.into_absolute().unwrap();
        assert_eq!(config.state_dir, cwd.join("state"));
        assert_eq!(config.db_path(), cwd.join("db/events.db"));
        assert_eq!(
            config.watch[0].pattern,
            cwd.join("logs/*.log").to_string_lossy()
        );
        assert_eq!(config.watch[1].pattern, "/var/log/*.log");
    }

    #[test]
    fn test_default_descriptors_follow_absolute_state_dir() {
        let config = IngestorConfig::new("./state").into_absolute().unwrap();
        let cwd = std::env::current_dir().unwrap();

        assert_eq!(config.db_path(), cwd.join("state/ingest/events.db"));
        for descriptor in config.descriptors() {
            assert!(Path::new(&descriptor.pattern).is_absolute());
        }
        let compiled = compile_all(&config.descriptors()).unwrap();
        assert_eq!(
            classify(&compiled, &cwd.join("state/logs/gateway.log")),
            Some(SourceType::SystemLog)
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            IngestorConfig::default().validate(),
            Err(Error::Config(_))
        ));

        let mut config = IngestorConfig::new("/s");
        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = IngestorConfig::new("/s");
        config.watch = vec![WatchDescriptor::new("/s/[bad", SourceType::Session)];
        assert!(matches!(config.validate(), Err(Error::InvalidPattern(_))));
    }
}
