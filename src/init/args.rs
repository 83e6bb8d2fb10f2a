// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use std::path::PathBuf;

use crate::ingest::input::WatchDescriptor;
use crate::ingest::watcher::WatchMode;

/// Watch mode for file system monitoring
#[derive(Copy, Clone, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum WatchModeArg {
    /// Native notifications first, polling as a fallback
    #[default]
    Auto,
    /// Force native file system watching (inotify/kqueue/FSEvents)
    Native,
    /// Force polling mode (use for NFS or when native watching is unreliable)
    Poll,
}

impl From<WatchModeArg> for WatchMode {
    fn from(w: WatchModeArg) -> Self {
        match w {
            WatchModeArg::Auto => WatchMode::Auto,
            WatchModeArg::Native => WatchMode::Native,
            WatchModeArg::Poll => WatchMode::Poll,
        }
    }
}

/// Options shared by every subcommand that opens the store.
///
/// Unset options fall back to the config file, then to built-in defaults.
#[derive(Debug, Args, Clone, Default)]
pub struct IngestArgs {
    /// Path to a TOML config file
    #[arg(long, env = "INGESTD_CONFIG")]
    pub config: Option<PathBuf>,

    /// State directory containing logs/ and agents/ (default: ~/.ingestd)
    #[arg(long, env = "INGESTD_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Event store path (default: <state-dir>/ingest/events.db)
    #[arg(long, env = "INGESTD_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Maximum number of events per insert transaction
    #[arg(long, env = "INGESTD_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Maximum bytes read from a single file in one pass
    #[arg(long, env = "INGESTD_MAX_READ_BYTES")]
    pub max_read_bytes: Option<u64>,

    /// Quiet period in milliseconds before changed files are processed
    #[arg(long, env = "INGESTD_DEBOUNCE_MS")]
    pub debounce_ms: Option<u64>,

    /// Milliseconds a file's size must stay unchanged before it is reported
    #[arg(long, env = "INGESTD_STABILITY_MS")]
    pub stability_ms: Option<u64>,

    /// Poll interval in milliseconds for settle checks and the poll backend
    #[arg(long, env = "INGESTD_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Watch mode: auto, native, poll
    #[arg(value_enum, long, env = "INGESTD_WATCH_MODE")]
    pub watch_mode: Option<WatchModeArg>,

    /// Watch descriptor as <pattern>=<source_type>; repeat to add more.
    /// Replaces the default layout when given.
    #[arg(long = "watch", env = "INGESTD_WATCH", value_delimiter = ',')]
    pub watch: Vec<WatchDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::event::SourceType;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        args: IngestArgs,
    }

    #[test]
    fn test_parse_watch_descriptors() {
        let cli = TestCli::try_parse_from([
            "ingestd",
            "--watch",
            "/var/log/app/*.log=system_log",
            "--watch",
            "/tmp/trace.jsonl=cache_trace",
            "--watch-mode",
            "poll",
        ])
        .unwrap();

        assert_eq!(cli.args.watch.len(), 2);
        assert_eq!(cli.args.watch[1].source_type, SourceType::CacheTrace);
        assert_eq!(cli.args.watch_mode, Some(WatchModeArg::Poll));
    }

    #[test]
    fn test_invalid_watch_descriptor() {
        assert!(TestCli::try_parse_from(["ingestd", "--watch", "/var/log/*.log"]).is_err());
        assert!(TestCli::try_parse_from(["ingestd", "--watch", "/x=metrics"]).is_err());
    }
}
