// SPDX-License-Identifier: Apache-2.0

//! Resolution of the ingestor configuration.
//!
//! Precedence, highest first: command line flags and their `INGESTD_*`
//! environment variables, the TOML config file, built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

use crate::ingest::config::IngestorConfig;
use crate::ingest::error::{Error, Result};
use crate::ingest::input::WatchDescriptor;
use crate::ingest::watcher::WatchMode;
use crate::init::args::IngestArgs;

const ENV_PREFIX: &str = "INGESTD_";

/// Directory name used under `$HOME` when no state directory is given
const DEFAULT_STATE_DIR_NAME: &str = ".ingestd";

/// Settings accepted from the config file and environment
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub state_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub max_read_bytes: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub stability_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub watch_mode: Option<WatchMode>,
    /// `[[watch]]` tables with `pattern` and `source_type`
    pub watch: Vec<WatchDescriptor>,
}

/// Read the optional TOML file, overlaid with `INGESTD_*` variables.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    // Descriptor lists only come from the file or the --watch flag
    figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["watch", "config", "log_format"]));

    figment
        .extract()
        .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
}

/// Build the ingestor config from parsed arguments and the config file.
pub fn build_config(args: &IngestArgs) -> Result<IngestorConfig> {
    let file = load_file_config(args.config.as_deref())?;
    let config = merge(args, file, default_state_dir()).into_absolute()?;
    config.validate()?;
    Ok(config)
}

fn merge(args: &IngestArgs, file: FileConfig, fallback_state_dir: Option<PathBuf>) -> IngestorConfig {
    let mut config = IngestorConfig::default();

    if let Some(dir) = args.state_dir.clone().or(file.state_dir).or(fallback_state_dir) {
        config.state_dir = dir;
    }
    config.db_path = args.db_path.clone().or(file.db_path);
    if let Some(n) = args.batch_size.or(file.batch_size) {
        config.batch_size = n;
    }
    if let Some(n) = args.max_read_bytes.or(file.max_read_bytes) {
        config.max_read_bytes = n;
    }
    if let Some(ms) = args.debounce_ms.or(file.debounce_ms) {
        config.debounce = Duration::from_millis(ms);
    }
    if let Some(ms) = args.stability_ms.or(file.stability_ms) {
        config.stability_window = Duration::from_millis(ms);
    }
    if let Some(ms) = args.poll_interval_ms.or(file.poll_interval_ms) {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(mode) = args.watch_mode.map(WatchMode::from).or(file.watch_mode) {
        config.watch_mode = mode;
    }
    config.watch = if args.watch.is_empty() {
        file.watch
    } else {
        args.watch.clone()
    };

    config
}

fn default_state_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_STATE_DIR_NAME))
}
