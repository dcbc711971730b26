//! Configuration for the backup tool, loaded from a TOML file.

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub panel: PanelConfig,
    pub backup: BackupConfig,
    pub upload: UploadConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// Instance registry: name -> panel uuid. A BTreeMap keeps the backup
    /// order stable across runs.
    pub instances: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Panel base URL
    pub url: String,

    /// API key passed as a query parameter
    pub api_key: String,

    /// Daemon id the instances are registered under
    pub daemon_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Remote directory under which all backups are placed
    pub target_root: String,

    /// Number of concurrent upload workers
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,

    /// Capacity of the producer-to-worker path queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Exclusion patterns, matched from the start of the relative path
    #[serde(default)]
    pub exclusions: Vec<String>,

    /// Treat an unparsable manifest cache as empty (full re-backup) instead
    /// of skipping the instance
    #[serde(default = "default_reset_corrupt_cache")]
    pub reset_corrupt_cache: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// External transfer CLI, invoked as `<program> upload <local> <remote>`
    pub program: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_upload_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

fn default_reset_corrupt_cache() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            BackupError::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        toml::from_str(&content).map_err(|err| {
            BackupError::Config(format!("cannot parse {}: {}", path.display(), err))
        })
    }
}
