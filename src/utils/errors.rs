//! Custom error types for the backup tool.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Control plane request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected control plane response: {0}")]
    Protocol(String),

    #[error("Unknown instance status code: {0}")]
    Status(i32),

    #[error("Manifest cache {} is corrupt: {source}", .path.display())]
    CorruptCache {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upload transport error: {0}")]
    Upload(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;
