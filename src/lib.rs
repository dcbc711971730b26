//! Panel Backup Library
//!
//! Incremental backup of panel-managed server instances to a remote content
//! store, with a local manifest cache for change detection and a bounded
//! worker pipeline for parallel uploads.

pub mod config;
pub mod coordinator;
pub mod detect;
pub mod executor;
pub mod fs;
pub mod panel;
pub mod shutdown;
pub mod uploader;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
