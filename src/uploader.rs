//! Remote upload transport.
//!
//! The actual transfer is delegated to an external command-line client (a
//! cloud-drive CLI on the backup host). The pipeline only consumes the
//! [`Uploader`] capability, so tests substitute their own implementations.

use crate::utils::errors::{BackupError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Upload capability consumed by the pipeline workers.
///
/// `Ok(false)` means the transport ran but did not accept the file; `Err`
/// means the transport itself could not be invoked. Both leave the manifest
/// cache untouched for that file.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<bool>;
}

/// Uploader backed by an external transfer CLI, invoked per file as
/// `<program> upload <local> <remote_dir>`. The call is fully synchronous
/// from the worker's point of view; a hung transport stalls that worker.
pub struct CommandUploader {
    program: PathBuf,
}

impl CommandUploader {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

#[async_trait]
impl Uploader for CommandUploader {
    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<bool> {
        debug!("Uploading {} -> {}", local.display(), remote_dir);

        let output = Command::new(&self.program)
            .arg("upload")
            .arg(local)
            .arg(remote_dir)
            .output()
            .await
            .map_err(|err| {
                BackupError::Upload(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    err
                ))
            })?;

        if !output.status.success() {
            debug!(
                "Transfer CLI exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let uploader = CommandUploader::new(PathBuf::from("/bin/true"));
        let uploaded = uploader
            .upload(Path::new("/tmp/file"), "/remote/dir")
            .await
            .unwrap();
        assert!(uploaded);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_refusal() {
        let uploader = CommandUploader::new(PathBuf::from("/bin/false"));
        let uploaded = uploader
            .upload(Path::new("/tmp/file"), "/remote/dir")
            .await
            .unwrap();
        assert!(!uploaded);
    }

    #[tokio::test]
    async fn test_missing_program_is_transport_error() {
        let uploader = CommandUploader::new(PathBuf::from("/no/such/program"));
        let result = uploader.upload(Path::new("/tmp/file"), "/remote/dir").await;
        assert!(matches!(result, Err(BackupError::Upload(_))));
    }
}
