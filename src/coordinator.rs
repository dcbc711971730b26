//! Per-instance backup lifecycle.
//!
//! Instances are processed strictly sequentially. Each run brackets the
//! upload pipeline with autosave pause/resume on the panel, and persists the
//! manifest cache whatever the pipeline outcome — the cache save is the
//! designated save point of a run.

use crate::config::BackupConfig;
use crate::executor::manifest::ManifestCache;
use crate::executor::{PipelineOptions, UploadPipeline};
use crate::fs::exclude::ExclusionMatcher;
use crate::panel::{ControlPlane, InstanceDescriptor};
use crate::uploader::Uploader;
use crate::utils::errors::BackupError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Coordinator {
    panel: Arc<dyn ControlPlane>,
    uploader: Arc<dyn Uploader>,
    matcher: Arc<ExclusionMatcher>,
    backup: BackupConfig,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        panel: Arc<dyn ControlPlane>,
        uploader: Arc<dyn Uploader>,
        matcher: Arc<ExclusionMatcher>,
        backup: BackupConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            panel,
            uploader,
            matcher,
            backup,
            cancel,
        }
    }

    /// Back up every registered instance under the given label. No instance's
    /// failure propagates to the others.
    pub async fn run(&self, label: &str, instances: &BTreeMap<String, String>) {
        for (name, remote_id) in instances {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, skipping remaining instances");
                break;
            }

            let instance = InstanceDescriptor {
                name: name.clone(),
                remote_id: remote_id.clone(),
            };

            info!("Starting backup of instance {} (label: {})", name, label);
            self.backup_instance(&instance, label).await;
            info!("Finished backup of instance {}", name);
        }
    }

    /// One instance's backup, following the fixed lifecycle order: resolve
    /// the working directory, pause live writes, load the cache, run the
    /// pipeline, persist the cache, restore live writes.
    pub async fn backup_instance(&self, instance: &InstanceDescriptor, label: &str) {
        let root = match self.panel.working_directory(instance).await {
            Ok(root) => root,
            Err(err) => {
                error!(
                    "Cannot resolve working directory of {}: {}; skipping instance",
                    instance.name, err
                );
                return;
            }
        };
        info!("Instance {} working directory: {}", instance.name, root.display());

        if !self.pause_writes_if_running(instance).await {
            return;
        }

        let mut cache = match ManifestCache::load(&root, label) {
            Ok(cache) => cache,
            Err(BackupError::CorruptCache { path, source }) if self.backup.reset_corrupt_cache => {
                warn!(
                    "Manifest cache {} is corrupt ({}); starting from an empty cache",
                    path.display(),
                    source
                );
                ManifestCache::empty(&root, label)
            }
            Err(err) => {
                error!(
                    "Cannot load manifest cache for {}: {}; skipping instance",
                    instance.name, err
                );
                self.restore_writes(instance).await;
                return;
            }
        };

        let pipeline = UploadPipeline::new(
            Arc::clone(&self.uploader),
            PipelineOptions {
                workers: self.backup.upload_workers,
                queue_capacity: self.backup.queue_capacity,
            },
            self.cancel.clone(),
        );
        let summary = pipeline
            .run(
                &root,
                &instance.name,
                label,
                &self.backup.target_root,
                Arc::clone(&self.matcher),
                &mut cache,
            )
            .await;

        // Save point: runs whatever the pipeline outcome was, including
        // cancellation, so successful uploads are never re-done.
        if let Err(err) = cache.save() {
            error!(
                "Cannot persist manifest cache for {}: {}",
                instance.name, err
            );
        }

        self.restore_writes(instance).await;

        if summary.cancelled {
            warn!(
                "Backup of {} cancelled: {} of {} queued files uploaded",
                instance.name, summary.uploaded, summary.queued
            );
        } else {
            info!(
                "Backup of {} done: {} examined, {} queued, {} uploaded, {} failed",
                instance.name, summary.examined, summary.queued, summary.uploaded, summary.failed
            );
        }
    }

    /// Pre-hook: pause autosave on a running instance. Returns false when
    /// the backup must not proceed — a live tree we failed to quiesce.
    async fn pause_writes_if_running(&self, instance: &InstanceDescriptor) -> bool {
        let status = match self.panel.status(instance).await {
            Ok(status) => status,
            Err(err) => {
                warn!(
                    "Cannot query status of {}: {}; assuming it is not running",
                    instance.name, err
                );
                return true;
            }
        };
        info!("Instance {} status: {:?}", instance.name, status);

        if !status.should_pause_writes() {
            return true;
        }

        match self.panel.pause_writes(instance).await {
            Ok(()) => {
                info!("Autosave paused on {}", instance.name);
                true
            }
            Err(err) => {
                warn!(
                    "Cannot pause autosave on {}: {}; not backing up a live tree",
                    instance.name, err
                );
                false
            }
        }
    }

    /// Post-hook: resume autosave if the instance is (still) running. Best
    /// effort; failures are logged, never escalated.
    async fn restore_writes(&self, instance: &InstanceDescriptor) {
        let status = match self.panel.status(instance).await {
            Ok(status) => status,
            Err(err) => {
                warn!(
                    "Cannot query status of {} after backup: {}; autosave may need a manual resume",
                    instance.name, err
                );
                return;
            }
        };

        if !status.should_pause_writes() {
            return;
        }

        match self.panel.resume_writes(instance).await {
            Ok(()) => info!("Autosave resumed on {}", instance.name),
            Err(err) => warn!(
                "Cannot resume autosave on {}: {}; a manual resume may be needed",
                instance.name, err
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::InstanceStatus;
    use crate::utils::errors::Result;
    use async_trait::async_trait;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct StubPanel {
        root: PathBuf,
        status: InstanceStatus,
        fail_working_directory: bool,
        fail_status: bool,
        fail_pause: bool,
        pause_calls: AtomicUsize,
        resume_calls: AtomicUsize,
    }

    impl StubPanel {
        fn new(root: &Path, status: InstanceStatus) -> Self {
            Self {
                root: root.to_path_buf(),
                status,
                fail_working_directory: false,
                fail_status: false,
                fail_pause: false,
                pause_calls: AtomicUsize::new(0),
                resume_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ControlPlane for StubPanel {
        async fn status(&self, _instance: &InstanceDescriptor) -> Result<InstanceStatus> {
            if self.fail_status {
                return Err(BackupError::Protocol("status unavailable".to_string()));
            }
            Ok(self.status)
        }

        async fn working_directory(&self, _instance: &InstanceDescriptor) -> Result<PathBuf> {
            if self.fail_working_directory {
                return Err(BackupError::Protocol("no such instance".to_string()));
            }
            Ok(self.root.clone())
        }

        async fn pause_writes(&self, _instance: &InstanceDescriptor) -> Result<()> {
            if self.fail_pause {
                return Err(BackupError::Protocol("command refused".to_string()));
            }
            self.pause_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn resume_writes(&self, _instance: &InstanceDescriptor) -> Result<()> {
            self.resume_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingUploader {
        uploads: StdMutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Uploader for CountingUploader {
        async fn upload(&self, local: &Path, _remote_dir: &str) -> Result<bool> {
            self.uploads.lock().unwrap().push(local.to_path_buf());
            Ok(true)
        }
    }

    fn backup_config() -> BackupConfig {
        BackupConfig {
            target_root: "/apps/backups".to_string(),
            upload_workers: 2,
            queue_capacity: 100,
            exclusions: vec![],
            reset_corrupt_cache: true,
        }
    }

    fn coordinator(
        panel: Arc<StubPanel>,
        uploader: Arc<CountingUploader>,
        cancel: CancellationToken,
    ) -> Coordinator {
        Coordinator::new(
            panel,
            uploader,
            Arc::new(ExclusionMatcher::new(&[]).unwrap()),
            backup_config(),
            cancel,
        )
    }

    fn instance() -> InstanceDescriptor {
        InstanceDescriptor {
            name: "survival".to_string(),
            remote_id: "uuid-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_running_instance_is_paused_backed_up_resumed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("level.dat"), b"world").unwrap();

        let panel = Arc::new(StubPanel::new(temp_dir.path(), InstanceStatus::Running));
        let uploader = Arc::new(CountingUploader::default());
        let coordinator = coordinator(
            Arc::clone(&panel),
            Arc::clone(&uploader),
            CancellationToken::new(),
        );

        coordinator.backup_instance(&instance(), "daily").await;

        assert_eq!(panel.pause_calls.load(Ordering::SeqCst), 1);
        assert_eq!(panel.resume_calls.load(Ordering::SeqCst), 1);
        assert_eq!(uploader.uploads.lock().unwrap().len(), 1);

        let cache = ManifestCache::load(temp_dir.path(), "daily").unwrap();
        assert!(cache.get("level.dat").is_some());
    }

    #[tokio::test]
    async fn test_stopped_instance_skips_hooks() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("level.dat"), b"world").unwrap();

        let panel = Arc::new(StubPanel::new(temp_dir.path(), InstanceStatus::Stopped));
        let uploader = Arc::new(CountingUploader::default());
        let coordinator = coordinator(
            Arc::clone(&panel),
            Arc::clone(&uploader),
            CancellationToken::new(),
        );

        coordinator.backup_instance(&instance(), "daily").await;

        assert_eq!(panel.pause_calls.load(Ordering::SeqCst), 0);
        assert_eq!(panel.resume_calls.load(Ordering::SeqCst), 0);
        assert_eq!(uploader.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pause_failure_aborts_instance() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("level.dat"), b"world").unwrap();

        let mut panel = StubPanel::new(temp_dir.path(), InstanceStatus::Running);
        panel.fail_pause = true;
        let panel = Arc::new(panel);
        let uploader = Arc::new(CountingUploader::default());
        let coordinator = coordinator(
            Arc::clone(&panel),
            Arc::clone(&uploader),
            CancellationToken::new(),
        );

        coordinator.backup_instance(&instance(), "daily").await;

        assert!(uploader.uploads.lock().unwrap().is_empty());
        assert!(!temp_dir
            .path()
            .join(ManifestCache::file_name("daily"))
            .exists());
    }

    #[tokio::test]
    async fn test_working_directory_failure_skips_instance() {
        let temp_dir = TempDir::new().unwrap();

        let mut panel = StubPanel::new(temp_dir.path(), InstanceStatus::Running);
        panel.fail_working_directory = true;
        let panel = Arc::new(panel);
        let uploader = Arc::new(CountingUploader::default());
        let coordinator = coordinator(
            Arc::clone(&panel),
            Arc::clone(&uploader),
            CancellationToken::new(),
        );

        coordinator.backup_instance(&instance(), "daily").await;

        assert_eq!(panel.pause_calls.load(Ordering::SeqCst), 0);
        assert!(uploader.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_failure_assumes_not_running() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("level.dat"), b"world").unwrap();

        let mut panel = StubPanel::new(temp_dir.path(), InstanceStatus::Running);
        panel.fail_status = true;
        let panel = Arc::new(panel);
        let uploader = Arc::new(CountingUploader::default());
        let coordinator = coordinator(
            Arc::clone(&panel),
            Arc::clone(&uploader),
            CancellationToken::new(),
        );

        coordinator.backup_instance(&instance(), "daily").await;

        // Proceeds without pausing; the backup itself still happens.
        assert_eq!(panel.pause_calls.load(Ordering::SeqCst), 0);
        assert_eq!(panel.resume_calls.load(Ordering::SeqCst), 0);
        assert_eq!(uploader.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_still_saves_cache_and_resumes() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("level.dat"), b"world").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let panel = Arc::new(StubPanel::new(temp_dir.path(), InstanceStatus::Running));
        let uploader = Arc::new(CountingUploader::default());
        let coordinator = coordinator(Arc::clone(&panel), Arc::clone(&uploader), cancel);

        coordinator.backup_instance(&instance(), "daily").await;

        assert!(uploader.uploads.lock().unwrap().is_empty());
        // Exactly one persisted save and one resume attempt.
        assert!(temp_dir
            .path()
            .join(ManifestCache::file_name("daily"))
            .exists());
        assert_eq!(panel.resume_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupt_cache_reset_policy() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("level.dat"), b"world").unwrap();
        fs::write(
            temp_dir.path().join(ManifestCache::file_name("daily")),
            b"garbage",
        )
        .unwrap();

        let panel = Arc::new(StubPanel::new(temp_dir.path(), InstanceStatus::Stopped));
        let uploader = Arc::new(CountingUploader::default());
        let coordinator = coordinator(
            Arc::clone(&panel),
            Arc::clone(&uploader),
            CancellationToken::new(),
        );

        coordinator.backup_instance(&instance(), "daily").await;

        // Full re-backup from an empty cache, then a valid manifest on disk.
        assert_eq!(uploader.uploads.lock().unwrap().len(), 1);
        let cache = ManifestCache::load(temp_dir.path(), "daily").unwrap();
        assert!(cache.get("level.dat").is_some());
    }

    #[tokio::test]
    async fn test_corrupt_cache_without_reset_skips_instance() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("level.dat"), b"world").unwrap();
        fs::write(
            temp_dir.path().join(ManifestCache::file_name("daily")),
            b"garbage",
        )
        .unwrap();

        let panel = Arc::new(StubPanel::new(temp_dir.path(), InstanceStatus::Running));
        let uploader = Arc::new(CountingUploader::default());
        let mut backup = backup_config();
        backup.reset_corrupt_cache = false;
        let coordinator = Coordinator::new(
            Arc::clone(&panel) as Arc<dyn ControlPlane>,
            Arc::clone(&uploader) as Arc<dyn Uploader>,
            Arc::new(ExclusionMatcher::new(&[]).unwrap()),
            backup,
            CancellationToken::new(),
        );

        coordinator.backup_instance(&instance(), "daily").await;

        // Aborted after the pause: nothing uploaded, but autosave restored.
        assert!(uploader.uploads.lock().unwrap().is_empty());
        assert_eq!(panel.resume_calls.load(Ordering::SeqCst), 1);
    }
}
