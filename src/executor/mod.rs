//! Upload pipeline: bounded-concurrency producer/worker/aggregator stages.
//!
//! One producer enumerates changed files into a bounded queue, N workers
//! upload them through the transport capability, and the aggregator folds
//! successful uploads back into the manifest cache. Cancellation is
//! cooperative: in-flight uploads finish, no new uploads start, and the
//! caller always gets its cache back for persistence.

pub mod manifest;

use crate::detect;
use crate::fs::exclude::ExclusionMatcher;
use crate::fs::hasher;
use crate::fs::walker::{self, CandidatePath};
use crate::uploader::Uploader;
use manifest::ManifestCache;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long the producer sleeps between retries when the queue is full, so
/// it observes cancellation instead of blocking on a slow uploader forever.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Number of concurrent upload workers
    pub workers: usize,

    /// Capacity of the path queue between producer and workers; small, so a
    /// slow transport applies backpressure to enumeration
    pub queue_capacity: usize,
}

/// Counters for one instance's pipeline run.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    /// Files enumerated after exclusion filtering
    pub examined: usize,

    /// Files that needed upload and were queued
    pub queued: usize,

    /// Files uploaded and recorded in the manifest cache
    pub uploaded: usize,

    /// Files that failed to upload or to re-hash; absent from the cache, so
    /// the next scheduled run retries them
    pub failed: usize,

    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
}

/// Hand-off from the workers to the aggregator. Each worker sends exactly
/// one `WorkerDone` before exiting; the aggregator terminates once it has
/// received one per worker.
enum Completion {
    Uploaded(CandidatePath),
    WorkerDone,
}

pub struct UploadPipeline {
    uploader: Arc<dyn Uploader>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl UploadPipeline {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        options: PipelineOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            uploader,
            options,
            cancel,
        }
    }

    /// Run the pipeline over one instance's working directory.
    ///
    /// The cache is read through a start-of-run snapshot for change
    /// detection; the live mapping is mutated only here, by the aggregator
    /// loop, as workers report successful uploads.
    pub async fn run(
        &self,
        root: &Path,
        instance_name: &str,
        label: &str,
        target_root: &str,
        matcher: Arc<ExclusionMatcher>,
        cache: &mut ManifestCache,
    ) -> PipelineSummary {
        let workers = self.options.workers.max(1);
        let (work_tx, work_rx) = mpsc::channel::<CandidatePath>(self.options.queue_capacity.max(1));
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel::<Completion>();

        info!(
            "Starting upload pipeline for {} ({} workers, queue capacity {})",
            instance_name,
            workers,
            self.options.queue_capacity.max(1)
        );

        // Producer: walk + change detection on the blocking pool. Dropping
        // the sender on exit is the end-of-work signal seen by every worker.
        let snapshot = cache.snapshot();
        let producer_root = root.to_path_buf();
        let producer_cancel = self.cancel.clone();
        let producer = task::spawn_blocking(move || {
            let mut examined = 0usize;
            let mut queued = 0usize;

            for candidate in walker::walk(&producer_root, &matcher) {
                if producer_cancel.is_cancelled() {
                    info!("Enumeration cancelled after {} files", examined);
                    break;
                }
                examined += 1;

                if !detect::needs_upload(&producer_root, &candidate, &snapshot) {
                    debug!("Unchanged, skipping {}", candidate);
                    continue;
                }

                let mut pending = candidate;
                loop {
                    match work_tx.try_send(pending) {
                        Ok(()) => {
                            queued += 1;
                            break;
                        }
                        Err(TrySendError::Full(returned)) => {
                            if producer_cancel.is_cancelled() {
                                return (examined, queued);
                            }
                            pending = returned;
                            std::thread::sleep(QUEUE_POLL_INTERVAL);
                        }
                        // All workers are gone; nothing left to feed.
                        Err(TrySendError::Closed(_)) => return (examined, queued),
                    }
                }
            }

            (examined, queued)
        });

        let failed = Arc::new(AtomicUsize::new(0));
        for worker_id in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let completion_tx = completion_tx.clone();
            let uploader = Arc::clone(&self.uploader);
            let cancel = self.cancel.clone();
            let worker_root = root.to_path_buf();
            let failed = Arc::clone(&failed);
            let remote_base = format!(
                "{}/{}/{}",
                target_root.trim_end_matches('/'),
                label,
                instance_name
            );

            task::spawn(async move {
                loop {
                    let candidate = tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = async { work_rx.lock().await.recv().await } => match next {
                            Some(candidate) => candidate,
                            None => break,
                        },
                    };

                    let local = candidate.to_local(&worker_root);
                    let remote_dir = remote_directory(&remote_base, &candidate);
                    match uploader.upload(&local, &remote_dir).await {
                        Ok(true) => {
                            debug!("Worker {} uploaded {}", worker_id, candidate);
                            if completion_tx.send(Completion::Uploaded(candidate)).is_err() {
                                break;
                            }
                        }
                        Ok(false) => {
                            warn!("Upload rejected for {}; retrying next run", candidate);
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            warn!("Upload failed for {}: {}; retrying next run", candidate, err);
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }

                let _ = completion_tx.send(Completion::WorkerDone);
            });
        }
        drop(completion_tx);

        // Aggregator: the only writer of the live cache. Drains completions
        // already in flight even when cancelled, then stops once every
        // worker has signed off.
        let mut uploaded = 0usize;
        let mut finished_workers = 0usize;
        while finished_workers < workers {
            let Some(message) = completion_rx.recv().await else {
                break;
            };
            match message {
                Completion::Uploaded(candidate) => {
                    // Re-stat and re-hash: the file may have changed between
                    // enumeration and upload, and the cache must describe the
                    // state that was actually transmitted.
                    let local = candidate.to_local(root);
                    match task::spawn_blocking(move || hasher::identity(&local)).await {
                        Ok(Ok(identity)) => {
                            cache.record_success(&candidate, identity);
                            uploaded += 1;
                        }
                        Ok(Err(err)) => {
                            warn!(
                                "Cannot re-read {} after upload: {}; leaving it out of the cache",
                                candidate, err
                            );
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            warn!("Identity task for {} did not complete: {}", candidate, err);
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Completion::WorkerDone => finished_workers += 1,
            }
        }

        let (examined, queued) = match producer.await {
            Ok(counts) => counts,
            Err(err) => {
                warn!("Enumeration task did not complete: {}", err);
                (0, 0)
            }
        };

        PipelineSummary {
            examined,
            queued,
            uploaded,
            failed: failed.load(Ordering::Relaxed),
            cancelled: self.cancel.is_cancelled(),
        }
    }
}

/// Remote directory for one file: `{target_root}/{label}/{instance}/{parent}`.
fn remote_directory(remote_base: &str, candidate: &CandidatePath) -> String {
    let parent = candidate.parent();
    if parent.is_empty() {
        remote_base.to_string()
    } else {
        format!("{remote_base}/{parent}")
    }
}
