//! Main orchestration logic for fetching cluster snapshots.

use crate::backend::{ObjectStore, SnapshotRepository};
use crate::cancel::Cancellation;
use crate::error::{BackendError, TransferError};
use crate::keys::{local_path, storage_key};
use crate::observer::{NoopObserver, TransferObserver};
use crate::selector::pick_latest;
use crate::types::{
    RunPolicy, RunReport, Stage, TransferOutcome, TransferRequest, TransferStatus,
};
use futures_util::{stream, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives snapshot transfers against the injected collaborators.
///
/// Holds no state between transfers, so any run can be restarted from scratch.
pub struct Orchestrator {
    repository: Arc<dyn SnapshotRepository>,
    store: Arc<dyn ObjectStore>,
    observer: Arc<dyn TransferObserver>,
    downloads_dir: PathBuf,
    cancel: Cancellation,
}

/// A stage-tagged error, before it becomes a [`TransferStatus::Failed`].
#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    cause: TransferError,
}

/// What a transfer learned before it finished, kept even on failure.
#[derive(Default)]
struct Progress {
    snapshot: Option<String>,
    cleanup_warning: Option<TransferError>,
}

impl Orchestrator {
    /// Creates an orchestrator downloading into `downloads_dir`, with a no-op
    /// observer and a fresh cancellation flag.
    pub fn new(
        repository: Arc<dyn SnapshotRepository>,
        store: Arc<dyn ObjectStore>,
        downloads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository,
            store,
            observer: Arc::new(NoopObserver),
            downloads_dir: downloads_dir.into(),
            cancel: Cancellation::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetches the latest snapshot of one cluster.
    ///
    /// Performs, aborting at the first failure:
    ///
    /// 1. Lists the cluster's snapshots
    /// 2. Selects the latest one
    /// 3. Removes any stale export of it from the bucket
    /// 4. Triggers the export into the bucket
    /// 5. Polls until the export lands, within the request's poll budget
    /// 6. Downloads it to `<downloads_dir>/<snapshot>.rdb`
    /// 7. Removes the export from the bucket
    ///
    /// A failure in step 7 is recorded as a cleanup warning and does not
    /// change a successful verdict.
    pub async fn transfer(&self, request: &TransferRequest) -> TransferOutcome {
        let started = Instant::now();
        let mut progress = Progress::default();

        let status = match self.run_stages(request, &mut progress).await {
            Ok(path) => TransferStatus::Succeeded { path },
            Err(StageFailure { stage, cause }) => TransferStatus::Failed { stage, cause },
        };

        let outcome = TransferOutcome {
            cluster_id: request.cluster_id.clone(),
            snapshot: progress.snapshot,
            status,
            cleanup_warning: progress.cleanup_warning,
            elapsed: started.elapsed(),
        };
        self.observer.transfer_finished(&outcome);
        outcome
    }

    /// Transfers every requested cluster and reports per-cluster outcomes in
    /// request order.
    ///
    /// A failed cluster never prevents later clusters from being attempted
    /// unless `policy.fail_fast` is set, in which case they are skipped. With
    /// `max_concurrent_clusters > 1` independent clusters overlap, while the
    /// stages of each cluster stay strictly ordered.
    ///
    /// A cluster id repeated later in `requests` fails with `DuplicateCluster`
    /// without touching storage, so no two transfers share a storage key.
    pub async fn run(&self, requests: &[TransferRequest], policy: RunPolicy) -> RunReport {
        let aborted = AtomicBool::new(false);
        let aborted = &aborted;

        let mut seen = HashSet::new();
        let duplicates: Vec<bool> = requests
            .iter()
            .map(|request| !seen.insert(request.cluster_id.as_str()))
            .collect();

        info!(
            "Processing {} cluster(s), up to {} at a time",
            requests.len(),
            policy.max_concurrent_clusters.max(1)
        );

        let outcomes = stream::iter(requests.iter().zip(duplicates))
            .map(move |(request, duplicate)| async move {
                if duplicate {
                    warn!("Cluster {} listed more than once, ignoring repeat", request.cluster_id);
                    let outcome = TransferOutcome {
                        cluster_id: request.cluster_id.clone(),
                        snapshot: None,
                        status: TransferStatus::Failed {
                            stage: Stage::Listing,
                            cause: TransferError::DuplicateCluster(request.cluster_id.clone()),
                        },
                        cleanup_warning: None,
                        elapsed: Duration::ZERO,
                    };
                    aborted.store(true, Ordering::SeqCst);
                    self.observer.transfer_finished(&outcome);
                    return outcome;
                }

                if policy.fail_fast && aborted.load(Ordering::SeqCst) {
                    info!(
                        "Skipping cluster {} after an earlier failure",
                        request.cluster_id
                    );
                    let outcome = TransferOutcome::skipped(&request.cluster_id);
                    self.observer.transfer_finished(&outcome);
                    return outcome;
                }

                let outcome = self.transfer(request).await;
                if outcome.is_failure() {
                    aborted.store(true, Ordering::SeqCst);
                }
                outcome
            })
            .buffered(policy.max_concurrent_clusters.max(1))
            .collect::<Vec<_>>()
            .await;

        RunReport { outcomes }
    }

    async fn run_stages(
        &self,
        request: &TransferRequest,
        progress: &mut Progress,
    ) -> Result<PathBuf, StageFailure> {
        let cluster = request.cluster_id.as_str();
        let bucket = request.target_bucket.as_str();

        let snapshots = self
            .stage(cluster, Stage::Listing, async {
                let snapshots = self
                    .repository
                    .list(cluster)
                    .await
                    .map_err(TransferError::List)?;
                if snapshots.is_empty() {
                    return Err(TransferError::EmptyInput);
                }
                debug!("Cluster {} has {} snapshot(s)", cluster, snapshots.len());
                Ok::<_, TransferError>(snapshots)
            })
            .await?;

        let chosen = self
            .stage(cluster, Stage::Selecting, async {
                pick_latest(&snapshots).cloned()
            })
            .await?;
        self.observer.snapshot_selected(cluster, &chosen);
        progress.snapshot = Some(chosen.name.clone());

        let key = storage_key(&chosen.name);

        self.stage(cluster, Stage::PreCleaning, self.clean(bucket, &key))
            .await?;

        self.stage(cluster, Stage::Exporting, async {
            self.repository
                .export_to_storage(&chosen.name, bucket)
                .await
                .map_err(TransferError::ExportTrigger)
        })
        .await?;

        self.stage(cluster, Stage::Polling, async {
            let attempts = self
                .store
                .wait_for_key(bucket, &key, request.poll, &self.cancel)
                .await?;
            debug!("Export {}/{} present after {} attempt(s)", bucket, key, attempts);
            Ok::<_, TransferError>(())
        })
        .await?;

        let path = local_path(&self.downloads_dir, &chosen.name);
        self.stage(cluster, Stage::Downloading, async {
            if let Err(e) = tokio::fs::create_dir_all(&self.downloads_dir).await {
                return Err(TransferError::Download(BackendError::IoError(e)));
            }
            self.store
                .download(bucket, &key, &path)
                .await
                .map_err(TransferError::Download)
        })
        .await?;

        if let Err(failure) = self
            .stage(cluster, Stage::PostCleaning, self.clean(bucket, &key))
            .await
        {
            self.observer.cleanup_failed(cluster, &failure.cause);
            progress.cleanup_warning = Some(failure.cause);
        }

        Ok(path)
    }

    /// Runs one stage, reporting its transitions to the observer.
    ///
    /// Cancellation is honored before the stage starts.
    async fn stage<T, F>(&self, cluster: &str, stage: Stage, op: F) -> Result<T, StageFailure>
    where
        F: Future<Output = Result<T, TransferError>>,
    {
        let result = if self.cancel.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            self.observer.stage_started(cluster, stage);
            op.await
        };

        match result {
            Ok(value) => {
                self.observer.stage_succeeded(cluster, stage);
                Ok(value)
            }
            Err(cause) => {
                self.observer.stage_failed(cluster, stage, &cause);
                Err(StageFailure { stage, cause })
            }
        }
    }

    /// Deletes the exported object. A missing object counts as deleted.
    async fn clean(&self, bucket: &str, key: &str) -> Result<(), TransferError> {
        match self.repository.delete(bucket, key).await {
            Ok(()) => Ok(()),
            Err(BackendError::NotFound(_)) => {
                debug!("{}/{} already absent", bucket, key);
                Ok(())
            }
            Err(e) => Err(TransferError::Cleanup(e)),
        }
    }
}
