//! Collaborator interfaces: the snapshot control plane and object storage.

use crate::cancel::Cancellation;
use crate::error::{BackendError, TransferError};
use crate::types::{PollBudget, SnapshotDescriptor};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_retry2::strategy::FixedInterval;
use tokio_retry2::{Retry, RetryError};
use tracing::debug;

/// Lists snapshots, triggers exports and removes exported objects.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Lists the snapshots of a cluster, in the order the control plane
    /// returns them.
    async fn list(&self, cluster_id: &str) -> Result<Vec<SnapshotDescriptor>, BackendError>;

    /// Starts copying `snapshot_name` into `bucket`.
    ///
    /// Returns once the export is accepted; the object appears later.
    async fn export_to_storage(&self, snapshot_name: &str, bucket: &str)
        -> Result<(), BackendError>;

    /// Deletes `key` from `bucket`.
    ///
    /// Implementations should treat a missing key as success. Callers also
    /// accept [`BackendError::NotFound`] as success.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BackendError>;
}

/// Probes for and downloads exported objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Single existence probe. `Ok(false)` means "not yet present".
    async fn key_exists(&self, bucket: &str, key: &str) -> Result<bool, BackendError>;

    /// Writes the object's bytes verbatim to `path`. The parent directory
    /// must already exist.
    async fn download(&self, bucket: &str, key: &str, path: &Path) -> Result<(), BackendError>;

    /// Polls [`key_exists`](Self::key_exists) every `budget.delay`, at most
    /// `budget.max_attempts` times.
    ///
    /// Cancellation is checked before each attempt, after the preceding wait
    /// interval has elapsed.
    ///
    /// # Returns
    ///
    /// The number of attempts made until the key appeared.
    ///
    /// # Errors
    ///
    /// - `ExportTimeout` when the key never appeared
    /// - `Poll` on a transport or API error
    /// - `Cancelled` if the run was interrupted
    async fn wait_for_key(
        &self,
        bucket: &str,
        key: &str,
        budget: PollBudget,
        cancel: &Cancellation,
    ) -> Result<u32, TransferError> {
        let attempts = AtomicU32::new(0);
        let attempts_ref = &attempts;
        let retry_strategy = FixedInterval::from_millis(budget.delay.as_millis() as u64)
            .take(budget.max_attempts.saturating_sub(1) as usize);

        Retry::spawn(retry_strategy, move || async move {
            if cancel.is_cancelled() {
                return RetryError::to_permanent(TransferError::Cancelled);
            }
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;

            match self.key_exists(bucket, key).await {
                Ok(true) => Ok(attempt),
                Ok(false) => {
                    debug!(
                        "Key {}/{} not present yet (attempt {}/{})",
                        bucket, key, attempt, budget.max_attempts
                    );
                    RetryError::to_transient(TransferError::ExportTimeout { attempts: attempt })
                }
                Err(e) => RetryError::to_permanent(TransferError::Poll(e)),
            }
        })
        .await
    }
}
