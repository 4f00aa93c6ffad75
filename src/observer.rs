//! Stage transition reporting.

use crate::error::TransferError;
use crate::types::{SnapshotDescriptor, Stage, TransferOutcome};
use tracing::{error, info, warn};

/// Receives stage transitions of every transfer.
///
/// All methods default to doing nothing.
pub trait TransferObserver: Send + Sync {
    fn stage_started(&self, _cluster_id: &str, _stage: Stage) {}

    fn stage_succeeded(&self, _cluster_id: &str, _stage: Stage) {}

    fn stage_failed(&self, _cluster_id: &str, _stage: Stage, _error: &TransferError) {}

    fn snapshot_selected(&self, _cluster_id: &str, _snapshot: &SnapshotDescriptor) {}

    /// A post-clean failure that leaves the transfer verdict unchanged.
    fn cleanup_failed(&self, _cluster_id: &str, _error: &TransferError) {}

    fn transfer_finished(&self, _outcome: &TransferOutcome) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Emits one structured log line per stage transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransferObserver for TracingObserver {
    fn stage_started(&self, cluster_id: &str, stage: Stage) {
        info!(cluster = cluster_id, stage = %stage, "stage started");
    }

    fn stage_succeeded(&self, cluster_id: &str, stage: Stage) {
        info!(cluster = cluster_id, stage = %stage, "stage succeeded");
    }

    fn stage_failed(&self, cluster_id: &str, stage: Stage, err: &TransferError) {
        error!(cluster = cluster_id, stage = %stage, error = %err, "stage failed");
    }

    fn snapshot_selected(&self, cluster_id: &str, snapshot: &SnapshotDescriptor) {
        info!(
            cluster = cluster_id,
            snapshot = %snapshot.name,
            created = ?snapshot.effective_create_time(),
            "selected latest snapshot"
        );
    }

    fn cleanup_failed(&self, cluster_id: &str, err: &TransferError) {
        warn!(cluster = cluster_id, error = %err, "⚠️  post-clean failed, download kept");
    }

    fn transfer_finished(&self, outcome: &TransferOutcome) {
        if outcome.is_success() {
            info!(cluster = %outcome.cluster_id, "{}", outcome);
        } else {
            error!(cluster = %outcome.cluster_id, "{}", outcome);
        }
    }
}
