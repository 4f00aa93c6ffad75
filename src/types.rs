//! Data structures for snapshot transfers.

use crate::error::TransferError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A single per-node snapshot record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct NodeSnapshot {
    /// When this node's snapshot was taken.
    pub snapshot_create_time: DateTime<Utc>,
}

/// One snapshot of a cache cluster, as listed by the control plane.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDescriptor {
    /// Unique snapshot name.
    #[serde(rename = "SnapshotName")]
    pub name: String,
    /// Creation time reported for the snapshot as a whole, if any.
    #[serde(rename = "SnapshotCreateTime", default)]
    pub create_time: Option<DateTime<Utc>>,
    /// Per-node records in source order.
    #[serde(rename = "NodeSnapshots", default)]
    pub node_snapshots: Vec<NodeSnapshot>,
}

impl SnapshotDescriptor {
    /// The creation time used to order snapshots: that of the first node
    /// snapshot record, in source order.
    pub fn effective_create_time(&self) -> Option<DateTime<Utc>> {
        self.node_snapshots.first().map(|n| n.snapshot_create_time)
    }
}

/// The (delay, max attempts) pair bounding the wait for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub delay: Duration,
    pub max_attempts: u32,
}

/// One unit of work: fetch the latest snapshot of `cluster_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub cluster_id: String,
    pub target_bucket: String,
    pub poll: PollBudget,
}

/// Stages of a single transfer, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Listing,
    Selecting,
    PreCleaning,
    Exporting,
    Polling,
    Downloading,
    PostCleaning,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Listing => "listing",
            Stage::Selecting => "selecting",
            Stage::PreCleaning => "pre-cleaning",
            Stage::Exporting => "exporting",
            Stage::Polling => "polling",
            Stage::Downloading => "downloading",
            Stage::PostCleaning => "post-cleaning",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one transfer.
#[derive(Debug)]
pub enum TransferStatus {
    /// The snapshot was downloaded to `path`.
    Succeeded { path: PathBuf },
    /// The transfer stopped at `stage`.
    Failed { stage: Stage, cause: TransferError },
    /// Not attempted because an earlier cluster failed under `fail_fast`.
    Skipped,
}

/// Result of processing one cluster.
#[derive(Debug)]
pub struct TransferOutcome {
    pub cluster_id: String,
    /// The selected snapshot, once selection succeeded.
    pub snapshot: Option<String>,
    pub status: TransferStatus,
    /// Post-clean failure. Never changes a `Succeeded` verdict.
    pub cleanup_warning: Option<TransferError>,
    pub elapsed: Duration,
}

impl TransferOutcome {
    pub(crate) fn skipped(cluster_id: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            snapshot: None,
            status: TransferStatus::Skipped,
            cleanup_warning: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TransferStatus::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, TransferStatus::Failed { .. })
    }

    /// Local path of the downloaded snapshot, if the transfer succeeded.
    pub fn path(&self) -> Option<&PathBuf> {
        match &self.status {
            TransferStatus::Succeeded { path } => Some(path),
            _ => None,
        }
    }

    /// The failing stage and its cause, if the transfer failed.
    pub fn failure(&self) -> Option<(Stage, &TransferError)> {
        match &self.status {
            TransferStatus::Failed { stage, cause } => Some((*stage, cause)),
            _ => None,
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Millisecond precision
        let elapsed = humantime::format_duration(Duration::from_millis(
            self.elapsed.as_millis() as u64,
        ));
        match &self.status {
            TransferStatus::Succeeded { path } => {
                write!(
                    f,
                    "✅ {}: downloaded {} to {} in {}",
                    self.cluster_id,
                    self.snapshot.as_deref().unwrap_or("?"),
                    path.display(),
                    elapsed
                )?;
                if let Some(warning) = &self.cleanup_warning {
                    write!(f, " (cleanup warning: {})", warning)?;
                }
                Ok(())
            }
            TransferStatus::Failed { stage, cause } => write!(
                f,
                "❌ {}: failed while {} after {}: {}",
                self.cluster_id, stage, elapsed, cause
            ),
            TransferStatus::Skipped => write!(f, "⏭️  {}: skipped", self.cluster_id),
        }
    }
}

/// How the multi-cluster driver aggregates failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    /// Stop starting new clusters after the first failure.
    pub fail_fast: bool,
    /// Number of clusters processed at once. 1 means strictly in order.
    pub max_concurrent_clusters: usize,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_concurrent_clusters: 1,
        }
    }
}

/// Per-cluster outcomes of a run, in configured order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<TransferOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TransferStatus::Skipped))
            .count()
    }

    /// True when every cluster was transferred.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    pub fn outcome(&self, cluster_id: &str) -> Option<&TransferOutcome> {
        self.outcomes.iter().find(|o| o.cluster_id == cluster_id)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} cluster(s): {} succeeded, {} failed, {} skipped",
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            self.skipped()
        )?;
        for outcome in &self.outcomes {
            writeln!(f, "  {}", outcome)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_parses_describe_snapshots_shape() {
        let json = r#"{
            "SnapshotName": "cache-1-2024-01-01",
            "NodeSnapshots": [
                {"SnapshotCreateTime": "2024-01-01T03:00:00Z"},
                {"SnapshotCreateTime": "2024-01-02T03:00:00Z"}
            ]
        }"#;
        let descriptor: SnapshotDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(descriptor.name, "cache-1-2024-01-01");
        assert!(descriptor.create_time.is_none());
        assert_eq!(
            descriptor.effective_create_time().unwrap().to_rfc3339(),
            "2024-01-01T03:00:00+00:00"
        );
    }

    #[test]
    fn test_effective_time_requires_node_snapshot() {
        let descriptor = SnapshotDescriptor {
            name: "empty".to_string(),
            create_time: None,
            node_snapshots: vec![],
        };
        assert!(descriptor.effective_create_time().is_none());
    }

    #[test]
    fn test_report_counts() {
        let report = RunReport {
            outcomes: vec![
                TransferOutcome {
                    cluster_id: "a".to_string(),
                    snapshot: Some("s".to_string()),
                    status: TransferStatus::Succeeded {
                        path: PathBuf::from("downloads/s.rdb"),
                    },
                    cleanup_warning: None,
                    elapsed: Duration::from_secs(3),
                },
                TransferOutcome {
                    cluster_id: "b".to_string(),
                    snapshot: None,
                    status: TransferStatus::Failed {
                        stage: Stage::Listing,
                        cause: TransferError::EmptyInput,
                    },
                    cleanup_warning: None,
                    elapsed: Duration::ZERO,
                },
                TransferOutcome::skipped("c"),
            ],
        };

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(!report.is_success());

        let summary = report.to_string();
        assert!(summary.contains("3 cluster(s): 1 succeeded, 1 failed, 1 skipped"));
        assert!(summary.contains("b: failed while listing"));
        assert!(summary.contains("in 3s"));
    }

    #[test]
    fn test_sub_second_elapsed_is_shown() {
        let outcome = TransferOutcome {
            cluster_id: "a".to_string(),
            snapshot: Some("s".to_string()),
            status: TransferStatus::Succeeded {
                path: PathBuf::from("downloads/s.rdb"),
            },
            cleanup_warning: None,
            elapsed: Duration::from_micros(250_400),
        };
        assert!(outcome.to_string().ends_with("in 250ms"), "{}", outcome);
    }
}
