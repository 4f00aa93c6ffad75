//! Error types for snapshot transfers.

use std::io;
use thiserror::Error;

/// Errors reported by the snapshot control plane or object storage.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The addressed object or snapshot does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP transport error.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// The remote answered with a non-success status.
    #[error("Request to {url} failed: HTTP {status}")]
    Status { url: String, status: u16 },

    /// Downloaded bytes did not match what the remote advertised.
    #[error("Integrity check failed: {0}")]
    InvalidData(String),
}

/// A failure of one transfer, tagged by the stage that produced it in
/// [`crate::TransferStatus::Failed`].
#[derive(Error, Debug)]
pub enum TransferError {
    /// The cluster has no snapshots to choose from.
    #[error("No snapshots available")]
    EmptyInput,

    /// A snapshot descriptor without any node snapshot records.
    #[error("Snapshot {0} has no node snapshots")]
    MalformedSnapshot(String),

    #[error("Failed to list snapshots: {0}")]
    List(#[source] BackendError),

    #[error("Failed to trigger snapshot export: {0}")]
    ExportTrigger(#[source] BackendError),

    /// The exported object never appeared within the poll budget.
    #[error("Export did not appear after {attempts} attempt(s)")]
    ExportTimeout { attempts: u32 },

    #[error("Failed to poll for export: {0}")]
    Poll(#[source] BackendError),

    #[error("Failed to download snapshot: {0}")]
    Download(#[source] BackendError),

    #[error("Failed to clean storage: {0}")]
    Cleanup(#[source] BackendError),

    /// The cluster already appears earlier in the same run.
    #[error("Cluster {0} is requested more than once in this run")]
    DuplicateCluster(String),

    /// The operator interrupted the run.
    #[error("Transfer cancelled")]
    Cancelled,
}

/// Configuration problems, raised before any cluster is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
