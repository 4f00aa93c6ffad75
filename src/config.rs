//! Settings file loading and validation.

use crate::error::ConfigError;
use crate::types::{PollBudget, RunPolicy, TransferRequest};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file as written by the operator. Every field is optional here so
/// that missing values are reported by name during validation.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    region: Option<String>,
    cluster_ids: Option<Vec<String>>,
    target_bucket: Option<String>,
    timeout: Option<u64>,
    max_attempts: Option<u32>,
    downloads_dir: Option<PathBuf>,
    #[serde(default)]
    fail_fast: bool,
    max_concurrent_clusters: Option<usize>,
    #[serde(default)]
    endpoints: Endpoints,
}

/// Endpoints used by the HTTP backend.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Endpoints {
    /// Snapshot control plane base URL.
    pub control: Option<String>,
    /// Object storage base URL (path-style buckets).
    pub storage: Option<String>,
}

/// Validated configuration for one run.
///
/// # Example
///
/// ```
/// let config = cachesnap::Config::from_yaml(
///     "region: eu-west-1\n\
///      cluster_ids: [cache-1, cache-2]\n\
///      target_bucket: snapshots\n\
///      timeout: 30\n\
///      max_attempts: 40\n",
/// )
/// .unwrap();
/// assert_eq!(config.requests().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub region: String,
    /// Clusters, processed in this order.
    pub cluster_ids: Vec<String>,
    pub target_bucket: String,
    /// Delay between export polls.
    pub poll_delay: Duration,
    /// Maximum number of export polls.
    pub max_attempts: u32,
    /// Directory snapshots are downloaded to (default: `downloads`).
    pub downloads_dir: PathBuf,
    pub policy: RunPolicy,
    pub endpoints: Endpoints,
}

impl Config {
    /// Reads and validates a YAML settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parses and validates YAML settings.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings = serde_yaml::from_str(contents)?;
        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> Result<Self, ConfigError> {
        let region = required_text("region", raw.region)?;
        let target_bucket = required_text("target_bucket", raw.target_bucket)?;
        let timeout = raw.timeout.ok_or(ConfigError::Missing("timeout"))?;
        let max_attempts = raw.max_attempts.ok_or(ConfigError::Missing("max_attempts"))?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        let cluster_ids = raw.cluster_ids.ok_or(ConfigError::Missing("cluster_ids"))?;
        if cluster_ids.is_empty() {
            return Err(ConfigError::Invalid {
                field: "cluster_ids",
                reason: "at least one cluster id is required".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for id in &cluster_ids {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "cluster_ids",
                    reason: "cluster ids must not be blank".to_string(),
                });
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "cluster_ids",
                    reason: format!("cluster id '{}' is listed twice", id),
                });
            }
        }

        let max_concurrent_clusters = raw.max_concurrent_clusters.unwrap_or(1);
        if max_concurrent_clusters == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_clusters",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            region,
            cluster_ids,
            target_bucket,
            poll_delay: Duration::from_secs(timeout),
            max_attempts,
            downloads_dir: raw.downloads_dir.unwrap_or_else(|| PathBuf::from("downloads")),
            policy: RunPolicy {
                fail_fast: raw.fail_fast,
                max_concurrent_clusters,
            },
            endpoints: raw.endpoints,
        })
    }

    /// One transfer request per configured cluster, in configured order.
    pub fn requests(&self) -> Vec<TransferRequest> {
        self.cluster_ids
            .iter()
            .map(|cluster_id| TransferRequest {
                cluster_id: cluster_id.clone(),
                target_bucket: self.target_bucket.clone(),
                poll: PollBudget {
                    delay: self.poll_delay,
                    max_attempts: self.max_attempts,
                },
            })
            .collect()
    }
}

fn required_text(field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(ConfigError::Invalid {
            field,
            reason: "must not be empty".to_string(),
        }),
        None => Err(ConfigError::Missing(field)),
    }
}
