//! HTTP backend for the snapshot control plane and path-style object storage.

use crate::backend::{ObjectStore, SnapshotRepository};
use crate::config::Config;
use crate::error::{BackendError, ConfigError};
use crate::types::SnapshotDescriptor;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Response body of the snapshot listing call.
#[derive(Deserialize, Debug)]
struct ListSnapshotsResponse {
    #[serde(rename = "Snapshots", default)]
    snapshots: Vec<SnapshotDescriptor>,
}

/// Request body of the snapshot copy call.
#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct CopySnapshotRequest<'a> {
    source_snapshot_name: &'a str,
    target_snapshot_name: &'a str,
    target_bucket: &'a str,
}

/// Talks to the control plane at `control` and to object storage at
/// `storage`, addressing objects as `<storage>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    region: String,
    control_url: Url,
    storage_url: Url,
    show_progress: bool,
}

impl HttpBackend {
    pub fn new(region: &str, control: &str, storage: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            client: reqwest::Client::new(),
            region: region.to_string(),
            control_url: parse_base("endpoints.control", control)?,
            storage_url: parse_base("endpoints.storage", storage)?,
            show_progress: false,
        })
    }

    /// Builds a backend from the `endpoints` settings. Storage defaults to the
    /// regional S3 endpoint; the control endpoint has no default.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let control = config
            .endpoints
            .control
            .as_deref()
            .ok_or(ConfigError::Missing("endpoints.control"))?;
        let storage = config
            .endpoints
            .storage
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        Self::new(&config.region, control, &storage)
    }

    /// Show a byte progress bar while downloading.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn object_url(&self, bucket: &str, key: &str) -> Url {
        join(&self.storage_url, &[bucket, key])
    }

    fn progress_bar(&self, len: Option<u64>, key: &str) -> indicatif::ProgressBar {
        if !self.show_progress {
            return indicatif::ProgressBar::hidden();
        }
        let pb = match len {
            Some(len) => indicatif::ProgressBar::new(len),
            None => indicatif::ProgressBar::new_spinner(),
        };
        if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} | {elapsed_precise} elapsed, ETA {eta_precise}",
        ) {
            pb.set_style(style.progress_chars("█▓▒░ "));
        }
        pb.set_message(format!("⬇️  {}", key));
        pb
    }
}

#[async_trait]
impl SnapshotRepository for HttpBackend {
    async fn list(&self, cluster_id: &str) -> Result<Vec<SnapshotDescriptor>, BackendError> {
        let mut url = join(&self.control_url, &["clusters", cluster_id, "snapshots"]);
        url.query_pairs_mut().append_pair("region", &self.region);
        info!("Listing snapshots from {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(format!("cluster {}", cluster_id)));
        }
        if !status.is_success() {
            return Err(BackendError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let listing: ListSnapshotsResponse = serde_json::from_slice(&body)?;
        Ok(listing.snapshots)
    }

    async fn export_to_storage(
        &self,
        snapshot_name: &str,
        bucket: &str,
    ) -> Result<(), BackendError> {
        let url = join(&self.control_url, &["snapshots", snapshot_name, "copy"]);
        let body = CopySnapshotRequest {
            source_snapshot_name: snapshot_name,
            target_snapshot_name: snapshot_name,
            target_bucket: bucket,
        };
        info!("Triggering export of {} to bucket {}", snapshot_name, bucket);

        let response = self.client.post(url.clone()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
        let url = self.object_url(bucket, key);
        let response = self.client.delete(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("Nothing to delete at {}", url);
            return Ok(());
        }
        if !status.is_success() {
            return Err(BackendError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        info!("🧹 Removed {}/{}", bucket, key);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for HttpBackend {
    async fn key_exists(&self, bucket: &str, key: &str) -> Result<bool, BackendError> {
        let url = self.object_url(bucket, key);
        let response = self.client.head(url.clone()).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(BackendError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// Streams the object into `path`, checking its size against
    /// Content-Length and its MD5 against a single-part ETag.
    ///
    /// Bytes land in a sibling `.part` file that is renamed over `path` only
    /// once both checks pass, so a failed download never leaves a truncated
    /// snapshot behind or clobbers an earlier good copy.
    async fn download(&self, bucket: &str, key: &str, path: &Path) -> Result<(), BackendError> {
        let url = self.object_url(bucket, key);
        let download_response = self.client.get(url.clone()).send().await?;
        let status = download_response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(format!("{}/{}", bucket, key)));
        }
        if !status.is_success() {
            return Err(BackendError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let part_path = partial_path(path);
        let file_size = match self
            .stream_verified(download_response, &part_path, key)
            .await
        {
            Ok(size) => size,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&part_path, path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e.into());
        }

        info!("✅ Downloaded {} ({} bytes) to {}", key, file_size, path.display());
        Ok(())
    }
}

impl HttpBackend {
    /// Writes the response body to `part_path` and verifies it. Returns the
    /// number of bytes written.
    async fn stream_verified(
        &self,
        download_response: reqwest::Response,
        part_path: &Path,
        key: &str,
    ) -> Result<u64, BackendError> {
        let url = download_response.url().clone();
        let content_length = download_response.content_length();
        // ETag is the MD5 of the content for single-part uploads
        let etag = download_response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string());

        let mut file = BufWriter::new(tokio::fs::File::create(part_path).await?);
        let pb = self.progress_bar(content_length, key);

        let mut byte_stream = download_response.bytes_stream();
        let mut hasher = if etag.is_some() {
            use md5::Digest;
            Some(md5::Md5::new())
        } else {
            None
        };

        while let Some(piece) = byte_stream.next().await {
            let chunk = match piece {
                Ok(chunk) => chunk,
                Err(e) => {
                    pb.abandon();
                    return Err(e.into());
                }
            };
            if let Some(ref mut h) = hasher {
                use md5::Digest;
                h.update(&chunk);
            }
            file.write_all(&chunk).await?;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await?;
        pb.finish_and_clear();

        let file_size = tokio::fs::metadata(part_path).await?.len();
        if let Some(content_length) = content_length {
            if file_size != content_length {
                return Err(BackendError::InvalidData(format!(
                    "size mismatch for {}: expected {} bytes, got {} bytes",
                    key, content_length, file_size
                )));
            }
        } else {
            warn!(
                "Content-Length header was not present for {}. Cannot verify file size.",
                url
            );
        }

        if let (Some(expected_etag), Some(hasher)) = (etag, hasher) {
            // Multipart ETags ("<md5>-<parts>") are not a content MD5
            if !expected_etag.contains('-') {
                use md5::Digest;
                let computed_md5 = format!("{:x}", hasher.finalize());
                if computed_md5 != expected_etag {
                    return Err(BackendError::InvalidData(format!(
                        "MD5 mismatch for {}: expected {}, got {}",
                        key, expected_etag, computed_md5
                    )));
                }
                debug!("MD5 verified for {}", key);
            }
        }

        Ok(file_size)
    }
}

/// `<path>.part`, the in-progress download location for `path`.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn parse_base(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("'{}' is not a valid URL: {}", raw, e),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("'{}' cannot be used as a base URL", raw),
        });
    }
    Ok(url)
}

/// Appends percent-encoded path segments to `base`.
fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
