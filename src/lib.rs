//! CacheSnap - fetch the latest snapshot of managed cache clusters
//!
//! This library lists the snapshots of each configured cluster, picks the most
//! recent one, exports it to object storage, waits for the export to land,
//! downloads it and removes the transient copy from the bucket again.
//!
//! # Features
//!
//! - **Latest-Snapshot Selection**: Ordered by the first node snapshot's creation time
//! - **Bounded Polling**: Fixed-interval wait for the asynchronous export
//! - **Idempotent Cleanup**: Stale exports removed before and after the transfer
//! - **Per-Cluster Outcomes**: One cluster's failure never hides another's result
//! - **Pluggable Backends**: Control plane and object storage behind traits
//!
//! # Example
//!
//! ```no_run
//! use cachesnap::{Config, HttpBackend, Orchestrator, TracingObserver};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("params.yaml".as_ref())?;
//! let backend = Arc::new(HttpBackend::from_config(&config)?);
//!
//! let orchestrator = Orchestrator::new(backend.clone(), backend, &config.downloads_dir)
//!     .with_observer(Arc::new(TracingObserver));
//! let report = orchestrator.run(&config.requests(), config.policy).await;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

mod backend;
mod cancel;
mod config;
mod error;
mod http;
mod keys;
mod observer;
mod orchestrator;
mod selector;
mod types;

pub use backend::{ObjectStore, SnapshotRepository};
pub use cancel::Cancellation;
pub use config::{Config, Endpoints};
pub use error::{BackendError, ConfigError, TransferError};
pub use http::HttpBackend;
pub use keys::{local_path, storage_key};
pub use observer::{NoopObserver, TracingObserver, TransferObserver};
pub use orchestrator::Orchestrator;
pub use selector::pick_latest;
pub use types::{
    NodeSnapshot, PollBudget, RunPolicy, RunReport, SnapshotDescriptor, Stage, TransferOutcome,
    TransferRequest, TransferStatus,
};
