use anyhow::Context;
use cachesnap::{Cancellation, Config, HttpBackend, Orchestrator, TracingObserver};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cachesnap")]
#[command(about = "Export and download the latest snapshot of cache clusters", long_about = None)]
#[command(version)]
struct Args {
    /// Settings file (YAML)
    #[arg(short, long, default_value = "params.yaml")]
    config: PathBuf,

    /// Directory snapshots are downloaded to (overrides `downloads_dir`)
    #[arg(short, long)]
    downloads_dir: Option<PathBuf>,

    /// Skip remaining clusters after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Number of clusters processed at once (overrides `max_concurrent_clusters`)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Disable download progress bars
    #[arg(long)]
    no_progress: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// `RUST_LOG` when set and valid, otherwise `cachesnap=info` (or `debug`
/// with `--verbose`).
fn log_filter(rust_log: Option<String>, verbose: bool) -> EnvFilter {
    let log_level = if verbose { "debug" } else { "info" };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(format!("cachesnap={}", log_level)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok(), args.verbose))
        .init();

    info!("🚀 CacheSnap - Cache Cluster Snapshot Downloader");

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Invalid configuration in {}", args.config.display()))?;
    if let Some(dir) = args.downloads_dir {
        config.downloads_dir = dir;
    }
    if args.fail_fast {
        config.policy.fail_fast = true;
    }
    if let Some(concurrency) = args.concurrency {
        anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
        config.policy.max_concurrent_clusters = concurrency;
    }

    info!("Region: {}", config.region);
    info!("Clusters: {:?}", config.cluster_ids);
    info!("Target bucket: {}", config.target_bucket);
    info!("Output directory: {:?}", config.downloads_dir);

    let show_progress = !args.no_progress && atty::is(atty::Stream::Stderr);
    let backend = Arc::new(
        HttpBackend::from_config(&config)
            .context("Invalid backend configuration")?
            .with_progress(show_progress),
    );

    let cancel = Cancellation::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            interrupt.cancel();
        }
    });

    let orchestrator = Orchestrator::new(backend.clone(), backend, &config.downloads_dir)
        .with_observer(Arc::new(TracingObserver))
        .with_cancellation(cancel);

    let report = orchestrator.run(&config.requests(), config.policy).await;

    for line in report.to_string().lines() {
        info!("{}", line);
    }

    if report.is_success() {
        info!("✅ All snapshots downloaded successfully!");
        Ok(())
    } else {
        error!("❌ {} cluster(s) failed", report.failed());
        std::process::exit(1);
    }
}
