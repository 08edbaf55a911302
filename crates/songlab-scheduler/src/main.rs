//! Songlab worker pool daemon.

use anyhow::Context;
use clap::Parser;
use songlab_core::services::AnalysisServices;
use songlab_db::{JobStore, SongStore, create_pool, run_migrations};
use songlab_scheduler::{Finalizer, StageExecutor, Worker, WorkerConfig};
use songlab_services::{
    DEFAULT_STEMS_DIR, HttpAnalysisServices, ServiceEndpoints, ServiceTimeouts,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "songlab-worker")]
#[command(about = "Songlab analysis worker pool", long_about = None)]
struct Args {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Number of concurrent workers
    #[arg(long, env = "SONGLAB_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Worker pool name, used as the claimed_by prefix
    #[arg(long, env = "SONGLAB_WORKER_NAME", default_value = "worker")]
    worker_name: String,

    /// Poll interval when the queue is empty, in milliseconds
    #[arg(long, env = "SONGLAB_IDLE_POLL_MS", default_value_t = 500)]
    idle_poll_ms: u64,

    /// Backoff after a claim error, in seconds
    #[arg(long, env = "SONGLAB_ERROR_BACKOFF_SECS", default_value_t = 5)]
    error_backoff_secs: u64,

    /// How long a claim may sit before abandoned jobs become
    /// reclaimable, in seconds
    #[arg(long, env = "SONGLAB_CLAIM_LEASE_SECS", default_value_t = 3600)]
    claim_lease_secs: u64,

    /// Identification service URL
    #[arg(
        long,
        env = "SONGLAB_IDENTIFY_URL",
        default_value = "http://localhost:8001"
    )]
    identify_url: String,

    /// Stem separation service URL
    #[arg(
        long,
        env = "SONGLAB_SEPARATE_URL",
        default_value = "http://localhost:8002"
    )]
    separate_url: String,

    /// Transcription service URL
    #[arg(
        long,
        env = "SONGLAB_TRANSCRIBE_URL",
        default_value = "http://localhost:8003"
    )]
    transcribe_url: String,

    /// Classification service URL
    #[arg(
        long,
        env = "SONGLAB_CLASSIFY_URL",
        default_value = "http://localhost:8004"
    )]
    classify_url: String,

    /// Directory where the separation service writes vocal stems
    #[arg(long, env = "SONGLAB_STEMS_DIR", default_value = DEFAULT_STEMS_DIR)]
    stems_dir: String,

    /// Disable the catalog shortcut for already-analyzed fingerprints
    #[arg(long, env = "SONGLAB_NO_SHORTCUT")]
    no_shortcut: bool,

    /// Identify request timeout, in seconds
    #[arg(long, env = "SONGLAB_IDENTIFY_TIMEOUT_SECS", default_value_t = 120)]
    identify_timeout_secs: u64,

    /// Separate request timeout, in seconds
    #[arg(long, env = "SONGLAB_SEPARATE_TIMEOUT_SECS", default_value_t = 900)]
    separate_timeout_secs: u64,

    /// Transcribe request timeout, in seconds
    #[arg(long, env = "SONGLAB_TRANSCRIBE_TIMEOUT_SECS", default_value_t = 600)]
    transcribe_timeout_secs: u64,

    /// Classify request timeout, in seconds
    #[arg(long, env = "SONGLAB_CLASSIFY_TIMEOUT_SECS", default_value_t = 60)]
    classify_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Connecting to database...");
    let pool = create_pool(&args.database_url)
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;
    info!("Database ready");

    let endpoints = ServiceEndpoints {
        identify: args.identify_url.clone(),
        separate: args.separate_url.clone(),
        transcribe: args.transcribe_url.clone(),
        classify: args.classify_url.clone(),
    };
    let timeouts = ServiceTimeouts {
        identify: Duration::from_secs(args.identify_timeout_secs),
        separate: Duration::from_secs(args.separate_timeout_secs),
        transcribe: Duration::from_secs(args.transcribe_timeout_secs),
        classify: Duration::from_secs(args.classify_timeout_secs),
        ..ServiceTimeouts::default()
    };
    let services: Arc<dyn AnalysisServices> = Arc::new(
        HttpAnalysisServices::new(endpoints, timeouts, &args.stems_dir)
            .context("building service clients")?,
    );

    let config = WorkerConfig {
        idle_poll: Duration::from_millis(args.idle_poll_ms),
        error_backoff: Duration::from_secs(args.error_backoff_secs),
        lease: Duration::from_secs(args.claim_lease_secs),
    };

    let shutdown = CancellationToken::new();
    let mut workers = JoinSet::new();
    for _ in 0..args.workers {
        let worker = Worker::new(
            &args.worker_name,
            JobStore::new(pool.clone()),
            StageExecutor::new(
                services.clone(),
                SongStore::new(pool.clone()),
                !args.no_shortcut,
            ),
            Finalizer::new(pool.clone()),
            config.clone(),
        );
        let token = shutdown.clone();
        workers.spawn(async move { worker.run(token).await });
    }
    info!(workers = args.workers, "Worker pool started");

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("Shutdown signal received, draining workers");
    shutdown.cancel();

    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "Worker task panicked");
        }
    }
    info!("All workers stopped");

    Ok(())
}
