use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcode_core::api::{self, AppState};
use transcode_core::cache::CacheStore;
use transcode_core::config::ConfigStore;
use transcode_core::encoder::Encoder;
use transcode_core::event_bus::EventBus;
use transcode_core::job_store::JobStore;
use transcode_core::ledger::Ledger;
use transcode_core::preset::PresetStore;
use transcode_core::queue::{run_cleanup, QueueOrchestrator};
use transcode_core::transfer::{SftpClient, TransferFacade, WebDavClient};

#[derive(Parser)]
#[command(name = "transcode-core")]
#[command(about = "Remote video transcoding pipeline: job queue, safe in-place replacement, hardware encoding", long_about = None)]
struct Cli {
    /// Path to the configuration document (defaults and overrides, deep-merged).
    #[arg(long, default_value = "config.json", env = "TRANSCODE_CONFIG")]
    config: PathBuf,
    /// Path to the Job Store's SQLite database.
    #[arg(long, default_value = "data/jobs.sqlite3", env = "TRANSCODE_JOB_DB")]
    job_db: PathBuf,
    /// Path to the Directory Cache's SQLite database.
    #[arg(long, default_value = "data/cache.sqlite3", env = "TRANSCODE_CACHE_DB")]
    cache_db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the worker lanes and the HTTP adapter.
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
    /// Run the retention cleanup policy once and exit.
    Cleanup,
    /// Validate the configuration document and report errors, never panicking.
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let events = Arc::new(EventBus::new());
    let config = ConfigStore::new(cli.config.clone(), events.clone())?;

    match cli.command {
        Commands::ValidateConfig => {
            let result = config.validate().await;
            if result.valid {
                println!("configuration is valid");
            } else {
                for error in &result.errors {
                    println!("error: {error}");
                }
                std::process::exit(1);
            }
        }
        Commands::Cleanup => {
            let snapshot = config.snapshot().await;
            let job_store = JobStore::open(&cli.job_db)?;
            let ledger = Ledger::new("ledger.json");
            let transfer = build_transfer(&snapshot)?;
            let report = run_cleanup(&job_store, &ledger, transfer.as_ref(), &snapshot).await?;
            println!("purged {} jobs, {} ledger entries", report.jobs_purged, report.ledger_entries_purged);
        }
        Commands::Serve { port } => {
            let snapshot = config.snapshot().await;
            let validation = snapshot.validate();
            if !validation.valid {
                for error in &validation.errors {
                    tracing::error!(%error, "invalid configuration");
                }
                anyhow::bail!("refusing to start with invalid configuration");
            }

            let job_store = Arc::new(JobStore::open(&cli.job_db)?);
            let ledger = Arc::new(Ledger::new("ledger.json"));
            let transfer: Arc<dyn transcode_core::transfer::RemoteClient> = build_transfer(&snapshot)?.into();
            let encoder = Arc::new(Encoder::new());
            let presets = Arc::new(PresetStore::new(snapshot.storage.local_temp.join("presets")));
            let cache = Arc::new(CacheStore::open(&cli.cache_db)?);

            let orchestrator = QueueOrchestrator::new(
                job_store.clone(),
                transfer.clone(),
                encoder,
                config.clone(),
                events.clone(),
                ledger,
                snapshot.storage.local_temp.clone(),
            );
            match orchestrator.recover_from_crash() {
                Ok(0) => {}
                Ok(n) => tracing::warn!(recovered = n, "rewound jobs left mid-phase by a prior crash"),
                Err(e) => tracing::error!(error = %e, "crash recovery scan failed, continuing anyway"),
            }
            orchestrator.start();

            let state = AppState { queue: orchestrator, job_store, transfer, presets, config, cache };
            api::serve(port, state).await?;
        }
    }

    Ok(())
}

fn build_transfer(config: &transcode_core::config::PipelineConfig) -> Result<Box<dyn transcode_core::transfer::RemoteClient>> {
    let sftp: Box<dyn transcode_core::transfer::RemoteClient> = Box::new(SftpClient::new(config.remote.clone()));
    let webdav: Box<dyn transcode_core::transfer::RemoteClient> = Box::new(WebDavClient::new(&config.webdav)?);
    Ok(Box::new(TransferFacade::new(sftp, webdav, config.transfer_method, config.advanced.retry_attempts)))
}
