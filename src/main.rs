//! Face Swap Service
//!
//! Swaps a child's face onto a role image fetched from an object store,
//! with OpenVINO acceleration. Serves a REST API, or runs a single job
//! from a file with `--job`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use roswap::api::dto::JobRequest;
use roswap::api::rest::{create_rest_router, AppState};
use roswap::api::JobHandler;
use roswap::config::{Config, StorageBackend};
use roswap::engine::{ModelRegistry, OpenVinoEngineFactory};
use roswap::service::SwapService;
use roswap::storage::{LocalObjectStore, ObjectStore, S3ObjectStore};

#[derive(Parser, Debug)]
#[command(name = "roswap", version, about = "Face swap service")]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run one job envelope from this JSON file and exit
    #[arg(long)]
    job: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Face Swap Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(Config::default_path()));
    let mut config = Config::load(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });
    config.apply_env();

    info!("Configuration loaded:");
    info!("  Port: {}", config.server.port);
    info!("  Device: {}", config.models.device);
    info!("  Preload models: {}", config.models.preload);
    info!("  Restoration: {}", config.pipeline.restoration_enabled);
    info!("  Output key policy: {:?}", config.pipeline.output_key_policy);
    info!("  Storage backend: {:?}", config.storage.backend);

    // Initialize model registry
    let factory = OpenVinoEngineFactory::new(&config.models)?;
    let registry = Arc::new(ModelRegistry::new(
        Box::new(factory),
        config.pipeline.restoration_enabled,
    ));

    match config.storage.backend {
        StorageBackend::S3 => {
            let store = Arc::new(S3ObjectStore::new(&config.storage).await);
            run(config, registry, store, args.job).await
        }
        StorageBackend::Local => {
            info!("Local object store at {:?}", config.storage.local_root);
            let store = Arc::new(LocalObjectStore::new(config.storage.local_root.clone()));
            run(config, registry, store, args.job).await
        }
    }
}

async fn run<S: ObjectStore>(
    config: Config,
    registry: Arc<ModelRegistry>,
    store: Arc<S>,
    job: Option<PathBuf>,
) -> Result<()> {
    let service = Arc::new(SwapService::new(registry.clone(), store, config.pipeline.clone()));

    if let Some(job_path) = job {
        return run_job(service, &job_path).await;
    }

    if config.models.preload {
        let registry = registry.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = registry.ensure_ready_once() {
                error!("Model preload failed: {:#}", e);
            }
        });
    }

    let app_state = Arc::new(AppState::new(service, config.server.body_limit_mb * 1024 * 1024));
    let router = create_rest_router(app_state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("REST API listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    info!("Goodbye!");
    Ok(())
}

async fn run_job<S: ObjectStore>(service: Arc<SwapService<S>>, job_path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(job_path)
        .with_context(|| format!("Failed to read job file {:?}", job_path))?;
    let job: JobRequest = serde_json::from_str(&content).context("Invalid job file")?;

    let response = JobHandler::new(service).handle(job).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.output.is_none() {
        anyhow::bail!(
            "job {} failed: {}",
            response.id,
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
