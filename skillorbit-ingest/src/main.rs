//! skillorbit-ingest - catalog refresh service
//!
//! Accepts workbook uploads and replaces the trainer and training catalogs
//! in the SkillOrbit database.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use skillorbit_common::config::{load_config, resolve_config_path};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skillorbit_ingest::{AppState, IngestOptions, Ingestor};

/// Command-line arguments for skillorbit-ingest
#[derive(Parser, Debug)]
#[command(name = "skillorbit-ingest")]
#[command(about = "Catalog refresh service for SkillOrbit")]
#[command(version)]
struct Args {
    /// Config file (TOML); falls back to SKILLORBIT_CONFIG, then the user config dir
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overriding the config file
    #[arg(short, long, env = "SKILLORBIT_DATABASE")]
    database: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(short, long, env = "SKILLORBIT_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting skillorbit-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: compiled defaults"),
    }
    info!("Database: {}", config.database_path.display());

    let db_pool = skillorbit_common::db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let options = IngestOptions::from(&config.ingest);
    info!(
        on_unparsable_date = ?options.on_unparsable_date,
        store_timeout_secs = options.store_timeout.as_secs(),
        "Ingestion options"
    );

    let state = AppState::new(db_pool, Ingestor::new(options), config.max_upload_bytes)
        .with_cors_origins(config.cors_allowed_origins.clone());
    let app = skillorbit_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
