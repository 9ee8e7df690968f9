//! farewatch-engine - Flight deal pipeline
//!
//! Scans an upstream fare API for one-way fares out of the configured
//! home airports, reconstructs round trips that satisfy the stored
//! search profiles, records the resulting deals, and pushes
//! notifications for new or improved ones. A small HTTP API exposes
//! health, pipeline status, deal listings, and a manual refresh
//! trigger (default `127.0.0.1:8460`).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farewatch_common::config::EngineConfig;
use farewatch_engine::services::fare_source::FareFinderClient;
use farewatch_engine::services::notifier::NtfyChannel;
use farewatch_engine::services::orchestrator::Pipeline;
use farewatch_engine::{build_router, AppState};

/// Command-line arguments for farewatch-engine
#[derive(Parser, Debug)]
#[command(name = "farewatch-engine")]
#[command(about = "Flight deal scanning and matching engine")]
#[command(version)]
struct Args {
    /// SQLite database file; defaults to the platform data directory
    #[arg(long, env = "FAREWATCH_DATABASE")]
    database: Option<PathBuf>,

    /// Address to bind the HTTP API to
    #[arg(long, default_value = "127.0.0.1", env = "FAREWATCH_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "8460", env = "FAREWATCH_PORT")]
    port: u16,

    /// Pipeline config TOML; without it the default location is probed
    #[arg(long, env = "FAREWATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farewatch=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting farewatch-engine {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(
        EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?,
    );

    let database = args
        .database
        .unwrap_or_else(farewatch_common::config::default_database_path);
    info!("Database: {}", database.display());
    let db = farewatch_common::db::init_database(&database)
        .await
        .context("Failed to open database")?;

    let source = Arc::new(
        FareFinderClient::new(&config.fare_api).context("Failed to build fare API client")?,
    );
    let push = Arc::new(NtfyChannel::new(&config.ntfy).context("Failed to build push client")?);
    let pipeline = Arc::new(Pipeline::new(db, config, source, push));

    // Scheduler runs alongside the HTTP server until shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = tokio::spawn(farewatch_engine::scheduler::run_scheduler(
        pipeline.clone(),
        shutdown_rx,
    ));

    let state = AppState::new(pipeline);
    let app = build_router(state);

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    let _ = scheduler.await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
