//! tunesmith-mg - Music Generation Gateway
//!
//! Wraps the external music generation provider: accepts prompts, tracks
//! task lifecycle through callbacks and polling, persists results, and
//! serves audio downloads.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tunesmith_common::config::{CliOverrides, GatewayConfig};

use tunesmith_mg::{build_router, AppState};

/// Command-line arguments (highest-priority configuration tier)
#[derive(Parser, Debug)]
#[command(name = "tunesmith-mg", version, about = "Music generation gateway")]
struct Args {
    /// Config file path (default: ~/.config/tunesmith/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Provider API key
    #[arg(long)]
    api_key: Option<String>,

    /// HTTP listen address
    #[arg(long)]
    listen: Option<String>,

    /// Externally reachable callback URL given to the provider
    #[arg(long)]
    callback_url: Option<String>,

    /// SQLite database path
    #[arg(long)]
    db_path: Option<String>,

    /// Directory for materialized audio assets
    #[arg(long)]
    audio_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting Tunesmith Music Generation Gateway (tunesmith-mg) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    let overrides = CliOverrides {
        config_path: args.config,
        api_key: args.api_key,
        listen_addr: args.listen,
        callback_url: args.callback_url,
        db_path: args.db_path,
        audio_dir: args.audio_dir,
    };
    let config = Arc::new(GatewayConfig::resolve(&overrides)?);

    info!("Provider base URL: {}", config.provider_base_url);
    info!("Database: {}", config.db_path.display());
    info!("Audio directory: {}", config.audio_dir.display());

    let pool = tunesmith_common::db::init_database(&config.db_path).await?;
    info!("Database connection established");

    let state = AppState::new(pool, Arc::clone(&config));

    // Tasks still in flight from a previous run get fresh polling loops
    state.reconciler.recover_inflight().await?;

    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Listening on http://{}", config.listen_addr);
    info!("Health check: http://{}/health", config.listen_addr);

    let reconciler = Arc::clone(&state.reconciler);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stop every per-task polling loop before the server exits
            reconciler.shutdown();
        })
        .await?;

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
