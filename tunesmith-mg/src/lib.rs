//! tunesmith-mg library interface
//!
//! Exposes the application state, router, and service layer for the binary
//! and for integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tunesmith_common::config::GatewayConfig;

use crate::services::fetcher::ResultFetcher;
use crate::services::provider::ProviderClient;
use crate::services::reconciler::Reconciler;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved gateway configuration
    pub config: Arc<GatewayConfig>,
    /// Task lifecycle reconciler
    pub reconciler: Arc<Reconciler>,
    /// Audio asset materializer
    pub fetcher: Arc<ResultFetcher>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire up the service layer from a pool and resolved config
    pub fn new(db: SqlitePool, config: Arc<GatewayConfig>) -> Self {
        let provider = Arc::new(ProviderClient::new(
            config.provider_base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        ));
        let reconciler = Arc::new(Reconciler::new(
            db.clone(),
            provider,
            Arc::clone(&config),
        ));
        let fetcher = Arc::new(ResultFetcher::new(
            config.audio_dir.clone(),
            Duration::from_secs(config.download_timeout_secs),
        ));

        Self {
            db,
            config,
            reconciler,
            fetcher,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::generate_routes())
        .merge(api::callback_routes())
        .merge(api::task_routes())
        .merge(api::download_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
