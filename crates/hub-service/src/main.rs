//! Meeting Hub
//!
//! Entry point for the Meeting Hub HTTP service: meetings, invitations,
//! sessions and user credentials.

use common::config::ObservabilityConfig;
use hub_service::config::Config;
use hub_service::observability::metrics::init_metrics_recorder;
use hub_service::repositories::{PgMeetingRepository, PgUserRepository};
use hub_service::routes::{self, AppState};
use hub_service::services::{
    BlobStore, HttpBlobStore, HttpNotifier, LogNotifier, Notifier, UnconfiguredBlobStore,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "hub_service=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_vars: HashMap<String, String> = std::env::vars().collect();

    ObservabilityConfig::from_vars(&env_vars, DEFAULT_LOG_FILTER)?.init_tracing()?;

    info!("Starting Meeting Hub");

    let config = Config::from_vars(&env_vars).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        frontend_url = %config.frontend_url,
        notifier_configured = config.notifier_url.is_some(),
        blob_store_configured = config.blob_store_url.is_some(),
        "Configuration loaded successfully"
    );

    info!("Connecting to database...");
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            e
        })?;

    info!("Database ready");

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    let collaborator_timeout = Duration::from_secs(config.collaborator_timeout_seconds);

    let notifier: Arc<dyn Notifier> = match &config.notifier_url {
        Some(url) => Arc::new(HttpNotifier::new(url.clone(), collaborator_timeout)?),
        None => {
            warn!("NOTIFIER_URL not set; outgoing email will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let blob_store: Arc<dyn BlobStore> = match &config.blob_store_url {
        Some(url) => Arc::new(HttpBlobStore::new(url.clone(), collaborator_timeout)?),
        None => {
            warn!("BLOB_STORE_URL not set; avatar and recording uploads will fail");
            Arc::new(UnconfiguredBlobStore)
        }
    };

    let bind_address = config.bind_address.clone();

    let state = Arc::new(AppState::new(
        config,
        Arc::new(PgUserRepository::new(db_pool.clone())),
        Arc::new(PgMeetingRepository::new(db_pool)),
        notifier,
        blob_store,
    ));

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Meeting Hub listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Meeting Hub shutdown complete");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
