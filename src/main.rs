//! SchemaScope API - relational schema snapshots
//!
//! Captures a normalized description of a database's structure, maps
//! application-side field-list declarations onto it and reports
//! backward-incompatible changes between two captures.
//!
//! Capture needs DATABASE_URL; every other endpoint works on stored
//! snapshots alone.

mod catalog;
mod config;
mod error;
mod interfaces;
mod model;
mod routes;
mod snapshot;
mod state;

use crate::catalog::{CatalogSource, PostgresCatalog};
use crate::config::Settings;
use crate::routes::create_router;
use crate::snapshot::SnapshotStore;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting SchemaScope...");

    let settings = Settings::load()?;
    info!("Configuration loaded");

    let catalog: Option<Arc<dyn CatalogSource>> = match &settings.database {
        Some(db) => Some(Arc::new(PostgresCatalog::connect(db)?)),
        None => {
            warn!("DATABASE_URL not set; snapshot capture is disabled");
            None
        }
    };

    let snapshots = match &settings.storage.snapshot_dir {
        Some(dir) => SnapshotStore::with_dir(dir).await?,
        None => {
            info!("SNAPSHOT_DIR not set; snapshots are kept in memory only");
            SnapshotStore::new()
        }
    };

    let state = Arc::new(AppState::new(settings.clone(), catalog, snapshots));
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));
    info!("Server listening on http://{}", addr);
    info!("   GET    /health");
    info!("   POST   /api/snapshots                  - Capture from the database");
    info!("   POST   /api/snapshots/import           - Store an external snapshot");
    info!("   GET    /api/snapshots                  - List snapshots");
    info!("   GET    /api/snapshots/{{id}}             - Fetch a snapshot");
    info!("   DELETE /api/snapshots/{{id}}             - Delete a snapshot");
    info!("   POST   /api/snapshots/{{id}}/interfaces  - Map posted interfaces");
    info!("   POST   /api/snapshots/{{id}}/scan-zip    - Scan a zip and map");
    info!("   POST   /api/interfaces/scan            - Scan a zip");
    info!("   GET    /api/diff?from=&to=             - Diff two snapshots");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemascope=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
