//! HTTP server for mdsync.
//!
//! Runs the sync scheduler next to an axum server that exposes:
//! - JSON endpoints for collections, posts and manual sync
//! - JSON endpoints for manually managed documents outside the sync namespace
//! - Rendered HTML pages for collections and posts
//! - WebSocket endpoint for live reload
//! - Proxy to a `PlantUML` server for diagram images
//!
//! # Quick Start
//!
//! ```ignore
//! use mdsync_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     run_server(ServerConfig::default()).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (mdsync-server)
//!                        │
//!                        ├─► Page and API routes ──► PostStore (SQLite)
//!                        │                               ▲
//!                        ├─► /api/sync ──► SyncScheduler ┘
//!                        │                     │
//!                        ├─► /api/events ◄── NotificationBus
//!                        │
//!                        └─► /plantuml ──► PlantUML server
//! ```

mod app;
mod error;
mod handlers;
mod live_reload;
mod render;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use mdsync_config::{PlantUmlConfig, SyncConfig};
use mdsync_diagrams::{PlantUmlProxy, PlantUmlTransform};
use mdsync_store::{PostStore, SqliteStore};
use mdsync_sync::{NotificationBus, PathMapper, SyncEngine, SyncScheduler};
use state::AppState;
use tokio::sync::watch;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Sync engine settings.
    pub sync: SyncConfig,
    /// `SQLite` database file.
    pub database: PathBuf,
    /// `PlantUML` server the proxy forwards to.
    pub plantuml_server_url: String,
    /// Prefix for diagram image links embedded in posts.
    pub plantuml_public_url: String,
    /// Proxy request timeout.
    pub plantuml_timeout: Duration,
    /// Application version (for `ETag` computation).
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let plantuml = PlantUmlConfig::default();
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            sync: SyncConfig::default(),
            database: PathBuf::from("mdsync.db"),
            plantuml_timeout: plantuml.timeout(),
            plantuml_server_url: plantuml.server_url,
            plantuml_public_url: plantuml.public_url,
            version: String::new(),
        }
    }
}

/// Run the server.
///
/// Opens the store, starts the sync scheduler and serves HTTP until Ctrl-C.
/// The scheduler finishes its running cycle before the store is closed.
///
/// # Arguments
///
/// * `config` - Server configuration
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let sqlite = Arc::new(SqliteStore::open(&config.database).await?);
    let store: Arc<dyn PostStore> = Arc::clone(&sqlite) as Arc<dyn PostStore>;

    let bus = Arc::new(NotificationBus::new(config.sync.subscriber_capacity));
    let transform = Arc::new(PlantUmlTransform::new(config.plantuml_public_url.clone()));
    let engine = SyncEngine::new(&config.sync, Arc::clone(&store), transform, Arc::clone(&bus));

    let interval = config.sync.enabled.then_some(config.sync.interval);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, scheduler_task) = SyncScheduler::spawn(engine, interval, shutdown_rx);

    tracing::info!(
        root = %config.sync.root_dir.display(),
        database = %config.database.display(),
        interval = ?interval,
        "Sync scheduler started"
    );

    let state = Arc::new(AppState {
        store,
        scheduler,
        bus,
        plantuml: PlantUmlProxy::new(config.plantuml_server_url.clone(), config.plantuml_timeout),
        mapper: PathMapper::from_config(&config.sync),
        version: config.version.clone(),
    });

    let app = app::create_router(state);

    let addr = SocketAddr::from_str(&format!("{}:{}", config.host, config.port))?;
    tracing::info!(address = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown_tx.send_replace(true);
    if let Err(e) = scheduler_task.await {
        tracing::error!(error = %e, "Sync scheduler task failed");
    }
    sqlite.close().await;

    served?;
    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from mdsync config.
///
/// # Arguments
///
/// * `config` - Loaded configuration
/// * `version` - Application version
#[must_use]
pub fn server_config_from_config(config: &mdsync_config::Config, version: String) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        sync: config.sync_resolved.clone(),
        database: config.store_resolved.path.clone(),
        plantuml_server_url: config.plantuml.server_url.clone(),
        plantuml_public_url: config.plantuml.public_url.clone(),
        plantuml_timeout: config.plantuml.timeout(),
        version,
    }
}
