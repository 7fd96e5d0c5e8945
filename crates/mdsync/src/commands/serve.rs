//! `mdsync serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use mdsync_config::{CliSettings, Config};
use mdsync_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover mdsync.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory mirrored into the store (overrides config).
    #[arg(short = 'd', long, env = "SYNC_DIR")]
    root_dir: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Polling interval in milliseconds (overrides config).
    #[arg(short, long)]
    interval: Option<u64>,

    /// `SQLite` database file (overrides config).
    #[arg(long)]
    database: Option<PathBuf>,

    /// `PlantUML` server URL for the diagram proxy (overrides config).
    #[arg(long, env = "PLANTUML_SERVER")]
    plantuml_server: Option<String>,

    /// Run the periodic sync loop (default: enabled).
    #[arg(long, env = "AUTO_SYNC")]
    auto_sync: Option<bool>,

    /// Disable the periodic sync loop; `/api/sync` still runs cycles.
    #[arg(long, conflicts_with = "auto_sync")]
    no_auto_sync: bool,

    /// Enable verbose output (sync cycle and request logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            sync_enabled: self.resolve_sync_enabled(),
            host: self.host,
            port: self.port,
            root_dir: self.root_dir,
            interval_ms: self.interval,
            database: self.database,
            plantuml_server_url: self.plantuml_server,
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        output.info(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!(
            "Sync directory: {}",
            config.sync_resolved.root_dir.display()
        ));
        output.info(&format!(
            "Database: {}",
            config.store_resolved.path.display()
        ));
        output.info(&format!("PlantUML server: {}", config.plantuml.server_url));

        if config.sync_resolved.enabled {
            output.info(&format!(
                "Auto sync: every {} ms",
                config.sync_resolved.interval.as_millis()
            ));
        } else {
            output.warning("Auto sync: disabled (use /api/sync)");
        }

        let server_config = server_config_from_config(&config, version.to_owned());
        run_server(server_config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }

    /// Resolve `sync_enabled` from --auto-sync/--no-auto-sync flags.
    fn resolve_sync_enabled(&self) -> Option<bool> {
        self.no_auto_sync.then_some(false).or(self.auto_sync)
    }
}
