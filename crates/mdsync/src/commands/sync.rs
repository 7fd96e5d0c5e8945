//! `mdsync sync` command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use mdsync_config::{CliSettings, Config};
use mdsync_diagrams::PlantUmlTransform;
use mdsync_store::{PostStore, SqliteStore};
use mdsync_sync::{CycleReport, NotificationBus, SyncEngine};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the sync command.
#[derive(Args)]
pub(crate) struct SyncArgs {
    /// Path to configuration file (default: auto-discover mdsync.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory mirrored into the store (overrides config).
    #[arg(short = 'd', long, env = "SYNC_DIR")]
    root_dir: Option<PathBuf>,

    /// `SQLite` database file (overrides config).
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable verbose output (per-document logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl SyncArgs {
    /// Execute the sync command.
    ///
    /// Runs a single reconciliation cycle, including the startup prune when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the store cannot be opened or
    /// the sync root cannot be scanned.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            root_dir: self.root_dir,
            database: self.database,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        output.info(&format!(
            "Syncing {} into {}",
            config.sync_resolved.root_dir.display(),
            config.store_resolved.path.display()
        ));

        let sqlite = Arc::new(SqliteStore::open(&config.store_resolved.path).await?);
        let store: Arc<dyn PostStore> = Arc::clone(&sqlite) as Arc<dyn PostStore>;
        let transform = Arc::new(PlantUmlTransform::new(config.plantuml.public_url.clone()));
        let bus = Arc::new(NotificationBus::new(config.sync_resolved.subscriber_capacity));
        let mut engine = SyncEngine::new(&config.sync_resolved, store, transform, bus);

        let result = engine.run_cycle().await;
        sqlite.close().await;
        let report = result?;

        print_report(&output, &report);
        Ok(())
    }
}

/// Print a summary of one cycle.
fn print_report(output: &Output, report: &CycleReport) {
    let changes = &report.changes;
    output.heading(&format!("Sync finished in {:?}", report.duration));
    output.field("upserted", changes.upserted);
    output.field("deleted", changes.deleted);
    output.field("collections deleted", changes.collections_deleted);
    output.field("purged", changes.purged);
    if report.skipped > 0 {
        output.field("skipped (unreadable)", report.skipped);
    }

    if report.failed() == 0 {
        output.success(&format!("{} document(s) touched", report.touched()));
        return;
    }

    output.warning(&format!("{} operation(s) failed:", report.failed()));
    for path in &changes.failed_paths {
        output.warning(&format!("  {}", path.display()));
    }
    for collection in &changes.failed_collections {
        output.warning(&format!("  collection {collection}"));
    }
}
