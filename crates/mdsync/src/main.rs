//! mdsync CLI - Markdown-to-store sync service.
//!
//! Provides commands for:
//! - `serve`: Run the sync scheduler and the HTTP server
//! - `sync`: Run a single reconciliation cycle and print the report

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ServeArgs, SyncArgs};
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// mdsync - mirror a Markdown tree into a document store.
#[derive(Parser)]
#[command(name = "mdsync", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sync scheduler and the HTTP server.
    Serve(ServeArgs),
    /// Run one sync cycle against the store and exit.
    Sync(SyncArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = match &cli.command {
        Commands::Serve(args) => args.verbose,
        Commands::Sync(args) => args.verbose,
    };

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            output.error(&format!("Error: failed to create tokio runtime: {err}"));
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve(args) => rt.block_on(args.execute(VERSION)),
        Commands::Sync(args) => rt.block_on(args.execute()),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
