//! CLI error types.

use mdsync_config::ConfigError;
use mdsync_store::StoreError;
use mdsync_sync::SyncError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("{0}")]
    Server(String),
}
