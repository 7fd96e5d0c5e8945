//! Application state.
//!
//! Shared state for all request handlers.

use std::sync::Arc;

use mdsync_diagrams::PlantUmlProxy;
use mdsync_store::PostStore;
use mdsync_sync::{NotificationBus, PathMapper, SchedulerHandle};

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Post store shared with the sync engine.
    pub(crate) store: Arc<dyn PostStore>,
    /// Handle for manual sync and phase reporting.
    pub(crate) scheduler: SchedulerHandle,
    /// Live-reload subscriber registry.
    pub(crate) bus: Arc<NotificationBus>,
    /// Client for the `PlantUML` server.
    pub(crate) plantuml: PlantUmlProxy,
    /// Collection naming used by the sync engine.
    pub(crate) mapper: PathMapper,
    /// Application version for `ETag` computation.
    pub(crate) version: String,
}

impl AppState {
    /// Full collection name for a path segment.
    ///
    /// `A` and `content/A` both resolve to `content/A`. Synced collections are a
    /// single directory below the namespace, so any name with a `/` is already
    /// full, such as `uploaded/notes`.
    pub(crate) fn resolve_collection(&self, name: &str) -> String {
        let name = name.trim_matches('/');
        if name.contains('/') {
            name.to_owned()
        } else {
            self.mapper.collection_for_dir(name)
        }
    }
}
