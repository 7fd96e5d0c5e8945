//! Filesystem-to-store synchronization engine for mdsync.
//!
//! Mirrors a directory tree of markdown files into a [`PostStore`](mdsync_store::PostStore)
//! by polling:
//!
//! - [`Scanner`] walks the sync root and fingerprints eligible files
//! - [`diff`] compares the snapshot with what the previous cycle saw
//! - [`Reconciler`] applies the resulting [`EditScript`] to the store
//! - [`NotificationBus`] tells live-reload subscribers that documents changed
//! - [`SyncScheduler`] runs all of the above on an interval and on demand
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mdsync_sync::{NotificationBus, SyncEngine, SyncScheduler};
//!
//! let bus = Arc::new(NotificationBus::new(config.subscriber_capacity));
//! let engine = SyncEngine::new(&config, store, transform, Arc::clone(&bus));
//! let (handle, task) = SyncScheduler::spawn(engine, Some(config.interval), shutdown_rx);
//!
//! let report = handle.run_now().await?;
//! println!("{} documents changed", report.touched());
//! ```

mod bus;
mod detector;
mod engine;
mod fingerprint;
mod mapper;
mod reconciler;
mod scanner;
mod scheduler;

pub use bus::{BroadcastOutcome, BusMessage, NotificationBus, Subscription};
pub use detector::{EditScript, TrackedState, diff};
pub use engine::{CycleReport, SyncEngine, SyncError, SyncPhase};
pub use fingerprint::Fingerprint;
pub use mapper::{DocumentKey, PathMapper, slugify};
pub use reconciler::{ReconcileReport, Reconciler};
pub use scanner::{ScanError, Scanner, Snapshot};
pub use scheduler::{SchedulerHandle, SyncScheduler};
