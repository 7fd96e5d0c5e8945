//! One scan, diff, reconcile and notify pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use mdsync_config::{FailurePolicy, SyncConfig};
use mdsync_diagrams::TextTransform;
use mdsync_store::PostStore;

use crate::bus::{BroadcastOutcome, BusMessage, NotificationBus};
use crate::detector::{TrackedState, diff};
use crate::mapper::PathMapper;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::scanner::{ScanError, Scanner};

/// Sync engine or scheduler failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// The sync root could not be scanned; the cycle was skipped.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// The scheduler task is gone.
    #[error("sync scheduler stopped")]
    SchedulerStopped,
}

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Scanning,
    Diffing,
    Reconciling,
    Notifying,
}

impl SyncPhase {
    /// Lowercase name for status output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Diffing => "diffing",
            Self::Reconciling => "reconciling",
            Self::Notifying => "notifying",
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Sequence number of the cycle within this process, starting at 1.
    pub cycle: u64,
    /// Store changes, including the startup prune.
    pub changes: ReconcileReport,
    /// Entries the scan could not read.
    pub skipped: usize,
    /// Live-reload fan-out, if documents changed.
    pub broadcast: Option<BroadcastOutcome>,
    /// Wall time of the cycle.
    pub duration: Duration,
}

impl CycleReport {
    /// Number of stored posts changed.
    #[must_use]
    pub fn touched(&self) -> u64 {
        self.changes.touched()
    }

    /// Number of entries that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.changes.failed()
    }
}

/// Owns the tracked state and drives cycles.
///
/// Exactly one task owns an engine; cycles never overlap.
#[derive(Debug)]
pub struct SyncEngine {
    scanner: Scanner,
    mapper: PathMapper,
    reconciler: Reconciler,
    bus: Arc<NotificationBus>,
    policy: FailurePolicy,
    prune_on_start: bool,
    tracked: TrackedState,
    cycles: u64,
    pruned: bool,
    phase: watch::Sender<SyncPhase>,
}

impl SyncEngine {
    /// Build an engine for the configured root.
    #[must_use]
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn PostStore>,
        transform: Arc<dyn TextTransform>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        let mapper = PathMapper::from_config(config);
        let scanner = Scanner::new(config.root_dir.clone(), mapper.clone());
        let reconciler = Reconciler::new(
            store,
            transform,
            mapper.clone(),
            config.root_dir.clone(),
            config.store_timeout,
        );
        let (phase, _) = watch::channel(SyncPhase::Idle);

        Self {
            scanner,
            mapper,
            reconciler,
            bus,
            policy: config.failure_policy,
            prune_on_start: config.prune_on_start,
            tracked: TrackedState::default(),
            cycles: 0,
            pruned: false,
            phase,
        }
    }

    /// Receiver for phase transitions.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Files and collections as of the last completed cycle.
    #[must_use]
    pub fn tracked(&self) -> &TrackedState {
        &self.tracked
    }

    /// Bus that receives reload notifications.
    #[must_use]
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }

    /// Run one full cycle.
    ///
    /// A scan failure leaves the tracked state untouched and is returned; store
    /// failures are counted in the report and never fail the cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SyncError> {
        let started = Instant::now();
        self.cycles += 1;

        self.set_phase(SyncPhase::Scanning);
        let scanner = self.scanner.clone();
        let scanned = tokio::task::spawn_blocking(move || scanner.scan()).await;
        let snapshot = match scanned {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                self.set_phase(SyncPhase::Idle);
                tracing::warn!(cycle = self.cycles, error = %e, "Sync cycle skipped");
                return Err(e.into());
            }
            Err(e) => {
                self.set_phase(SyncPhase::Idle);
                tracing::warn!(cycle = self.cycles, error = %e, "Scan task failed");
                let root = self.scanner.root();
                return Err(ScanError::unreadable(root, std::io::Error::other(e)).into());
            }
        };

        self.set_phase(SyncPhase::Diffing);
        let script = diff(&self.tracked, &snapshot, &self.mapper);

        let mut changes = ReconcileReport::default();
        if self.prune_on_start && !self.pruned {
            self.set_phase(SyncPhase::Reconciling);
            if let Some(pruned) = self.reconciler.prune(&snapshot).await {
                changes.merge(pruned);
                self.pruned = true;
            }
        }
        if !script.is_empty() {
            self.set_phase(SyncPhase::Reconciling);
            tracing::debug!(
                added_or_modified = script.added_or_modified.len(),
                removed_files = script.removed_files.len(),
                removed_collections = script.removed_collections.len(),
                "Applying edit script"
            );
            changes.merge(self.reconciler.apply(&script).await);
        }

        let broadcast = if script.is_empty() && changes.touched() == 0 {
            None
        } else {
            self.set_phase(SyncPhase::Notifying);
            Some(self.bus.broadcast(BusMessage::Reload))
        };

        let mut next = self.tracked.advance(&snapshot);
        if self.policy == FailurePolicy::Retry {
            self.keep_failed(&mut next, &changes);
        }
        self.tracked = next;

        let report = CycleReport {
            cycle: self.cycles,
            skipped: snapshot.skipped.len(),
            changes,
            broadcast,
            duration: started.elapsed(),
        };
        if report.touched() > 0 || report.failed() > 0 {
            tracing::info!(
                cycle = report.cycle,
                upserted = report.changes.upserted,
                deleted = report.changes.deleted,
                collections_deleted = report.changes.collections_deleted,
                failed = report.failed(),
                duration = ?report.duration,
                "Sync cycle complete"
            );
        } else {
            tracing::debug!(cycle = report.cycle, "Sync cycle found no changes");
        }

        self.set_phase(SyncPhase::Idle);
        Ok(report)
    }

    /// Restore the previous tracked value of every failed entry, so the next diff
    /// reports it again.
    fn keep_failed(&self, next: &mut TrackedState, changes: &ReconcileReport) {
        for path in &changes.failed_paths {
            match self.tracked.files.get(path) {
                Some(fp) => {
                    next.files.insert(path.clone(), *fp);
                }
                None => {
                    next.files.remove(path);
                }
            }
        }
        for name in &changes.failed_collections {
            next.collections.insert(name.clone());
        }
    }
}
