//! Periodic and on-demand cycle driver.
//!
//! The scheduler task owns the [`SyncEngine`]. Manual triggers that arrive while a
//! cycle runs are queued and answered together by a single follow-up cycle.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{CycleReport, SyncEngine, SyncError, SyncPhase};

type Waiter = oneshot::Sender<Result<CycleReport, SyncError>>;

/// Pending manual triggers beyond this are folded into the already queued ones.
const TRIGGER_QUEUE: usize = 64;

/// Cloneable handle to a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    requests: mpsc::Sender<Option<Waiter>>,
    phase: watch::Receiver<SyncPhase>,
}

impl SchedulerHandle {
    /// Request a cycle and wait for its report.
    ///
    /// If a cycle is already running, this resolves with the next one.
    pub async fn run_now(&self) -> Result<CycleReport, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Some(tx))
            .await
            .map_err(|_| SyncError::SchedulerStopped)?;
        rx.await.map_err(|_| SyncError::SchedulerStopped)?
    }

    /// Request a cycle without waiting for it.
    pub fn trigger(&self) {
        // A full queue already guarantees a follow-up cycle
        let _ = self.requests.try_send(None);
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Receiver for phase transitions.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.clone()
    }
}

/// Spawns the loop that drives a [`SyncEngine`].
#[derive(Debug)]
pub struct SyncScheduler;

impl SyncScheduler {
    /// Start the scheduler on the current runtime.
    ///
    /// With an `interval`, the first cycle runs immediately and the next one an
    /// interval after each cycle ends. Without one, cycles only run on request. The
    /// loop exits when `shutdown` becomes `true` or its sender is dropped, never in the
    /// middle of a cycle.
    pub fn spawn(
        engine: SyncEngine,
        interval: Option<Duration>,
        shutdown: watch::Receiver<bool>,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (requests, rx) = mpsc::channel(TRIGGER_QUEUE);
        let handle = SchedulerHandle {
            requests,
            phase: engine.subscribe_phase(),
        };
        let task = tokio::spawn(run_loop(engine, interval, rx, shutdown));
        (handle, task)
    }
}

async fn run_loop(
    mut engine: SyncEngine,
    interval: Option<Duration>,
    mut requests: mpsc::Receiver<Option<Waiter>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = interval.unwrap_or(Duration::from_secs(3600));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval = ?interval, "Sync scheduler started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let mut waiters: Vec<Waiter> = Vec::new();
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick(), if interval.is_some() => {}
            Some(request) = requests.recv() => {
                waiters.extend(request);
            }
        }

        // Everything queued so far is answered by this one cycle
        while let Ok(request) = requests.try_recv() {
            waiters.extend(request);
        }

        let result = engine.run_cycle().await;
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        ticker.reset();
    }

    tracing::info!("Sync scheduler stopped");
}
