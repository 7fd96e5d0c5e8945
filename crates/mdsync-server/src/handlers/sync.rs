//! Manual sync trigger and sync status.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use mdsync_sync::CycleReport;

use crate::error::ServerError;
use crate::state::AppState;

/// Response for GET|POST /api/sync.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SyncResponse {
    status: &'static str,
    touched: u64,
    upserted: usize,
    deleted: usize,
    collections_deleted: usize,
    failed: usize,
}

impl From<&CycleReport> for SyncResponse {
    fn from(report: &CycleReport) -> Self {
        Self {
            status: "success",
            touched: report.touched(),
            upserted: report.changes.upserted,
            deleted: report.changes.deleted,
            collections_deleted: report.changes.collections_deleted,
            failed: report.failed(),
        }
    }
}

/// Response for GET /api/sync/status.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct StatusResponse {
    phase: &'static str,
    subscribers: usize,
}

/// Handle GET|POST /api/sync.
///
/// Waits for a full cycle; requests arriving during a running cycle share the next one.
pub(crate) async fn run_sync(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncResponse>, ServerError> {
    let report = state.scheduler.run_now().await?;
    tracing::info!(touched = report.touched(), "Manual sync complete");
    Ok(Json(SyncResponse::from(&report)))
}

/// Handle GET /api/sync/status.
pub(crate) async fn sync_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        phase: state.scheduler.phase().as_str(),
        subscribers: state.bus.subscriber_count(),
    })
}
