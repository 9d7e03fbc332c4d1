//! Dashboard API route handlers.
//!
//! All endpoints return JSON except `/health`. State is shared via
//! `Arc<DashboardState>` and is read-only from here.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::scheduler::SchedulerState;
use crate::engine::stats::{CycleSummary, KeeperStats, StatsSnapshot};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub stats: Arc<KeeperStats>,
    pub scheduler: Arc<SchedulerState>,
    pub pool_id: String,
    pub participants: usize,
    pub cadence_secs: u64,
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub cycle_running: bool,
    pub pool_id: String,
    pub participants: usize,
    pub cadence_secs: u64,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        cycle_running: state.scheduler.is_busy(),
        pool_id: state.pool_id.clone(),
        participants: state.participants,
        cadence_secs: state.cadence_secs,
        stats: state.stats.snapshot().await,
    })
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleSummary>> {
    Json(state.stats.recent_cycles().await)
}
