//! Keeper statistics.
//!
//! Process-lifetime counters plus a short in-memory window of recent
//! cycle summaries for the dashboard. Nothing here is persisted and
//! nothing here feeds back into the engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

use crate::engine::orchestrator::CycleReport;
use crate::types::{BetOutcome, CyclePhase, TriggerOutcome};

/// How many recent cycles the dashboard can show.
const RECENT_CYCLES: usize = 50;

/// One line of the recent-cycles view.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_number: u64,
    pub cycle_id: String,
    pub started_at: String,
    pub duration_secs: i64,
    pub bets_placed: usize,
    pub bets_failed: usize,
    pub start_price: u64,
    pub end_price: u64,
    pub start_ok: bool,
    pub end_ok: bool,
}

impl From<&CycleReport> for CycleSummary {
    fn from(r: &CycleReport) -> Self {
        Self {
            cycle_number: r.cycle_number,
            cycle_id: r.cycle_id.to_string(),
            started_at: r.started_at.to_rfc3339(),
            duration_secs: (r.finished_at - r.started_at).num_seconds(),
            bets_placed: r.bets_placed(),
            bets_failed: r.bets_failed(),
            start_price: r.start.price,
            end_price: r.end.price,
            start_ok: !r.start.outcome.is_failed(),
            end_ok: !r.end.outcome.is_failed(),
        }
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: String,
    pub uptime_secs: i64,
    pub phase: String,
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub ticks_skipped: u64,
    pub wagers_attempted: u64,
    pub wagers_failed: u64,
    pub triggers_fired: u64,
    pub trigger_failures: u64,
    pub last_start_price: Option<u64>,
    pub last_end_price: Option<u64>,
}

pub struct KeeperStats {
    started_at: DateTime<Utc>,
    phase: Mutex<CyclePhase>,
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    ticks_skipped: AtomicU64,
    wagers_attempted: AtomicU64,
    wagers_failed: AtomicU64,
    triggers_fired: AtomicU64,
    trigger_failures: AtomicU64,
    recent: RwLock<VecDeque<CycleSummary>>,
}

impl Default for KeeperStats {
    fn default() -> Self {
        Self::new()
    }
}

impl KeeperStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            phase: Mutex::new(CyclePhase::Idle),
            cycles_started: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            wagers_attempted: AtomicU64::new(0),
            wagers_failed: AtomicU64::new(0),
            triggers_fired: AtomicU64::new(0),
            trigger_failures: AtomicU64::new(0),
            recent: RwLock::new(VecDeque::with_capacity(RECENT_CYCLES)),
        }
    }

    pub fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bets(&self, bets: &[BetOutcome]) {
        let failed = bets.iter().filter(|b| b.outcome.is_failed()).count() as u64;
        self.wagers_attempted.fetch_add(bets.len() as u64, Ordering::Relaxed);
        self.wagers_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn record_trigger(&self, trigger: &TriggerOutcome) {
        self.triggers_fired.fetch_add(1, Ordering::Relaxed);
        if trigger.outcome.is_failed() {
            self.trigger_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn record_cycle(&self, report: &CycleReport) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        let mut recent = self.recent.write().await;
        if recent.len() == RECENT_CYCLES {
            recent.pop_back();
        }
        recent.push_front(CycleSummary::from(report));
    }

    /// Recent cycles, newest first.
    pub async fn recent_cycles(&self) -> Vec<CycleSummary> {
        self.recent.read().await.iter().cloned().collect()
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let last = self.recent.read().await.front().cloned();
        StatsSnapshot {
            started_at: self.started_at.to_rfc3339(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            phase: self.phase().to_string(),
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            wagers_attempted: self.wagers_attempted.load(Ordering::Relaxed),
            wagers_failed: self.wagers_failed.load(Ordering::Relaxed),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            trigger_failures: self.trigger_failures.load(Ordering::Relaxed),
            last_start_price: last.as_ref().map(|c| c.start_price),
            last_end_price: last.as_ref().map(|c| c.end_price),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
