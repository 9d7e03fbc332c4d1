//! Cycle scheduler.
//!
//! Fires the orchestrator on a fixed cadence. A single-flight lock makes
//! overlapping fires collapse into a skipped tick: at most one cycle ever
//! runs, and a skipped tick is never queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::engine::orchestrator::{CycleReport, RoundOrchestrator};
use crate::engine::stats::KeeperStats;
use crate::types::CyclePhase;

// ---------------------------------------------------------------------------
// Single-flight lock
// ---------------------------------------------------------------------------

/// The process-wide "a cycle is running" flag.
#[derive(Debug, Default)]
pub struct SchedulerState {
    busy: AtomicBool,
}

impl SchedulerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the lock if it is free. The lock is held until the returned
    /// token is released or dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<LockToken> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LockToken {
                state: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding the single-flight lock.
#[derive(Debug)]
pub struct LockToken {
    state: Arc<SchedulerState>,
}

impl LockToken {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        self.state.busy.store(false, Ordering::Release);
    }
}

/// Puts the reported phase back to idle when a cycle task ends, however
/// it ends.
struct IdleOnExit(Arc<KeeperStats>);

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        self.0.set_phase(CyclePhase::Idle);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Result of a single tick.
#[derive(Debug)]
pub enum FireOutcome {
    /// A cycle was spawned. The handle resolves once the cycle (and its
    /// lock) is done.
    Started {
        cycle_number: u64,
        handle: JoinHandle<CycleReport>,
    },
    /// A cycle was already running; nothing was done.
    Skipped,
}

pub struct CycleScheduler {
    orchestrator: Arc<RoundOrchestrator>,
    state: Arc<SchedulerState>,
    cadence: Duration,
    stats: Arc<KeeperStats>,
    next_cycle: AtomicU64,
}

impl CycleScheduler {
    pub fn new(
        orchestrator: Arc<RoundOrchestrator>,
        cadence: Duration,
        stats: Arc<KeeperStats>,
    ) -> Self {
        Self {
            orchestrator,
            state: SchedulerState::new(),
            cadence,
            stats,
            next_cycle: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> Arc<SchedulerState> {
        Arc::clone(&self.state)
    }

    /// One tick: start a cycle if none is running, otherwise skip.
    ///
    /// The spawned task owns the lock token, so the lock is released when
    /// the cycle returns or panics.
    pub fn fire(&self) -> FireOutcome {
        let Some(token) = self.state.try_acquire() else {
            self.stats.record_tick_skipped();
            info!("Previous cycle still running; skipping tick");
            return FireOutcome::Skipped;
        };

        let cycle_number = self.next_cycle.fetch_add(1, Ordering::Relaxed);
        self.stats.record_cycle_started();

        let orchestrator = Arc::clone(&self.orchestrator);
        let stats = Arc::clone(&self.stats);
        let handle = tokio::spawn(async move {
            let _token = token;
            // Declared after the token, so dropped before it.
            let _idle = IdleOnExit(stats);
            orchestrator.run_cycle(cycle_number).await
        });

        FireOutcome::Started {
            cycle_number,
            handle,
        }
    }

    /// Fire on every cadence tick, forever. The first tick is immediate.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.cadence);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            cadence_secs = self.cadence.as_secs(),
            participants = self.orchestrator.participants().len(),
            "Scheduler running"
        );

        loop {
            interval.tick().await;
            if let FireOutcome::Started {
                cycle_number,
                handle,
            } = self.fire()
            {
                tokio::spawn(async move {
                    if let Err(e) = handle.await {
                        error!(cycle = cycle_number, error = %e, "Cycle task aborted");
                    }
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
