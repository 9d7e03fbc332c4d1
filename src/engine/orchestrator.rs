//! Round orchestrator.
//!
//! Runs one cycle: place every wager, wait out the bet phase, trigger the
//! round start, wait the start-to-end offset, trigger the round end, then
//! cool down. Phases advance on the clock alone; a failed phase never
//! blocks or reorders the ones after it. The cooldown is cut short so the
//! cycle always ends just before the next cadence tick.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::{ConfirmationPolicy, TransactionSubmitter};
use crate::config::RoundConfig;
use crate::engine::bettor::BetPlacer;
use crate::engine::stats::KeeperStats;
use crate::engine::trigger::RoundTrigger;
use crate::sampler::PriceSampler;
use crate::types::{BetOutcome, CyclePhase, Participant, TriggerOutcome, TriggerPhase};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Everything one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub bets: Vec<BetOutcome>,
    pub start: TriggerOutcome,
    pub end: TriggerOutcome,
}

impl CycleReport {
    pub fn bets_placed(&self) -> usize {
        self.bets.len() - self.bets_failed()
    }

    pub fn bets_failed(&self) -> usize {
        self.bets.iter().filter(|b| b.outcome.is_failed()).count()
    }

    pub fn start_price(&self) -> u64 {
        self.start.price
    }

    pub fn end_price(&self) -> u64 {
        self.end.price
    }
}

/// Log a one-line cycle summary.
pub fn log_cycle_report(report: &CycleReport) {
    let triggers_ok = !report.start.outcome.is_failed() && !report.end.outcome.is_failed();
    let secs = (report.finished_at - report.started_at).num_seconds();
    if triggers_ok {
        info!(
            cycle = report.cycle_number,
            cycle_id = %report.cycle_id,
            bets = report.bets_placed(),
            failed = report.bets_failed(),
            start_price = report.start_price(),
            end_price = report.end_price(),
            duration_secs = secs,
            "Cycle complete"
        );
    } else {
        warn!(
            cycle = report.cycle_number,
            cycle_id = %report.cycle_id,
            bets = report.bets_placed(),
            failed = report.bets_failed(),
            start = %report.start.outcome,
            end = %report.end.outcome,
            duration_secs = secs,
            "Cycle complete with trigger failures"
        );
    }
}

// ---------------------------------------------------------------------------
// Cycle state
// ---------------------------------------------------------------------------

/// Per-cycle scratch state. Created at cycle start, dropped at cycle end.
struct CycleState<'a> {
    cycle_id: Uuid,
    cycle_number: u64,
    phase: CyclePhase,
    start_price: Option<u64>,
    end_price: Option<u64>,
    started_at: DateTime<Utc>,
    clock: Instant,
    stats: &'a KeeperStats,
}

impl<'a> CycleState<'a> {
    fn new(cycle_number: u64, stats: &'a KeeperStats) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            cycle_number,
            phase: CyclePhase::Idle,
            start_price: None,
            end_price: None,
            started_at: Utc::now(),
            clock: Instant::now(),
            stats,
        }
    }

    fn enter(&mut self, next: CyclePhase) {
        debug_assert!(
            next > self.phase || next == CyclePhase::Idle,
            "phase regression {} -> {}",
            self.phase,
            next
        );
        info!(
            cycle = self.cycle_number,
            from = %self.phase,
            phase = %next,
            elapsed_ms = self.clock.elapsed().as_millis() as u64,
            "Phase transition"
        );
        self.phase = next;
        self.stats.set_phase(next);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// How long before the next cadence tick a cycle must have let go of the
/// single-flight lock.
pub const RELEASE_MARGIN: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
struct CycleTiming {
    cadence: Duration,
    bet_phase: Duration,
    start_to_end_offset: Duration,
    cooldown: Duration,
}

impl CycleTiming {
    /// Latest instant a cycle started at `origin` may run until without
    /// colliding with a tick: just before the first tick strictly after
    /// `after`.
    fn release_deadline(&self, origin: Instant, after: Instant) -> Instant {
        if self.cadence.is_zero() {
            return after;
        }
        let elapsed = after.saturating_duration_since(origin);
        let ticks = elapsed.as_nanos() / self.cadence.as_nanos() + 1;
        let ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
        origin + (self.cadence * ticks).saturating_sub(RELEASE_MARGIN)
    }
}

pub struct RoundOrchestrator {
    placer: BetPlacer,
    trigger: RoundTrigger,
    timing: CycleTiming,
    stats: Arc<KeeperStats>,
}

impl RoundOrchestrator {
    pub fn new(
        round: &RoundConfig,
        participants: Vec<Participant>,
        submitter: Arc<dyn TransactionSubmitter>,
        sampler: Arc<dyn PriceSampler>,
        policy: ConfirmationPolicy,
        stats: Arc<KeeperStats>,
    ) -> Self {
        let placer = BetPlacer::new(
            submitter.clone(),
            policy,
            participants,
            round.pool_id,
            round.wager,
            round.bet_mode,
        );
        let trigger = RoundTrigger::new(
            submitter,
            sampler,
            policy,
            round.pool_id,
            round.max_price,
            round.round_duration_secs,
            round.timestamp_mode,
        );
        Self {
            placer,
            trigger,
            timing: CycleTiming {
                cadence: round.cadence,
                bet_phase: round.bet_phase,
                start_to_end_offset: round.start_to_end_offset,
                cooldown: round.cooldown,
            },
            stats,
        }
    }

    pub fn participants(&self) -> &[Participant] {
        self.placer.participants()
    }

    /// Run one full cycle. Never fails: every transaction failure is
    /// captured in the returned report.
    ///
    /// Each phase wait starts as soon as the previous phase's transactions
    /// are issued. Receipts are settled alongside the timeline and are cut
    /// off at the release deadline, so a slow ledger never delays a
    /// trigger or holds the lock into the next tick.
    pub async fn run_cycle(&self, cycle_number: u64) -> CycleReport {
        let mut cycle = CycleState::new(cycle_number, &self.stats);
        let origin = cycle.clock;
        let receipts_by = self.timing.release_deadline(
            origin,
            origin + self.timing.bet_phase + self.timing.start_to_end_offset,
        );
        info!(cycle = cycle_number, cycle_id = %cycle.cycle_id, "Starting cycle");

        cycle.enter(CyclePhase::PlacingBets);
        let issued_bets = self.placer.issue_all().await;
        let bets_issued_at = Instant::now();
        cycle.enter(CyclePhase::AwaitingStart);

        let timeline = async {
            sleep_until(bets_issued_at + self.timing.bet_phase).await;

            cycle.enter(CyclePhase::TriggeringStart);
            let start = self.trigger.issue(TriggerPhase::Start).await;
            let start_issued_at = Instant::now();
            cycle.start_price = Some(start.price);
            cycle.enter(CyclePhase::AwaitingEnd);

            let end_leg = async {
                sleep_until(start_issued_at + self.timing.start_to_end_offset).await;

                cycle.enter(CyclePhase::TriggeringEnd);
                let end = self.trigger.issue(TriggerPhase::End).await;
                let end_issued_at = Instant::now();
                cycle.end_price = Some(end.price);
                cycle.enter(CyclePhase::Cooldown);

                let slack_until = (end_issued_at + self.timing.cooldown)
                    .min(self.timing.release_deadline(origin, end_issued_at));
                let (end, ()) = tokio::join!(
                    self.trigger.settle(end, slack_until.max(receipts_by)),
                    sleep_until(slack_until)
                );
                end
            };

            tokio::join!(self.trigger.settle(start, receipts_by), end_leg)
        };

        let (bets, (start, end)) = tokio::join!(
            self.placer.settle_all(issued_bets, receipts_by),
            timeline
        );
        self.stats.record_bets(&bets);
        self.stats.record_trigger(&start);
        self.stats.record_trigger(&end);

        cycle.enter(CyclePhase::Idle);
        debug!(
            cycle = cycle_number,
            start_price = ?cycle.start_price,
            end_price = ?cycle.end_price,
            "Cycle state discarded"
        );

        let report = CycleReport {
            cycle_id: cycle.cycle_id,
            cycle_number,
            started_at: cycle.started_at,
            finished_at: Utc::now(),
            bets,
            start,
            end,
        };
        log_cycle_report(&report);
        self.stats.record_cycle(&report).await;
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
