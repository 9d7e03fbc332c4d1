//! End-to-end round cycle tests on virtual time.
//!
//! Drives the real scheduler, orchestrator, bet placer and trigger against
//! `MockChain`, with tokio's clock paused so phase timings are exact.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use round_keeper::chain::{ConfirmationPolicy, ContractCall};
use round_keeper::config::RoundConfig;
use round_keeper::engine::orchestrator::{CycleReport, RoundOrchestrator};
use round_keeper::engine::scheduler::{CycleScheduler, FireOutcome};
use round_keeper::engine::stats::KeeperStats;
use round_keeper::types::{
    BetMode, CyclePhase, Participant, PoolId, Side, SignerRef, TimestampMode, TxOutcome,
};

use crate::mock_chain::{CountingSampler, MockChain};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn round(mode: BetMode) -> RoundConfig {
    RoundConfig {
        pool_id: PoolId([0x12; 32]),
        wager: dec!(0.1),
        round_duration_secs: 30,
        cadence: secs(65),
        bet_phase: secs(50),
        start_to_end_offset: secs(10),
        cooldown: secs(5),
        max_price: 1000,
        timestamp_mode: TimestampMode::Zero,
        bet_mode: mode,
    }
}

struct Harness {
    chain: Arc<MockChain>,
    sampler: Arc<CountingSampler>,
    stats: Arc<KeeperStats>,
    scheduler: CycleScheduler,
}

fn harness(chain: MockChain, round: RoundConfig, participants: usize) -> Harness {
    let chain = Arc::new(chain);
    let sampler = Arc::new(CountingSampler::default());
    let stats = Arc::new(KeeperStats::new());
    let roster = Participant::roster((0..participants).map(|i| format!("0xuser{i:02}")));
    let orchestrator = RoundOrchestrator::new(
        &round,
        roster,
        chain.clone(),
        sampler.clone(),
        ConfirmationPolicy::default(),
        stats.clone(),
    );
    let scheduler = CycleScheduler::new(Arc::new(orchestrator), round.cadence, stats.clone());
    Harness {
        chain,
        sampler,
        stats,
        scheduler,
    }
}

fn started(outcome: FireOutcome) -> JoinHandle<CycleReport> {
    match outcome {
        FireOutcome::Started { handle, .. } => handle,
        FireOutcome::Skipped => panic!("expected the cycle to start"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_single_tick_end_to_end_timing() {
    let h = harness(MockChain::new(), round(BetMode::Sequential), 10);

    let report = started(h.scheduler.fire()).await.unwrap();

    let wagers = h.chain.wagers();
    assert_eq!(wagers.len(), 10);
    assert!(wagers.iter().all(|w| w.at < secs(1)));
    assert!(wagers.iter().all(|w| w.value == Some(dec!(0.1))));
    let ups = wagers
        .iter()
        .filter(|w| matches!(w.call, ContractCall::PlaceWager { side: Side::Up, .. }))
        .count();
    assert_eq!(ups, 5);

    let triggers = h.chain.triggers();
    assert_eq!(triggers.len(), 2);
    assert_eq!(triggers[0].at, secs(50));
    assert_eq!(triggers[1].at, secs(60));
    assert!(triggers.iter().all(|t| t.signer == SignerRef::Operator));

    assert_eq!(report.bets_placed(), 10);
    assert!(!h.scheduler.state().is_busy());

    // Cycle returned just before t=65, so the next tick proceeds.
    assert!(matches!(h.scheduler.fire(), FireOutcome::Started { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_tick_is_skipped_with_zero_transactions() {
    let h = harness(MockChain::new(), round(BetMode::Concurrent), 10);

    let handle = started(h.scheduler.fire());
    tokio::time::sleep(secs(30)).await;

    let before = h.chain.submissions().len();
    assert_eq!(before, 10);
    assert!(matches!(h.scheduler.fire(), FireOutcome::Skipped));
    tokio::time::sleep(secs(1)).await;
    assert_eq!(h.chain.submissions().len(), before);

    handle.await.unwrap();
    assert_eq!(h.chain.submissions().len(), 12);

    let snap = h.stats.snapshot().await;
    assert_eq!(snap.cycles_started, 1);
    assert_eq!(snap.ticks_skipped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_phase_waits_start_after_bets_are_issued() {
    // Each submission takes 2s to be accepted.
    let h = harness(
        MockChain::with_latency(secs(2)),
        round(BetMode::Concurrent),
        6,
    );

    started(h.scheduler.fire()).await.unwrap();

    let subs = h.chain.submissions();
    let last_wager = subs.iter().filter(|s| s.is_wager()).map(|s| s.at).max().unwrap();
    let triggers = h.chain.triggers();
    let start = triggers[0].at;
    let end = triggers[1].at;

    // Every wager is issued before the start trigger, which follows the
    // full bet-phase wait after issuance.
    assert!(subs.iter().take(6).all(|s| s.is_wager()));
    assert!(start > last_wager);
    assert_eq!(start, secs(52));
    // The end trigger follows the start trigger's own latency plus the offset.
    assert_eq!(end, secs(64));
    assert!(end - start >= secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_failing_participant_does_not_stop_others_or_triggers() {
    for mode in [BetMode::Sequential, BetMode::Concurrent] {
        let chain = MockChain::new();
        chain.fail_signer(SignerRef::Participant(3));
        let h = harness(chain, round(mode), 10);

        let report = started(h.scheduler.fire()).await.unwrap();

        assert_eq!(h.chain.wagers().len(), 10, "mode {mode}");
        assert_eq!(report.bets_failed(), 1);
        assert!(report.bets[3].outcome.is_failed());
        assert_eq!(h.chain.triggers().len(), 2);
        assert!(!report.start.outcome.is_failed());
        assert!(!report.end.outcome.is_failed());
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_operator_still_runs_every_phase() {
    let chain = MockChain::new();
    chain.fail_signer(SignerRef::Operator);
    let h = harness(chain, round(BetMode::Sequential), 4);

    let report = started(h.scheduler.fire()).await.unwrap();

    assert!(report.start.outcome.is_failed());
    assert!(report.end.outcome.is_failed());
    assert_eq!(h.chain.triggers()[1].at, secs(60));
    assert_eq!(h.stats.snapshot().await.trigger_failures, 2);
    assert!(!h.scheduler.state().is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_each_trigger_takes_its_own_draw() {
    let h = harness(MockChain::new(), round(BetMode::Sequential), 2);

    let report = started(h.scheduler.fire()).await.unwrap();

    assert_eq!(h.sampler.draws(), 2);
    assert_eq!(report.start_price(), 1);
    assert_eq!(report.end_price(), 2);
    let prices: Vec<u64> = h.chain.triggers().iter().filter_map(|t| t.price()).collect();
    assert_eq!(prices, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_cycles_are_independent() {
    let h = harness(MockChain::new(), round(BetMode::Sequential), 2);

    let first = started(h.scheduler.fire()).await.unwrap();
    let second = started(h.scheduler.fire()).await.unwrap();

    assert_eq!(first.cycle_number, 1);
    assert_eq!(second.cycle_number, 2);
    assert_ne!(first.cycle_id, second.cycle_id);
    assert_eq!(h.sampler.draws(), 4);
    assert_eq!((second.start_price(), second.end_price()), (3, 4));
    assert_eq!(h.chain.wagers().len(), 4);

    let recent = h.stats.recent_cycles().await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].cycle_number, 2);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_cycle_releases_the_lock() {
    let chain = MockChain::new();
    chain.panic_on_trigger();
    let h = harness(chain, round(BetMode::Sequential), 2);

    let err = started(h.scheduler.fire()).await.unwrap_err();
    assert!(err.is_panic());
    assert!(!h.scheduler.state().is_busy());
    assert_eq!(h.stats.phase(), CyclePhase::Idle);

    // The next tick runs a full cycle.
    let report = started(h.scheduler.fire()).await.unwrap();
    assert_eq!(report.cycle_number, 2);
    assert!(!report.start.outcome.is_failed());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_skips_ticks_while_cycle_is_running() {
    let mut cfg = round(BetMode::Sequential);
    // Ticks at 0, 30, 60, 90; the first cycle holds the lock until 65.
    cfg.cadence = secs(30);
    let h = harness(MockChain::new(), cfg, 3);

    let _ = tokio::time::timeout(secs(100), h.scheduler.run()).await;

    let snap = h.stats.snapshot().await;
    assert_eq!(snap.cycles_started, 2);
    assert_eq!(snap.ticks_skipped, 2);
    assert_eq!(snap.cycles_completed, 1);
    assert_eq!(h.chain.wagers().len(), 6);
    assert_eq!(h.chain.triggers().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_receipts_do_not_delay_triggers_or_next_tick() {
    // Every receipt arrives 20s after its submission.
    let h = harness(
        MockChain::with_delays(Duration::ZERO, secs(20)),
        round(BetMode::Sequential),
        10,
    );

    let report = started(h.scheduler.fire()).await.unwrap();

    let triggers = h.chain.triggers();
    assert_eq!(triggers[0].at, secs(50));
    assert_eq!(triggers[1].at, secs(60));
    assert!(report
        .bets
        .iter()
        .all(|b| matches!(b.outcome, TxOutcome::Confirmed { .. })));
    // Trigger receipts are still out when the cycle lets go of the lock.
    assert!(matches!(report.start.outcome, TxOutcome::Submitted { .. }));
    assert!(matches!(report.end.outcome, TxOutcome::Submitted { .. }));
    assert!(h.chain.elapsed() < secs(65));
    assert!(!h.scheduler.state().is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_with_slow_receipts_starts_every_tick() {
    let h = harness(
        MockChain::with_delays(Duration::ZERO, secs(20)),
        round(BetMode::Sequential),
        4,
    );

    // Ticks at 0 and 65.
    let _ = tokio::time::timeout(secs(70), h.scheduler.run()).await;

    let snap = h.stats.snapshot().await;
    assert_eq!(snap.cycles_started, 2);
    assert_eq!(snap.ticks_skipped, 0);
    assert_eq!(snap.cycles_completed, 1);
    assert_eq!(h.chain.wagers().len(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_at_cadence_with_latency_never_skips() {
    // 200ms per submission, 1s per receipt: bets end at 2s, the start
    // trigger goes out at 52s and the end trigger at 62.2s.
    let h = harness(
        MockChain::with_delays(Duration::from_millis(200), secs(1)),
        round(BetMode::Sequential),
        10,
    );

    // Ticks at 0, 65, 130 and 195.
    let _ = tokio::time::timeout(secs(200), h.scheduler.run()).await;

    let snap = h.stats.snapshot().await;
    assert_eq!(snap.cycles_started, 4);
    assert_eq!(snap.ticks_skipped, 0);
    assert_eq!(snap.cycles_completed, 3);
    assert_eq!(h.chain.wagers().len(), 40);

    let triggers = h.chain.triggers();
    assert_eq!(triggers.len(), 6);
    assert_eq!(triggers[0].at, secs(52));
    assert_eq!(triggers[1].at, Duration::from_millis(62_200));
    assert_eq!(triggers[2].at, secs(65 + 52));
}
