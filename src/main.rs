//! Round keeper entry point.
//!
//! Loads configuration, initialises structured logging, connects the
//! operator and participant signers, optionally registers affiliates and
//! serves the dashboard, then runs the bet → start → end cycle on a fixed
//! cadence until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use round_keeper::affiliate;
use round_keeper::chain::evm::EvmSubmitter;
use round_keeper::chain::TransactionSubmitter;
use round_keeper::config;
use round_keeper::dashboard::{self, routes::DashboardState};
use round_keeper::engine::orchestrator::RoundOrchestrator;
use round_keeper::engine::scheduler::CycleScheduler;
use round_keeper::engine::stats::KeeperStats;
use round_keeper::sampler::RandomPriceSampler;
use round_keeper::types::Participant;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    let round = cfg.round_config().context("Invalid [round] configuration")?;
    info!(
        pool = %round.pool_id,
        wager = %round.wager,
        cadence_secs = round.cadence.as_secs(),
        bet_phase_secs = round.bet_phase.as_secs(),
        offset_secs = round.start_to_end_offset.as_secs(),
        cooldown_secs = round.cooldown.as_secs(),
        mode = %round.bet_mode,
        "Round keeper starting up"
    );

    // -- Initialise components -------------------------------------------

    let evm = EvmSubmitter::new(
        &cfg.evm_settings(),
        &cfg.operator_key()?,
        &cfg.participant_keys()?,
    )?;
    let roster = Participant::roster(evm.participant_addresses());
    let submitter: Arc<dyn TransactionSubmitter> = Arc::new(evm);
    let policy = cfg.confirmation_policy();

    if cfg.affiliate.enabled {
        let outcomes =
            affiliate::register_participants(submitter.as_ref(), policy, &roster, cfg.referrer())
                .await;
        let failed = affiliate::failures(&outcomes);
        if failed > 0 {
            warn!(
                failed,
                total = outcomes.len(),
                "Some participants are not registered as affiliates; continuing"
            );
        }
    }

    let stats = Arc::new(KeeperStats::new());
    let orchestrator = RoundOrchestrator::new(
        &round,
        roster,
        submitter,
        Arc::new(RandomPriceSampler),
        policy,
        stats.clone(),
    );
    let scheduler = CycleScheduler::new(Arc::new(orchestrator), round.cadence, stats.clone());

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(
            Arc::new(DashboardState {
                stats,
                scheduler: scheduler.state(),
                pool_id: round.pool_id.to_string(),
                participants: cfg.betting.participant_key_envs.len(),
                cadence_secs: round.cadence.as_secs(),
            }),
            cfg.dashboard.port,
        );
    }

    // -- Main loop -------------------------------------------------------

    info!("Entering main loop. Press Ctrl+C to stop.");
    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("round_keeper=info"));

    if std::env::var("KEEPER_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
