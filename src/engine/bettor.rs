//! Bet placer.
//!
//! Issues one wager per configured participant into the cycle's pool.
//! A participant's failure is logged and recorded but never stops the
//! remaining participants: every participant is attempted exactly once
//! per call, in either submission mode.
//!
//! Issuing and settling are separate steps. The orchestrator starts its
//! bet-phase clock as soon as [`BetPlacer::issue_all`] returns and
//! settles the receipts while that clock runs.

use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::chain::{ConfirmationPolicy, ContractCall, PendingTx, TransactionSubmitter};
use crate::types::{BetMode, BetOutcome, KeeperError, Participant, PoolId, TxOutcome};

/// A wager that has been sent (or failed to send), receipt not yet known.
#[derive(Debug)]
pub struct IssuedBet {
    pub participant: Participant,
    pub submitted: Result<PendingTx, KeeperError>,
}

pub struct BetPlacer {
    submitter: Arc<dyn TransactionSubmitter>,
    policy: ConfirmationPolicy,
    participants: Vec<Participant>,
    pool_id: PoolId,
    wager: Decimal,
    mode: BetMode,
}

impl BetPlacer {
    pub fn new(
        submitter: Arc<dyn TransactionSubmitter>,
        policy: ConfirmationPolicy,
        participants: Vec<Participant>,
        pool_id: PoolId,
        wager: Decimal,
        mode: BetMode,
    ) -> Self {
        Self {
            submitter,
            policy,
            participants,
            pool_id,
            wager,
            mode,
        }
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Send one wager per participant, in roster order. Returns once every
    /// submission has been accepted or rejected; receipts are not awaited.
    pub async fn issue_all(&self) -> Vec<IssuedBet> {
        info!(
            participants = self.participants.len(),
            mode = %self.mode,
            pool = %self.pool_id,
            wager = %self.wager,
            "Placing bets"
        );

        match self.mode {
            BetMode::Sequential => {
                let mut issued = Vec::with_capacity(self.participants.len());
                for p in &self.participants {
                    issued.push(self.issue(p).await);
                }
                issued
            }
            BetMode::Concurrent => join_all(self.participants.iter().map(|p| self.issue(p))).await,
        }
    }

    /// Resolve every issued wager under the confirmation policy, giving up
    /// on receipts at `deadline`. Outcomes are in roster order.
    pub async fn settle_all(&self, issued: Vec<IssuedBet>, deadline: Instant) -> Vec<BetOutcome> {
        let outcomes = join_all(issued.into_iter().map(|bet| async move {
            let outcome = match &bet.submitted {
                Ok(pending) => {
                    self.policy
                        .resolve_until(self.submitter.as_ref(), pending, deadline)
                        .await
                }
                Err(e) => TxOutcome::failed(e),
            };
            log_outcome(&bet.participant, &outcome);
            BetOutcome {
                participant: bet.participant,
                outcome,
            }
        }))
        .await;

        let failed = outcomes.iter().filter(|b| b.outcome.is_failed()).count();
        info!(
            placed = outcomes.len() - failed,
            failed,
            "Bet placement complete"
        );
        outcomes
    }

    async fn issue(&self, p: &Participant) -> IssuedBet {
        let call = ContractCall::PlaceWager {
            pool_id: self.pool_id,
            side: p.side,
        };
        let submitted = self
            .submitter
            .submit(p.signer(), &call, Some(self.wager))
            .await;
        IssuedBet {
            participant: p.clone(),
            submitted,
        }
    }
}

fn log_outcome(p: &Participant, outcome: &TxOutcome) {
    match outcome {
        TxOutcome::Failed { stage, reason } => warn!(
            participant = %p.label,
            index = p.index,
            side = %p.side,
            %stage,
            reason = %reason,
            "Wager failed"
        ),
        ok => info!(
            participant = %p.label,
            index = p.index,
            side = %p.side,
            result = %ok,
            "Placed {} bet",
            p.side
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
