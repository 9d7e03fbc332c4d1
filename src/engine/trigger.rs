//! Round trigger.
//!
//! Fires the pool's `trigger` call for the start or the end of a round.
//! Both phases hit the same contract function; they differ only in the
//! freshly sampled price they carry. Like the bet placer, a trigger is
//! issued first and its receipt settled later.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};

use crate::chain::{ConfirmationPolicy, ContractCall, PendingTx, TransactionSubmitter};
use crate::sampler::PriceSampler;
use crate::types::{
    KeeperError, PoolId, SignerRef, TimestampMode, TriggerOutcome, TriggerPhase, TxOutcome,
};

/// A trigger that has been sent (or failed to send).
#[derive(Debug)]
pub struct IssuedTrigger {
    pub phase: TriggerPhase,
    pub price: u64,
    pub timestamp: u64,
    pub submitted: Result<PendingTx, KeeperError>,
}

pub struct RoundTrigger {
    submitter: Arc<dyn TransactionSubmitter>,
    sampler: Arc<dyn PriceSampler>,
    policy: ConfirmationPolicy,
    pool_id: PoolId,
    max_price: u64,
    round_duration_secs: u64,
    timestamp_mode: TimestampMode,
}

impl RoundTrigger {
    pub fn new(
        submitter: Arc<dyn TransactionSubmitter>,
        sampler: Arc<dyn PriceSampler>,
        policy: ConfirmationPolicy,
        pool_id: PoolId,
        max_price: u64,
        round_duration_secs: u64,
        timestamp_mode: TimestampMode,
    ) -> Self {
        Self {
            submitter,
            sampler,
            policy,
            pool_id,
            max_price,
            round_duration_secs,
            timestamp_mode,
        }
    }

    /// Sample a price and submit exactly one trigger transaction.
    pub async fn issue(&self, phase: TriggerPhase) -> IssuedTrigger {
        let price = self.sampler.sample(self.max_price);
        let timestamp = match self.timestamp_mode {
            TimestampMode::Now => Utc::now().timestamp().max(0) as u64,
            TimestampMode::Zero => 0,
        };

        let call = ContractCall::TriggerRound {
            pool_id: self.pool_id,
            timestamp,
            price,
            duration: self.round_duration_secs,
        };
        let submitted = self.submitter.submit(SignerRef::Operator, &call, None).await;
        info!(%phase, price, timestamp, sent = submitted.is_ok(), "Trigger issued");

        IssuedTrigger {
            phase,
            price,
            timestamp,
            submitted,
        }
    }

    /// Resolve an issued trigger, giving up on its receipt at `deadline`.
    ///
    /// Failures are returned in the outcome, never propagated.
    pub async fn settle(&self, issued: IssuedTrigger, deadline: Instant) -> TriggerOutcome {
        let outcome = match &issued.submitted {
            Ok(pending) => {
                self.policy
                    .resolve_until(self.submitter.as_ref(), pending, deadline)
                    .await
            }
            Err(e) => TxOutcome::failed(e),
        };

        match &outcome {
            TxOutcome::Failed { stage, reason } => error!(
                alert = true,
                phase = %issued.phase,
                price = issued.price,
                %stage,
                reason = %reason,
                "Round trigger failed; on-chain round is not reconciled"
            ),
            ok => info!(
                phase = %issued.phase,
                price = issued.price,
                timestamp = issued.timestamp,
                result = %ok,
                "Trigger called"
            ),
        }

        TriggerOutcome {
            phase: issued.phase,
            price: issued.price,
            timestamp: issued.timestamp,
            outcome,
        }
    }
}
