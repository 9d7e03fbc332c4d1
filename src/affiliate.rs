//! One-shot affiliate registration.
//!
//! Run once at startup, before the scheduler: every participant calls
//! `registerAffiliate(referrer)` on the affiliate manager. Each
//! registration is awaited before the next is sent, and a failure only
//! affects its own participant.

use tracing::{info, warn};

use crate::chain::{ConfirmationPolicy, ContractCall, TransactionSubmitter};
use crate::types::{Participant, TxOutcome};

/// Result of one participant's registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub participant: Participant,
    pub outcome: TxOutcome,
}

/// Number of registrations that failed.
pub fn failures(outcomes: &[RegistrationOutcome]) -> usize {
    outcomes.iter().filter(|o| o.outcome.is_failed()).count()
}

pub async fn register_participants(
    submitter: &dyn TransactionSubmitter,
    policy: ConfirmationPolicy,
    participants: &[Participant],
    referrer: &str,
) -> Vec<RegistrationOutcome> {
    // Registration always waits for the receipt.
    let policy = ConfirmationPolicy {
        await_confirmation: true,
        ..policy
    };
    let call = ContractCall::RegisterAffiliate {
        referrer: referrer.to_string(),
    };

    let mut outcomes = Vec::with_capacity(participants.len());
    for p in participants {
        let outcome = policy
            .submit_and_resolve(submitter, p.signer(), &call, None)
            .await;
        match &outcome {
            TxOutcome::Failed { stage, reason } => warn!(
                participant = %p.label,
                %stage,
                reason = %reason,
                "Affiliate registration failed"
            ),
            ok => info!(participant = %p.label, %referrer, result = %ok, "Registered affiliate"),
        }
        outcomes.push(RegistrationOutcome {
            participant: p.clone(),
            outcome,
        });
    }

    let failed = failures(&outcomes);
    info!(
        registered = outcomes.len() - failed,
        failed, "Affiliate registration complete"
    );
    outcomes
}
