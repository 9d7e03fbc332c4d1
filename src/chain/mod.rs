//! Ledger access.
//!
//! Defines the `TransactionSubmitter` trait the engine talks to, the call
//! descriptors it sends, and the confirmation policy that decides whether
//! and how long the engine waits for a receipt. The `evm` module provides
//! the `ethers`-backed implementation.

pub mod evm;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{KeeperError, PoolId, Side, SignerRef, TxOutcome};

// ---------------------------------------------------------------------------
// Call descriptors
// ---------------------------------------------------------------------------

/// A contract call, independent of any ABI encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// `makeTrade((bytes32 poolId, bool upOrDown))`, payable.
    PlaceWager { pool_id: PoolId, side: Side },
    /// `trigger(bytes32 poolId, uint256 timestamp, uint256 price, uint256 duration)`.
    TriggerRound {
        pool_id: PoolId,
        timestamp: u64,
        price: u64,
        duration: u64,
    },
    /// `registerAffiliate(address referrer)` on the affiliate manager.
    RegisterAffiliate { referrer: String },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            ContractCall::PlaceWager { .. } => "makeTrade",
            ContractCall::TriggerRound { .. } => "trigger",
            ContractCall::RegisterAffiliate { .. } => "registerAffiliate",
        }
    }
}

/// Handle to a transaction that has been sent but not necessarily mined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub tx_hash: String,
    pub signer: SignerRef,
}

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: String,
    pub block: Option<u64>,
}

// ---------------------------------------------------------------------------
// Submitter trait
// ---------------------------------------------------------------------------

/// Abstraction over whatever actually signs and broadcasts transactions.
///
/// Submission and confirmation are separate steps so callers can either
/// overlap them (fire many, then await all) or serialize them.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Sign and broadcast `call` as `signer`, attaching `value` (in ether).
    async fn submit(
        &self,
        signer: SignerRef,
        call: &ContractCall,
        value: Option<Decimal>,
    ) -> Result<PendingTx, KeeperError>;

    /// Wait until the transaction is mined and succeeded.
    /// A reverted or dropped transaction is an error.
    async fn await_confirmation(&self, pending: &PendingTx) -> Result<Confirmation, KeeperError>;

    /// Submitter name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Confirmation policy
// ---------------------------------------------------------------------------

/// Whether to wait for receipts, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub await_confirmation: bool,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            await_confirmation: true,
            timeout: None,
        }
    }
}

impl ConfirmationPolicy {
    /// Resolve a pending transaction into an outcome under this policy.
    pub async fn resolve(
        &self,
        submitter: &dyn TransactionSubmitter,
        pending: &PendingTx,
    ) -> TxOutcome {
        if !self.await_confirmation {
            return TxOutcome::Submitted {
                tx_hash: pending.tx_hash.clone(),
            };
        }

        let result = match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, submitter.await_confirmation(pending)).await {
                    Ok(r) => r,
                    Err(_) => Err(KeeperError::ConfirmationTimeout {
                        tx_hash: pending.tx_hash.clone(),
                        secs: limit.as_secs(),
                    }),
                }
            }
            None => submitter.await_confirmation(pending).await,
        };

        match result {
            Ok(c) => {
                debug!(tx_hash = %c.tx_hash, block = ?c.block, "Transaction confirmed");
                TxOutcome::Confirmed {
                    tx_hash: c.tx_hash,
                    block: c.block,
                }
            }
            Err(e) => TxOutcome::failed(&e),
        }
    }

    /// Like [`resolve`](Self::resolve), but gives up at `deadline`.
    ///
    /// A receipt that has not arrived by then is reported as `Submitted`:
    /// the transaction was sent, its fate is unknown to this cycle.
    pub async fn resolve_until(
        &self,
        submitter: &dyn TransactionSubmitter,
        pending: &PendingTx,
        deadline: Instant,
    ) -> TxOutcome {
        match tokio::time::timeout_at(deadline, self.resolve(submitter, pending)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    tx_hash = %pending.tx_hash,
                    signer = %pending.signer,
                    "Receipt still pending at cycle deadline"
                );
                TxOutcome::Submitted {
                    tx_hash: pending.tx_hash.clone(),
                }
            }
        }
    }

    /// Submit and resolve in one step.
    pub async fn submit_and_resolve(
        &self,
        submitter: &dyn TransactionSubmitter,
        signer: SignerRef,
        call: &ContractCall,
        value: Option<Decimal>,
    ) -> TxOutcome {
        match submitter.submit(signer, call, value).await {
            Ok(pending) => self.resolve(submitter, &pending).await,
            Err(e) => TxOutcome::failed(&e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
