//! Mock chain for integration testing.
//!
//! Provides a deterministic `TransactionSubmitter` that records every
//! submission with its (virtual) time offset, and can be told to fail or
//! panic for chosen signers or calls. All state is in-memory.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use round_keeper::chain::{Confirmation, ContractCall, PendingTx, TransactionSubmitter};
use round_keeper::sampler::PriceSampler;
use round_keeper::types::{KeeperError, SignerRef};

/// One recorded submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub at: Duration,
    pub signer: SignerRef,
    pub call: ContractCall,
    pub value: Option<Decimal>,
}

impl Submission {
    pub fn is_wager(&self) -> bool {
        matches!(self.call, ContractCall::PlaceWager { .. })
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self.call, ContractCall::TriggerRound { .. })
    }

    pub fn price(&self) -> Option<u64> {
        match self.call {
            ContractCall::TriggerRound { price, .. } => Some(price),
            _ => None,
        }
    }
}

pub struct MockChain {
    origin: Instant,
    latency: Duration,
    confirm_delay: Duration,
    submissions: Mutex<Vec<Submission>>,
    failing: Mutex<HashSet<SignerRef>>,
    panic_on_trigger: Mutex<bool>,
}

impl MockChain {
    /// Must be created inside the test runtime; offsets are measured from here.
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Each submission takes `latency` to be accepted.
    pub fn with_latency(latency: Duration) -> Self {
        Self::with_delays(latency, Duration::ZERO)
    }

    /// Each submission takes `latency` to be accepted and its receipt
    /// arrives `confirm_delay` after that.
    pub fn with_delays(latency: Duration, confirm_delay: Duration) -> Self {
        Self {
            origin: Instant::now(),
            latency,
            confirm_delay,
            submissions: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            panic_on_trigger: Mutex::new(false),
        }
    }

    /// Reject every submission from `signer`.
    pub fn fail_signer(&self, signer: SignerRef) {
        self.failing.lock().unwrap().insert(signer);
    }

    /// Panic inside the next trigger submission.
    pub fn panic_on_trigger(&self) {
        *self.panic_on_trigger.lock().unwrap() = true;
    }

    /// Virtual time since the chain was created.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn wagers(&self) -> Vec<Submission> {
        self.submissions().into_iter().filter(|s| s.is_wager()).collect()
    }

    pub fn triggers(&self) -> Vec<Submission> {
        self.submissions().into_iter().filter(|s| s.is_trigger()).collect()
    }
}

#[async_trait]
impl TransactionSubmitter for MockChain {
    async fn submit(
        &self,
        signer: SignerRef,
        call: &ContractCall,
        value: Option<Decimal>,
    ) -> Result<PendingTx, KeeperError> {
        let n = {
            let mut subs = self.submissions.lock().unwrap();
            subs.push(Submission {
                at: self.origin.elapsed(),
                signer,
                call: call.clone(),
                value,
            });
            subs.len()
        };

        if matches!(call, ContractCall::TriggerRound { .. }) {
            let mut armed = self.panic_on_trigger.lock().unwrap();
            if *armed {
                *armed = false;
                drop(armed);
                panic!("mock chain: trigger exploded");
            }
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failing.lock().unwrap().contains(&signer) {
            return Err(KeeperError::Submission {
                signer,
                message: "insufficient funds for gas * price + value".into(),
            });
        }
        Ok(PendingTx {
            tx_hash: format!("0x{n:064x}"),
            signer,
        })
    }

    async fn await_confirmation(&self, pending: &PendingTx) -> Result<Confirmation, KeeperError> {
        if !self.confirm_delay.is_zero() {
            tokio::time::sleep(self.confirm_delay).await;
        }
        Ok(Confirmation {
            tx_hash: pending.tx_hash.clone(),
            block: Some(1),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Deterministic sampler: returns 1, 2, 3, ... and counts its draws.
#[derive(Default)]
pub struct CountingSampler {
    draws: AtomicU64,
}

impl CountingSampler {
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::SeqCst)
    }
}

impl PriceSampler for CountingSampler {
    fn sample(&self, max: u64) -> u64 {
        let n = self.draws.fetch_add(1, Ordering::SeqCst) + 1;
        (n - 1) % max.max(1) + 1
    }
}
