//! Shared types for the round keeper.
//!
//! These types form the data model used across all modules: who bets,
//! on which side, into which pool, and what came back from the ledger.
//! They carry no key material and no chain client types so that the
//! engine can be driven entirely by mocks.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Direction of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Up,
    Down,
}

impl Side {
    /// Encoding used by the pool contract's `upOrDown` flag.
    pub fn is_up(&self) -> bool {
        matches!(self, Side::Up)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Up => write!(f, "UP"),
            Side::Down => write!(f, "DOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Signers and participants
// ---------------------------------------------------------------------------

/// Reference to a signing identity held by the transaction submitter.
///
/// The engine only ever names signers; the submitter owns the keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerRef {
    /// The pool operator, which fires the round triggers.
    Operator,
    /// A betting participant, by position in the configured roster.
    Participant(usize),
}

impl fmt::Display for SignerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerRef::Operator => write!(f, "operator"),
            SignerRef::Participant(i) => write!(f, "participant#{i}"),
        }
    }
}

/// A configured bettor. Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Position in the configured roster.
    pub index: usize,
    /// Human-readable identity, usually the signer address.
    pub label: String,
    pub side: Side,
}

impl Participant {
    pub fn signer(&self) -> SignerRef {
        SignerRef::Participant(self.index)
    }

    /// Build the roster from an ordered list of labels.
    ///
    /// The first half of the list bets UP, the second half DOWN. With an
    /// odd count the extra participant lands on the UP side.
    pub fn roster<I, S>(labels: I) -> Vec<Participant>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let up_count = (labels.len() + 1) / 2;
        labels
            .into_iter()
            .enumerate()
            .map(|(index, label)| Participant {
                index,
                label,
                side: if index < up_count { Side::Up } else { Side::Down },
            })
            .collect()
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({})", self.index, self.label, self.side)
    }
}

// ---------------------------------------------------------------------------
// Pool identifier
// ---------------------------------------------------------------------------

/// How the configured pool identifier is turned into the contract's `bytes32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolIdEncoding {
    /// UTF-8 bytes, right-padded with zeros.
    #[default]
    Bytes32String,
    /// Hex-encoded bytes, right-padded with zeros (at most 32 bytes).
    Hex,
}

/// A 32-byte pool identifier as the contract sees it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub [u8; 32]);

impl PoolId {
    /// Encode a configured identifier with the given scheme.
    pub fn encode(raw: &str, encoding: PoolIdEncoding) -> Result<Self, KeeperError> {
        match encoding {
            PoolIdEncoding::Bytes32String => ethers::utils::format_bytes32_string(raw)
                .map(PoolId)
                .map_err(|e| KeeperError::Config(format!("pool id '{raw}': {e}"))),
            PoolIdEncoding::Hex => {
                let digits = raw.strip_prefix("0x").unwrap_or(raw);
                let bytes = hex::decode(digits)
                    .map_err(|e| KeeperError::Config(format!("pool id '{raw}': {e}")))?;
                if bytes.len() > 32 {
                    return Err(KeeperError::Config(format!(
                        "pool id '{raw}' is {} bytes, max 32",
                        bytes.len()
                    )));
                }
                let mut out = [0u8; 32];
                out[..bytes.len()].copy_from_slice(&bytes);
                Ok(PoolId(out))
            }
        }
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({self})")
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// How wagers are pushed to the ledger within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BetMode {
    /// Submit (and optionally confirm) one participant at a time.
    #[default]
    Sequential,
    /// Submit all participants at once, then await every confirmation.
    Concurrent,
}

impl fmt::Display for BetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetMode::Sequential => write!(f, "sequential"),
            BetMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Which timestamp the trigger transaction carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// Current unix time in seconds.
    #[default]
    Now,
    /// Always zero; the contract substitutes its own block time.
    Zero,
}

// ---------------------------------------------------------------------------
// Cycle phases
// ---------------------------------------------------------------------------

/// Phase of a single round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CyclePhase {
    Idle,
    PlacingBets,
    AwaitingStart,
    TriggeringStart,
    AwaitingEnd,
    TriggeringEnd,
    Cooldown,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CyclePhase::Idle => "IDLE",
            CyclePhase::PlacingBets => "PLACING_BETS",
            CyclePhase::AwaitingStart => "AWAITING_START",
            CyclePhase::TriggeringStart => "TRIGGERING_START",
            CyclePhase::AwaitingEnd => "AWAITING_END",
            CyclePhase::TriggeringEnd => "TRIGGERING_END",
            CyclePhase::Cooldown => "COOLDOWN",
        };
        write!(f, "{s}")
    }
}

/// Which of the two round triggers is being fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerPhase {
    Start,
    End,
}

impl fmt::Display for TriggerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerPhase::Start => write!(f, "start"),
            TriggerPhase::End => write!(f, "end"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction outcomes
// ---------------------------------------------------------------------------

/// Where a transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    /// The transaction never left the submitter.
    Submission,
    /// Sent, but not confirmed (reverted, dropped, or timed out).
    Confirmation,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Submission => write!(f, "submission"),
            FailureStage::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// Final state of one transaction as far as the engine cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutcome {
    /// Submitted; confirmation was not awaited.
    Submitted { tx_hash: String },
    /// Submitted and confirmed.
    Confirmed { tx_hash: String, block: Option<u64> },
    Failed { stage: FailureStage, reason: String },
}

impl TxOutcome {
    pub fn failed(error: &KeeperError) -> Self {
        TxOutcome::Failed {
            stage: error.stage(),
            reason: error.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TxOutcome::Failed { .. })
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            TxOutcome::Submitted { tx_hash } | TxOutcome::Confirmed { tx_hash, .. } => Some(tx_hash),
            TxOutcome::Failed { .. } => None,
        }
    }
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxOutcome::Submitted { tx_hash } => write!(f, "submitted {tx_hash}"),
            TxOutcome::Confirmed { tx_hash, block } => match block {
                Some(b) => write!(f, "confirmed {tx_hash} in block {b}"),
                None => write!(f, "confirmed {tx_hash}"),
            },
            TxOutcome::Failed { stage, reason } => write!(f, "failed at {stage}: {reason}"),
        }
    }
}

/// Outcome of one participant's wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetOutcome {
    pub participant: Participant,
    pub outcome: TxOutcome,
}

/// Outcome of one round trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    pub phase: TriggerPhase,
    pub price: u64,
    pub timestamp: u64,
    pub outcome: TxOutcome,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised at the transaction-submitter seam and during validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeeperError {
    #[error("Submission failed ({signer}): {message}")]
    Submission { signer: SignerRef, message: String },

    #[error("Confirmation failed ({tx_hash}): {message}")]
    Confirmation { tx_hash: String, message: String },

    #[error("Confirmation timed out after {secs}s ({tx_hash})")]
    ConfirmationTimeout { tx_hash: String, secs: u64 },

    #[error("Unknown signer: {0}")]
    UnknownSigner(SignerRef),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KeeperError {
    /// Which stage of a transaction's life this error belongs to.
    pub fn stage(&self) -> FailureStage {
        match self {
            KeeperError::Confirmation { .. } | KeeperError::ConfirmationTimeout { .. } => {
                FailureStage::Confirmation
            }
            _ => FailureStage::Submission,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
