//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Private keys are referenced by env-var name in the config and resolved
//! at startup into `SecretString`s. The round parameters are validated
//! once into an immutable [`RoundConfig`] that the engine consumes.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::chain::evm::EvmSettings;
use crate::chain::ConfirmationPolicy;
use crate::types::{BetMode, KeeperError, PoolId, PoolIdEncoding, TimestampMode};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub round: RoundSection,
    pub betting: BettingConfig,
    #[serde(default)]
    pub submitter: SubmitterConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub affiliate: AffiliateConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract_address: String,
    pub operator_key_env: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoundSection {
    pub pool_id: String,
    #[serde(default)]
    pub pool_id_encoding: PoolIdEncoding,
    /// Wager attached to each bet, in ether, as a decimal string.
    pub wager_eth: String,
    pub round_duration_secs: u64,
    pub cadence_secs: u64,
    pub bet_phase_secs: u64,
    pub start_to_end_offset_secs: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_max_price")]
    pub max_price: u64,
    #[serde(default)]
    pub timestamp_mode: TimestampMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BettingConfig {
    #[serde(default)]
    pub mode: BetMode,
    /// Env-var names holding participant private keys, in roster order.
    pub participant_key_envs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitterConfig {
    #[serde(default = "default_true")]
    pub await_confirmation: bool,
    /// Unset means wait forever.
    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            await_confirmation: true,
            confirmation_timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AffiliateConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Referrer passed to `registerAffiliate`; defaults to the zero address.
    #[serde(default)]
    pub referrer: Option<String>,
}

fn default_confirmations() -> usize {
    1
}

fn default_cooldown() -> u64 {
    5
}

fn default_max_price() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_dashboard_port() -> u16 {
    8080
}

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// Validated round configuration
// ---------------------------------------------------------------------------

/// Immutable round parameters, validated once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundConfig {
    pub pool_id: PoolId,
    pub wager: Decimal,
    /// Passed verbatim as the trigger's duration argument.
    pub round_duration_secs: u64,
    pub cadence: Duration,
    pub bet_phase: Duration,
    pub start_to_end_offset: Duration,
    pub cooldown: Duration,
    pub max_price: u64,
    pub timestamp_mode: TimestampMode,
    pub bet_mode: BetMode,
}

impl RoundConfig {
    /// Time from the first wager to the end of the cooldown, excluding
    /// however long the transactions themselves take.
    pub fn scheduled_span(&self) -> Duration {
        self.bet_phase + self.start_to_end_offset + self.cooldown
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validate the round section into a [`RoundConfig`].
    pub fn round_config(&self) -> std::result::Result<RoundConfig, KeeperError> {
        let r = &self.round;

        if self.betting.participant_key_envs.is_empty() {
            return Err(KeeperError::Config("at least one participant is required".into()));
        }
        if r.cadence_secs == 0 {
            return Err(KeeperError::Config("cadence_secs must be positive".into()));
        }
        if r.max_price == 0 {
            return Err(KeeperError::Config("max_price must be positive".into()));
        }

        let wager = Decimal::from_str(r.wager_eth.trim())
            .map_err(|e| KeeperError::Config(format!("wager_eth '{}': {e}", r.wager_eth)))?;
        if wager.is_sign_negative() {
            return Err(KeeperError::Config("wager_eth must not be negative".into()));
        }

        let cfg = RoundConfig {
            pool_id: PoolId::encode(&r.pool_id, r.pool_id_encoding)?,
            wager,
            round_duration_secs: r.round_duration_secs,
            cadence: Duration::from_secs(r.cadence_secs),
            bet_phase: Duration::from_secs(r.bet_phase_secs),
            start_to_end_offset: Duration::from_secs(r.start_to_end_offset_secs),
            cooldown: Duration::from_secs(r.cooldown_secs),
            max_price: r.max_price,
            timestamp_mode: r.timestamp_mode,
            bet_mode: self.betting.mode,
        };

        if cfg.bet_phase + cfg.start_to_end_offset >= cfg.cadence {
            warn!(
                span_secs = cfg.scheduled_span().as_secs(),
                cadence_secs = r.cadence_secs,
                "Cycle is longer than the cadence; overlapping ticks will be skipped"
            );
        } else if cfg.scheduled_span() > cfg.cadence {
            info!(
                span_secs = cfg.scheduled_span().as_secs(),
                cadence_secs = r.cadence_secs,
                "Cooldown will be cut short to end before the next tick"
            );
        }

        Ok(cfg)
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            await_confirmation: self.submitter.await_confirmation,
            timeout: self.submitter.confirmation_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn evm_settings(&self) -> EvmSettings {
        EvmSettings {
            rpc_url: self.chain.rpc_url.clone(),
            chain_id: self.chain.chain_id,
            pool_address: self.chain.contract_address.clone(),
            affiliate_address: self.affiliate.contract_address.clone(),
            confirmations: self.chain.confirmations,
        }
    }

    pub fn referrer(&self) -> &str {
        self.affiliate.referrer.as_deref().unwrap_or(ZERO_ADDRESS)
    }

    /// Resolve the operator key from its environment variable.
    pub fn operator_key(&self) -> Result<SecretString> {
        Self::resolve_secret(&self.chain.operator_key_env)
    }

    /// Resolve all participant keys, in roster order.
    pub fn participant_keys(&self) -> Result<Vec<SecretString>> {
        self.betting
            .participant_key_envs
            .iter()
            .map(|env| Self::resolve_secret(env))
            .collect()
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
