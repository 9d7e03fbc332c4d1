//! EVM transaction submitter.
//!
//! Signs with one `LocalWallet` per configured identity and talks to the
//! pool and affiliate contracts through `abigen!` bindings over HTTP.
//!
//! # Nonces
//!
//! Each signer has its own nonce sequence, so concurrent wagers from
//! different participants are safe. Two calls from the *same* signer in
//! flight at once are not; the engine never does that.

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{abigen, FunctionCall};
use ethers::prelude::*;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Confirmation, ContractCall, PendingTx, TransactionSubmitter};
use crate::types::{KeeperError, SignerRef};

abigen!(
    RoundPool,
    r#"[
        struct TradeParams { bytes32 poolId; bool upOrDown; }
        function makeTrade(TradeParams calldata params) external payable
        function trigger(bytes32 poolId, uint256 timeMS, uint256 price, uint256 duration) external
    ]"#
);

abigen!(
    AffiliateManager,
    r#"[
        function registerAffiliate(address _referrer) external
    ]"#
);

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Connection settings for [`EvmSubmitter`].
#[derive(Debug, Clone)]
pub struct EvmSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    pub pool_address: String,
    pub affiliate_address: Option<String>,
    /// Blocks to wait on top of the inclusion block.
    pub confirmations: usize,
}

pub struct EvmSubmitter {
    provider: Provider<Http>,
    operator: Arc<Client>,
    participants: Vec<Arc<Client>>,
    pool_address: Address,
    affiliate_address: Option<Address>,
    confirmations: usize,
}

impl EvmSubmitter {
    /// Build signer clients for the operator and every participant key.
    pub fn new(
        settings: &EvmSettings,
        operator_key: &SecretString,
        participant_keys: &[SecretString],
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str())
            .with_context(|| format!("Invalid RPC URL: {}", settings.rpc_url))?;

        let connect = |key: &SecretString, what: &str| -> anyhow::Result<Arc<Client>> {
            let wallet = key
                .expose_secret()
                .parse::<LocalWallet>()
                .with_context(|| format!("Invalid private key for {what}"))?
                .with_chain_id(settings.chain_id);
            Ok(Arc::new(SignerMiddleware::new(provider.clone(), wallet)))
        };

        let operator = connect(operator_key, "operator")?;
        let participants = participant_keys
            .iter()
            .enumerate()
            .map(|(i, k)| connect(k, &format!("participant #{i}")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let pool_address: Address = settings
            .pool_address
            .parse()
            .with_context(|| format!("Invalid pool contract address: {}", settings.pool_address))?;
        let affiliate_address = settings
            .affiliate_address
            .as_deref()
            .map(|a| {
                a.parse::<Address>()
                    .with_context(|| format!("Invalid affiliate contract address: {a}"))
            })
            .transpose()?;

        info!(
            rpc = %settings.rpc_url,
            chain_id = settings.chain_id,
            operator = %format!("{:#x}", operator.address()),
            participants = participants.len(),
            pool = %format!("{pool_address:#x}"),
            "EVM submitter ready"
        );

        Ok(Self {
            provider,
            operator,
            participants,
            pool_address,
            affiliate_address,
            confirmations: settings.confirmations,
        })
    }

    /// Lower-case hex addresses of the participants, in roster order.
    pub fn participant_addresses(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|c| format!("{:#x}", c.address()))
            .collect()
    }

    fn client(&self, signer: SignerRef) -> Result<Arc<Client>, KeeperError> {
        match signer {
            SignerRef::Operator => Ok(self.operator.clone()),
            SignerRef::Participant(i) => self
                .participants
                .get(i)
                .cloned()
                .ok_or(KeeperError::UnknownSigner(signer)),
        }
    }
}

/// Broadcast a prepared call and return its hash without waiting.
async fn broadcast<D>(
    call: FunctionCall<Arc<Client>, Client, D>,
    signer: SignerRef,
) -> Result<TxHash, KeeperError>
where
    D: Detokenize + Send + Sync,
{
    let pending = call.send().await.map_err(|e| KeeperError::Submission {
        signer,
        message: e.to_string(),
    })?;
    Ok(pending.tx_hash())
}

fn to_wei(value: Decimal, signer: SignerRef) -> Result<U256, KeeperError> {
    ethers::utils::parse_ether(value.to_string()).map_err(|e| KeeperError::Submission {
        signer,
        message: format!("invalid value {value}: {e}"),
    })
}

#[async_trait]
impl TransactionSubmitter for EvmSubmitter {
    async fn submit(
        &self,
        signer: SignerRef,
        call: &ContractCall,
        value: Option<Decimal>,
    ) -> Result<PendingTx, KeeperError> {
        let client = self.client(signer)?;

        let hash = match call {
            ContractCall::PlaceWager { pool_id, side } => {
                let pool = RoundPool::new(self.pool_address, client);
                let mut tx = pool.make_trade(TradeParams {
                    pool_id: pool_id.0,
                    up_or_down: side.is_up(),
                });
                if let Some(v) = value {
                    tx = tx.value(to_wei(v, signer)?);
                }
                broadcast(tx, signer).await?
            }
            ContractCall::TriggerRound {
                pool_id,
                timestamp,
                price,
                duration,
            } => {
                let pool = RoundPool::new(self.pool_address, client);
                let tx = pool.trigger(
                    pool_id.0,
                    U256::from(*timestamp),
                    U256::from(*price),
                    U256::from(*duration),
                );
                broadcast(tx, signer).await?
            }
            ContractCall::RegisterAffiliate { referrer } => {
                let address = self.affiliate_address.ok_or_else(|| {
                    KeeperError::Config("affiliate contract address not configured".into())
                })?;
                let referrer: Address = referrer.parse().map_err(|_| {
                    KeeperError::Config(format!("invalid referrer address: {referrer}"))
                })?;
                let manager = AffiliateManager::new(address, client);
                broadcast(manager.register_affiliate(referrer), signer).await?
            }
        };

        let tx_hash = format!("{hash:#x}");
        debug!(%signer, call = call.name(), %tx_hash, "Transaction broadcast");
        Ok(PendingTx { tx_hash, signer })
    }

    async fn await_confirmation(&self, pending: &PendingTx) -> Result<Confirmation, KeeperError> {
        let fail = |message: String| KeeperError::Confirmation {
            tx_hash: pending.tx_hash.clone(),
            message,
        };

        let hash: TxHash = pending
            .tx_hash
            .parse()
            .map_err(|_| fail("malformed transaction hash".into()))?;

        let receipt = PendingTransaction::new(hash, &self.provider)
            .confirmations(self.confirmations)
            .await
            .map_err(|e| fail(e.to_string()))?
            .ok_or_else(|| fail("dropped from mempool".into()))?;

        if receipt.status == Some(U64::zero()) {
            return Err(fail("reverted".into()));
        }

        Ok(Confirmation {
            tx_hash: pending.tx_hash.clone(),
            block: receipt.block_number.map(|b| b.as_u64()),
        })
    }

    fn name(&self) -> &str {
        "evm"
    }
}
