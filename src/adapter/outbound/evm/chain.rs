//! JSON-RPC implementation of the oracle and chain-reader ports.

use std::fmt::Display;
use std::future::IntoFuture;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_provider::network::{EthereumWallet, ReceiptResponse};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{Filter, Log, TransactionReceipt};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::abi::{IMarket, IMarketFactory, IOracle};
use crate::domain::{MarketId, Outcome, TxHash, TxReceipt};
use crate::error::{ConfigError, Error, OracleError, Result};
use crate::infrastructure::config::ChainConfig;
use crate::port::{
    Broadcast, ChainReader, GasParams, MarketChainState, MarketCreatedEvent, OnChainCommitment,
    OracleCall, OracleContract,
};

/// Oracle contract and chain reads over one HTTP provider.
///
/// Without a private key the adapter is read-only and every submission
/// fails with [`OracleError::Signer`].
pub struct EvmChain {
    provider: DynProvider,
    oracle: Address,
    factory: Address,
    chain_id: u64,
    signer: Option<Address>,
    timeout: Duration,
}

impl EvmChain {
    /// Build the provider. No network traffic happens here.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC URL or private key is invalid.
    pub fn connect(config: &ChainConfig) -> Result<Self> {
        let rpc_url: url::Url =
            config
                .rpc_url
                .parse()
                .map_err(|e: url::ParseError| ConfigError::InvalidValue {
                    field: "chain.rpc_url",
                    reason: e.to_string(),
                })?;

        let key = config
            .private_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        let (provider, signer) = match key {
            Some(key) => {
                let signer =
                    PrivateKeySigner::from_str(key).map_err(|e| ConfigError::InvalidValue {
                        field: "ORACLED_PRIVATE_KEY",
                        reason: e.to_string(),
                    })?;
                let address = signer.address();
                let wallet = EthereumWallet::from(signer);
                let provider = ProviderBuilder::new()
                    .wallet(wallet)
                    .connect_http(rpc_url)
                    .erased();
                (provider, Some(address))
            }
            None => (ProviderBuilder::new().connect_http(rpc_url).erased(), None),
        };

        Ok(Self {
            provider,
            oracle: config.oracle_address,
            factory: config.factory_address,
            chain_id: config.chain_id,
            signer,
            timeout: Duration::from_millis(config.rpc_timeout_ms),
        })
    }

    /// Address transactions are sent from, if a key is loaded.
    #[must_use]
    pub fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    /// Compare the node's chain id against the configured one.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unreachable or on another chain.
    pub async fn verify_chain_id(&self) -> Result<()> {
        let actual = self
            .rpc("eth_chainId", self.provider.get_chain_id())
            .await?;
        if actual != self.chain_id {
            return Err(ConfigError::InvalidValue {
                field: "chain.chain_id",
                reason: format!("node reports chain {actual}, expected {}", self.chain_id),
            }
            .into());
        }
        info!(chain_id = actual, signer = ?self.signer, "Connected to chain");
        Ok(())
    }

    /// Await `call` under the configured timeout.
    async fn bounded<T, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: IntoFuture<Output = T>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| OracleError::Rpc(format!("{what}: timed out after {:?}", self.timeout)).into())
    }

    /// Run one read-only RPC call under the configured timeout.
    async fn rpc<T, E, F>(&self, what: &str, call: F) -> Result<T>
    where
        E: Display,
        F: IntoFuture<Output = std::result::Result<T, E>>,
    {
        self.bounded(what, call)
            .await?
            .map_err(|e| OracleError::Rpc(format!("{what}: {e}")).into())
    }

    fn require_signer(&self) -> Result<Address> {
        self.signer
            .ok_or_else(|| OracleError::Signer("no private key loaded".to_string()).into())
    }
}

#[async_trait]
impl OracleContract for EvmChain {
    async fn dispute_window(&self) -> Result<Duration> {
        let oracle = IOracle::new(self.oracle, &self.provider);
        let secs = self
            .rpc("disputeWindow", oracle.disputeWindow().call())
            .await?;
        Ok(Duration::from_secs(secs))
    }

    async fn pending(&self, market: &MarketId) -> Result<OnChainCommitment> {
        let oracle = IOracle::new(self.oracle, &self.provider);
        let raw = self
            .rpc("pending", oracle.pending(market.address()).call())
            .await?;
        Ok(commitment_from(&raw))
    }

    async fn estimate_gas(&self, call: &OracleCall) -> Result<u64> {
        let oracle = IOracle::new(self.oracle, &self.provider);
        let from = self.signer.unwrap_or_default();
        let estimate = match call {
            OracleCall::Commit {
                market,
                outcome,
                data_hash,
            } => {
                let builder = oracle
                    .commit(market.address(), outcome.code(), *data_hash)
                    .from(from);
                self.bounded("estimateGas", builder.estimate_gas()).await?
            }
            OracleCall::Finalize { market } => {
                let builder = oracle.finalize(market.address()).from(from);
                self.bounded("estimateGas", builder.estimate_gas()).await?
            }
        };
        estimate.map_err(|e| classify_revert(call, &e.to_string()))
    }

    async fn submit(&self, call: &OracleCall, gas: GasParams) -> Result<Broadcast> {
        let signer = self.require_signer()?;
        let nonce = match gas.nonce {
            Some(nonce) => nonce,
            None => {
                self.rpc(
                    "eth_getTransactionCount",
                    self.provider.get_transaction_count(signer).pending(),
                )
                .await?
            }
        };
        let oracle = IOracle::new(self.oracle, &self.provider);
        let sent = match call {
            OracleCall::Commit {
                market,
                outcome,
                data_hash,
            } => {
                let builder = oracle
                    .commit(market.address(), outcome.code(), *data_hash)
                    .gas(gas.gas_limit)
                    .gas_price(gas.gas_price)
                    .nonce(nonce);
                self.bounded("sendTransaction", builder.send()).await?
            }
            OracleCall::Finalize { market } => {
                let builder = oracle
                    .finalize(market.address())
                    .gas(gas.gas_limit)
                    .gas_price(gas.gas_price)
                    .nonce(nonce);
                self.bounded("sendTransaction", builder.send()).await?
            }
        };
        let pending = sent.map_err(|e| classify_revert(call, &e.to_string()))?;
        let hash = *pending.tx_hash();
        debug!(
            tx = %hash,
            nonce,
            market = %call.market(),
            kind = %call.kind(),
            "Transaction broadcast"
        );
        Ok(Broadcast { hash, nonce })
    }
}

#[async_trait]
impl ChainReader for EvmChain {
    async fn block_number(&self) -> Result<u64> {
        self.rpc("eth_blockNumber", self.provider.get_block_number())
            .await
    }

    async fn gas_price(&self) -> Result<u128> {
        self.rpc("eth_gasPrice", self.provider.get_gas_price()).await
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<TxReceipt>> {
        let receipt = self
            .rpc(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(*hash),
            )
            .await?;
        Ok(receipt.as_ref().map(receipt_from))
    }

    async fn market_created_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MarketCreatedEvent>> {
        let filter = Filter::new()
            .address(self.factory)
            .event_signature(IMarketFactory::MarketCreated::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.rpc("eth_getLogs", self.provider.get_logs(&filter)).await?;

        let total = logs.len();
        let events: Vec<_> = logs.iter().filter_map(event_from_log).collect();
        if events.len() < total {
            warn!(
                from_block,
                to_block,
                skipped = total - events.len(),
                "Skipped undecodable MarketCreated logs"
            );
        }
        Ok(events)
    }

    async fn market_state(&self, market: &MarketId) -> Result<MarketChainState> {
        let contract = IMarket::new(market.address(), &self.provider);
        let title_call = contract.title();
        let resolve_time_call = contract.resolveTime();
        let resolved_call = contract.resolved();
        let (title, resolve_time, resolved) = tokio::try_join!(
            self.rpc("title", title_call.call()),
            self.rpc("resolveTime", resolve_time_call.call()),
            self.rpc("resolved", resolved_call.call()),
        )?;

        Ok(MarketChainState {
            title,
            resolve_time: unix_time(resolve_time),
            resolved,
        })
    }
}

/// Zero means unset.
fn unix_time(secs: u64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

fn commitment_from(raw: &IOracle::pendingReturn) -> OnChainCommitment {
    OnChainCommitment {
        outcome: Outcome::from_code(raw.outcome),
        data_hash: raw.dataHash,
        commit_time: unix_time(raw.commitTime),
        committed: raw.committed,
        finalized: raw.finalized,
    }
}

fn receipt_from(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        hash: ReceiptResponse::transaction_hash(receipt),
        success: ReceiptResponse::status(receipt),
        block_number: ReceiptResponse::block_number(receipt),
        gas_used: ReceiptResponse::gas_used(receipt),
    }
}

/// Decode a factory log; `None` when any part is missing or malformed.
fn event_from_log(log: &Log) -> Option<MarketCreatedEvent> {
    let decoded = log.log_decode::<IMarketFactory::MarketCreated>().ok()?;
    let event = decoded.inner.data;
    let params = serde_json::from_slice(&event.params).ok()?;

    Some(MarketCreatedEvent {
        market: MarketId::new(event.market),
        creator: event.creator,
        market_type: event.marketType,
        params,
        transaction_hash: log.transaction_hash?,
        log_index: log.log_index?,
        block_number: log.block_number?,
        contract_address: log.address(),
    })
}

/// Map a revert reason onto the oracle's idempotency errors.
fn classify_revert(call: &OracleCall, message: &str) -> Error {
    let market = call.market();
    let lower = message.to_ascii_lowercase();
    let compact: String = lower.chars().filter(|c| c.is_ascii_alphanumeric()).collect();

    let err = if compact.contains("alreadycommitted") {
        OracleError::AlreadyCommitted { market }
    } else if compact.contains("alreadyfinalized") {
        OracleError::AlreadyFinalized { market }
    } else if compact.contains("notcommitted") {
        OracleError::NotCommitted { market }
    } else if compact.contains("disputewindow") {
        OracleError::DisputeWindowNotElapsed {
            market,
            remaining_secs: 0,
        }
    } else {
        OracleError::Rpc(format!("{} {market}: {message}", call.kind()))
    };
    err.into()
}
