//! RPC endpoint and contract addresses.

use alloy_primitives::Address;
use serde::Deserialize;

/// Chain access settings.
///
/// The signing key is loaded from `ORACLED_PRIVATE_KEY` at runtime, never
/// from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    #[serde(default)]
    pub rpc_url: String,
    /// Expected chain id; checked against the node at startup.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Oracle contract receiving commits and finalizations.
    #[serde(default)]
    pub oracle_address: Address,
    /// Factory contract emitting `MarketCreated`.
    #[serde(default)]
    pub factory_address: Address,
    /// Per-call RPC timeout (milliseconds).
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Loaded from `ORACLED_PRIVATE_KEY`.
    #[serde(skip)]
    pub private_key: Option<String>,
}

const fn default_chain_id() -> u64 {
    1
}

const fn default_rpc_timeout_ms() -> u64 {
    10_000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_id: default_chain_id(),
            oracle_address: Address::ZERO,
            factory_address: Address::ZERO,
            rpc_timeout_ms: default_rpc_timeout_ms(),
            private_key: None,
        }
    }
}
