//! Domain identifier types with proper encapsulation.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Market identifier - the market contract address.
///
/// Rendered as lowercase `0x`-prefixed hex so the same market always maps
/// to the same store key regardless of how the address was checksummed on
/// the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(Address);

impl MarketId {
    /// Wrap a contract address.
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    /// The underlying contract address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for MarketId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_str(s.trim())
            .map(Self)
            .map_err(|_| DomainError::InvalidAddress {
                value: s.to_string(),
            })
    }
}

impl From<Address> for MarketId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

/// Job identifier - newtype over a v4 UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random job ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| DomainError::InvalidJobId {
                value: s.to_string(),
            })
    }
}

/// Transaction hash of a submitted on-chain transaction.
pub type TxHash = B256;

/// Key identifying one `MarketCreated` log: `transactionHash:logIndex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey(String);

impl EventKey {
    /// Build the key from the delivering transaction hash and log index.
    #[must_use]
    pub fn new(tx_hash: &TxHash, log_index: u64) -> Self {
        Self(format!("{tx_hash:#x}:{log_index}"))
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_id_renders_lowercase() {
        let id: MarketId = "0xAbCdEf0000000000000000000000000000000001".parse().unwrap();
        assert_eq!(id.to_string(), "0xabcdef0000000000000000000000000000000001");
    }

    #[test]
    fn market_id_rejects_garbage() {
        let err = "not-an-address".parse::<MarketId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidAddress { .. }));
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::generate();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn event_key_matches_same_delivery() {
        let hash = B256::repeat_byte(0xab);
        assert_eq!(EventKey::new(&hash, 3), EventKey::new(&hash, 3));
        assert_ne!(EventKey::new(&hash, 3), EventKey::new(&hash, 4));
        assert!(EventKey::new(&hash, 3).as_str().ends_with(":3"));
    }
}
