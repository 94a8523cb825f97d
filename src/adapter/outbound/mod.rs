//! Outbound adapters (driven side).

#[cfg(feature = "evm")]
pub mod evm;
pub mod fetcher;
pub mod memory;
pub mod notifier;
pub mod sqlite;
