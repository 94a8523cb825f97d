//! EVM chain access through alloy.

pub mod abi;
pub mod chain;

pub use chain::EvmChain;
