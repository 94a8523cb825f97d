//! On-chain transaction lifecycle tracking.

pub mod transaction;

pub use transaction::{MonitorConfig, TransactionMonitor};
