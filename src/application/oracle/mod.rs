//! Oracle contract access.

pub mod client;
pub mod gas;

pub use client::{OracleClient, Submission};
pub use gas::{is_transaction_stuck, GasConfig, GasPolicy};
