//! Runtime lifecycle of the background services.

pub mod runtime;

#[cfg(feature = "evm")]
pub use runtime::{run, run_with_shutdown};
pub use runtime::{serve, RuntimeHandle};
