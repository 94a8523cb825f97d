//! Market resolution: the state machine, its job handlers and the
//! reconciliation pass.

pub mod handlers;
pub mod processor;
pub mod reconcile;

pub use handlers::{FinalizeMarketHandler, ResolveMarketHandler};
pub use processor::{MarketProcessor, ProcessOutcome};
pub use reconcile::{ReconcileReport, Reconciler};
