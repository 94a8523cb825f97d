//! Component health snapshots and alerting.

pub mod alerts;
pub mod monitor;

pub use alerts::{AlertConfig, AlertManager};
pub use monitor::{HealthConfig, HealthMonitor};
