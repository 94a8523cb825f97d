//! Chain-agnostic domain types for market resolution.

mod alert;
mod error;
pub mod fixed;
mod health;
mod id;
mod job;
mod market;
mod metric;
mod resolution;
mod transaction;

pub use alert::{Alert, AlertSeverity, AlertState};
pub use error::DomainError;
pub use fixed::{div_round, format_fixed, parse_decimal, parse_integer, pow10, rescale, MAX_DECIMALS};
pub use health::{ComponentHealth, HealthReport, HealthStatus};
pub use id::{EventKey, JobId, MarketId, TxHash};
pub use job::{Job, JobStatus, JobType};
pub use market::{
    Economics, Market, MarketParams, MarketStatus, OracleSpec, Predicate, PredicateOp,
    ResolutionWindow, Subject, SubjectKind, WindowKind,
};
pub use metric::{AggregationMethod, MetricValue};
pub use resolution::{MetricRecord, Outcome, Resolution};
pub use transaction::{PendingTransaction, TxEvent, TxKind, TxReceipt};
