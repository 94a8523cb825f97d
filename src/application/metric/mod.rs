//! Metric acquisition: source selection, reliability decoration and
//! validation.

pub mod registry;
pub mod resilient;
pub mod validator;

pub use registry::MetricFetcherRegistry;
pub use resilient::{ResilienceConfig, ResilientFetcher};
pub use validator::{
    aggregate_metric_values, apply_rounding, evaluate_predicate, normalize_value,
    MetricDataValidator, ValidationConfig,
};
