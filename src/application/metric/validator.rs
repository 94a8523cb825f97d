//! Normalization, quality checks, aggregation and predicate evaluation for
//! fetched metric values.

use alloy_primitives::I256;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{
    div_round, rescale, AggregationMethod, DomainError, MetricValue, Predicate, MAX_DECIMALS,
};
use crate::error::ValidationError;

/// Weight resolution for confidence-weighted aggregation.
const WEIGHT_SCALE: f64 = 1_000_000.0;

/// Quality thresholds applied to every fetched value.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Values below this confidence are rejected.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Allowed clock skew for values timestamped after now.
    #[serde(default = "default_max_future_skew_secs")]
    pub max_future_skew_secs: i64,
    /// Maximum age of a value relative to the requested resolution time.
    #[serde(default = "default_max_staleness_secs")]
    pub max_staleness_secs: i64,
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_max_future_skew_secs() -> i64 {
    60
}

fn default_max_staleness_secs() -> i64 {
    3_600
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_future_skew_secs: default_max_future_skew_secs(),
            max_staleness_secs: default_max_staleness_secs(),
        }
    }
}

/// Stateless validator over [`MetricValue`]s.
#[derive(Debug, Clone, Default)]
pub struct MetricDataValidator {
    config: ValidationConfig,
}

impl MetricDataValidator {
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Check a fetched value and rescale it to `target_decimals`.
    ///
    /// The returned value carries a fresh content hash over the normalized
    /// integer.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn validate_metric_value(
        &self,
        metric: &MetricValue,
        target_decimals: u8,
        requested_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<MetricValue, ValidationError> {
        check_decimals(metric.decimals)?;
        check_decimals(target_decimals)?;

        if !metric.verify_hash() {
            return Err(ValidationError::HashMismatch {
                source_id: metric.source.clone(),
            });
        }
        if !(metric.confidence >= self.config.min_confidence && metric.confidence <= 1.0) {
            return Err(ValidationError::LowConfidence {
                confidence: metric.confidence,
                min: self.config.min_confidence,
            });
        }

        let ahead = (metric.timestamp - now).num_seconds();
        if ahead > self.config.max_future_skew_secs {
            return Err(ValidationError::FutureTimestamp {
                timestamp: metric.timestamp.to_rfc3339(),
                ahead_secs: ahead,
            });
        }
        let age = (requested_at - metric.timestamp).num_seconds();
        if age > self.config.max_staleness_secs {
            return Err(ValidationError::Stale {
                timestamp: metric.timestamp.to_rfc3339(),
                age_secs: age,
            });
        }

        let value = normalize_value(metric.value, metric.decimals, target_decimals)?;
        Ok(MetricValue::new(
            value,
            target_decimals,
            metric.source.clone(),
            metric.confidence,
            metric.timestamp,
        )
        .with_metadata(metric.metadata.clone()))
    }
}

fn check_decimals(decimals: u8) -> Result<(), ValidationError> {
    if decimals > MAX_DECIMALS {
        return Err(ValidationError::DecimalsOutOfRange {
            decimals,
            max: MAX_DECIMALS,
        });
    }
    Ok(())
}

fn domain_to_validation(err: DomainError) -> ValidationError {
    match err {
        DomainError::DecimalsOutOfRange { decimals, max } => {
            ValidationError::DecimalsOutOfRange { decimals, max }
        }
        other => ValidationError::Params(other.to_string()),
    }
}

/// Power-of-ten rescale; identity when the precisions match.
///
/// # Errors
///
/// Fails when either precision exceeds the supported maximum.
pub fn normalize_value(
    value: I256,
    current_decimals: u8,
    target_decimals: u8,
) -> Result<I256, ValidationError> {
    rescale(value, current_decimals, target_decimals).map_err(domain_to_validation)
}

/// Coarsen `value` (at `value_decimals`) to `rounding_decimals` of
/// precision while keeping its scale.
///
/// # Errors
///
/// Fails when either precision exceeds the supported maximum.
pub fn apply_rounding(
    value: I256,
    value_decimals: u8,
    rounding_decimals: u8,
) -> Result<I256, ValidationError> {
    if rounding_decimals >= value_decimals {
        return Ok(value);
    }
    let coarse = normalize_value(value, value_decimals, rounding_decimals)?;
    normalize_value(coarse, rounding_decimals, value_decimals)
}

/// Exact big-integer comparison of the metric against the predicate.
#[must_use]
pub fn evaluate_predicate(metric: &MetricValue, predicate: &Predicate) -> bool {
    predicate.evaluate(metric.value)
}

/// Combine values from several sources into one.
///
/// Inputs must share `decimals`. The result's timestamp is the newest input
/// timestamp and its confidence the mean input confidence.
///
/// # Errors
///
/// Fails on an empty input or mixed precisions.
pub fn aggregate_metric_values(
    values: &[MetricValue],
    method: AggregationMethod,
) -> Result<MetricValue, ValidationError> {
    let Some(first) = values.first() else {
        return Err(ValidationError::InsufficientSources {
            required: 1,
            available: 0,
        });
    };
    if let Some(odd) = values.iter().find(|v| v.decimals != first.decimals) {
        return Err(ValidationError::DecimalsMismatch {
            expected: first.decimals,
            found: odd.decimals,
        });
    }

    let value = match method {
        AggregationMethod::Median => median(values)?,
        AggregationMethod::Average => average(values)?,
        AggregationMethod::Weighted => weighted(values)?,
    };

    let timestamp = values
        .iter()
        .map(|v| v.timestamp)
        .max()
        .unwrap_or(first.timestamp);
    #[allow(clippy::cast_precision_loss)]
    let confidence = values.iter().map(|v| v.confidence).sum::<f64>() / values.len() as f64;
    let sources: Vec<&str> = values.iter().map(|v| v.source.as_str()).collect();
    let source = format!("{method}({})", sources.join(","));

    Ok(MetricValue::new(value, first.decimals, source, confidence, timestamp))
}

fn count(values: &[MetricValue]) -> Result<I256, ValidationError> {
    I256::try_from(values.len()).map_err(|e| ValidationError::Params(e.to_string()))
}

fn sum(mut values: impl Iterator<Item = I256>) -> Result<I256, ValidationError> {
    values.try_fold(I256::ZERO, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| domain_to_validation(DomainError::Overflow("aggregate sum")))
    })
}

fn median(values: &[MetricValue]) -> Result<I256, ValidationError> {
    let mut sorted: Vec<I256> = values.iter().map(|v| v.value).collect();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return Ok(sorted[mid]);
    }
    let pair = sum([sorted[mid - 1], sorted[mid]].into_iter())?;
    div_round(pair, I256::try_from(2i64).map_err(|e| ValidationError::Params(e.to_string()))?)
        .map_err(domain_to_validation)
}

fn average(values: &[MetricValue]) -> Result<I256, ValidationError> {
    let total = sum(values.iter().map(|v| v.value))?;
    div_round(total, count(values)?).map_err(domain_to_validation)
}

fn weighted(values: &[MetricValue]) -> Result<I256, ValidationError> {
    let weights = values
        .iter()
        .map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            let scaled = (v.confidence.clamp(0.0, 1.0) * WEIGHT_SCALE).round() as i64;
            I256::try_from(scaled).map_err(|e| ValidationError::Params(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let total_weight = sum(weights.iter().copied())?;
    if total_weight.is_zero() {
        return average(values);
    }

    let products = values
        .iter()
        .zip(&weights)
        .map(|(v, w)| {
            v.value
                .checked_mul(*w)
                .ok_or_else(|| domain_to_validation(DomainError::Overflow("weighted product")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let numerator = sum(products.into_iter())?;
    div_round(numerator, total_weight).map_err(domain_to_validation)
}
