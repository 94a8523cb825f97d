//! Fetched metric values and their audit hash.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{B256, I256};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::DomainError;
use super::fixed::{self, format_fixed};

/// How several source values are combined into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Middle of the sorted values; mean of the two middles for even counts.
    Median,
    /// Arithmetic mean.
    Average,
    /// Confidence-weighted mean.
    Weighted,
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Median => "median",
            Self::Average => "average",
            Self::Weighted => "weighted",
        };
        f.write_str(s)
    }
}

impl FromStr for AggregationMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "median" => Ok(Self::Median),
            "average" => Ok(Self::Average),
            "weighted" => Ok(Self::Weighted),
            other => Err(DomainError::UnknownVariant {
                kind: "aggregation method",
                value: other.to_string(),
            }),
        }
    }
}

/// A single observation returned by a data source.
///
/// `hash` is `sha256(value|timestampISO|source)` and is what gets committed
/// on-chain as the outcome's data hash, so any later dispute can be checked
/// against the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    /// Fixed-point value.
    #[serde(with = "fixed::decimal_string")]
    pub value: I256,
    /// Precision of `value`.
    pub decimals: u8,
    /// Source that produced the value.
    pub source: String,
    /// Source-reported quality score in `[0, 1]`.
    pub confidence: f64,
    /// Observation time reported by the source.
    pub timestamp: DateTime<Utc>,
    /// Content hash over value, timestamp and source.
    pub hash: B256,
    /// Opaque provider metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl MetricValue {
    /// Create a value and compute its content hash.
    pub fn new(
        value: I256,
        decimals: u8,
        source: impl Into<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let source = source.into();
        let hash = Self::content_hash(value, timestamp, &source);
        Self {
            value,
            decimals,
            source,
            confidence,
            timestamp,
            hash,
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach provider metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// `sha256(value|timestampISO|source)` with millisecond ISO-8601 UTC time.
    #[must_use]
    pub fn content_hash(value: I256, timestamp: DateTime<Utc>, source: &str) -> B256 {
        let preimage = format!(
            "{value}|{}|{source}",
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        B256::from_slice(&Sha256::digest(preimage.as_bytes()))
    }

    /// Recompute the hash and compare it with the stored one.
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        Self::content_hash(self.value, self.timestamp, &self.source) == self.hash
    }

    /// Human-readable decimal rendering of the value.
    #[must_use]
    pub fn display_value(&self) -> String {
        format_fixed(self.value, self.decimals)
    }
}
