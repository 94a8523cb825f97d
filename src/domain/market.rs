//! Market domain types.
//!
//! A [`Market`] is created once from a `MarketCreated` event and afterwards
//! only its [`MarketStatus`] changes. Everything needed to resolve it (the
//! subject to measure, the predicate, the window, and which data sources to
//! trust) is captured at ingestion time.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::I256;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::fixed::{self, MAX_DECIMALS};
use super::id::{EventKey, MarketId};
use super::metric::AggregationMethod;

/// Category of data a market resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectKind {
    /// An exchange-internal metric identified by `metric_id`.
    HlMetric,
    /// A token price identified by `token_identifier`.
    TokenPrice,
}

impl SubjectKind {
    /// Stable lowercase name used in URLs and config.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HlMetric => "hl_metric",
            Self::TokenPrice => "token_price",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What gets measured at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Subject category.
    pub kind: SubjectKind,
    /// Metric identifier for [`SubjectKind::HlMetric`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_id: Option<String>,
    /// Token identifier for [`SubjectKind::TokenPrice`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_identifier: Option<String>,
    /// Fixed-point precision the market's threshold is expressed in.
    pub value_decimals: u8,
}

impl Subject {
    /// Subject for an exchange metric.
    pub fn metric(metric_id: impl Into<String>, value_decimals: u8) -> Self {
        Self {
            kind: SubjectKind::HlMetric,
            metric_id: Some(metric_id.into()),
            token_identifier: None,
            value_decimals,
        }
    }

    /// Subject for a token price.
    pub fn token_price(token: impl Into<String>, value_decimals: u8) -> Self {
        Self {
            kind: SubjectKind::TokenPrice,
            metric_id: None,
            token_identifier: Some(token.into()),
            value_decimals,
        }
    }

    /// The identifier relevant for this subject's kind.
    #[must_use]
    pub fn key(&self) -> &str {
        let key = match self.kind {
            SubjectKind::HlMetric => self.metric_id.as_deref(),
            SubjectKind::TokenPrice => self.token_identifier.as_deref(),
        };
        key.unwrap_or_default()
    }

    /// Check the subject names something and has a usable precision.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.key().trim().is_empty() {
            return Err(DomainError::EmptySubject);
        }
        if self.value_decimals > MAX_DECIMALS {
            return Err(DomainError::DecimalsOutOfRange {
                decimals: self.value_decimals,
                max: MAX_DECIMALS,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key())
    }
}

/// Comparison between the measured value and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredicateOp {
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
}

impl fmt::Display for PredicateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        };
        f.write_str(s)
    }
}

/// `value <op> threshold`, both scaled by the subject's `value_decimals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Comparison operator.
    pub op: PredicateOp,
    /// Threshold as a fixed-point integer.
    #[serde(with = "fixed::decimal_string")]
    pub threshold: I256,
}

impl Predicate {
    /// Create a predicate.
    #[must_use]
    pub const fn new(op: PredicateOp, threshold: I256) -> Self {
        Self { op, threshold }
    }

    /// Exact big-integer comparison of `value` against the threshold.
    #[must_use]
    pub fn evaluate(&self, value: I256) -> bool {
        match self.op {
            PredicateOp::Gt => value > self.threshold,
            PredicateOp::Gte => value >= self.threshold,
            PredicateOp::Lt => value < self.threshold,
            PredicateOp::Lte => value <= self.threshold,
        }
    }
}

/// How the resolution window is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowKind {
    /// A single observation at `t_end`.
    #[default]
    Snapshot,
    /// The market covers `[t_start, t_end]`; resolution observes `t_end`.
    Interval,
}

/// The period a market covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionWindow {
    /// Sampling kind.
    #[serde(default)]
    pub kind: WindowKind,
    /// Start of the window.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub t_start: DateTime<Utc>,
    /// End of the window; the market resolves at or after this instant.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub t_end: DateTime<Utc>,
}

impl ResolutionWindow {
    /// Check that the window is not inverted.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvertedWindow`] when `t_end < t_start`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.t_end < self.t_start {
            return Err(DomainError::InvertedWindow {
                t_start: self.t_start.timestamp(),
                t_end: self.t_end.timestamp(),
            });
        }
        Ok(())
    }
}

/// Which data sources resolve a market and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleSpec {
    /// Preferred fetcher.
    #[serde(default)]
    pub primary_source_id: String,
    /// Fetcher used when the primary fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_source_id: Option<String>,
    /// Precision the value is rounded to before comparison.
    pub rounding_decimals: u8,
    /// When set, resolve with multi-source cross-validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationMethod>,
    /// Minimum sources required when `aggregation` is set.
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
}

fn default_min_sources() -> usize {
    1
}

/// Pool economics carried for reference; resolution never reads them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Economics {
    /// Trading fee in basis points.
    #[serde(default)]
    pub fee_bps: u32,
    /// Liquidity seeded at creation.
    #[serde(default)]
    pub initial_liquidity: Decimal,
}

/// Lifecycle state of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    /// Awaiting resolution.
    Active,
    /// Outcome committed on-chain, waiting out the dispute window.
    Committed,
    /// Outcome finalized on-chain.
    Resolved,
    /// Outcome challenged; requires operator attention.
    Dispute,
    /// Market withdrawn; never resolved.
    Cancelled,
}

impl MarketStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Committed => "COMMITTED",
            Self::Resolved => "RESOLVED",
            Self::Dispute => "DISPUTE",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// No further automated processing happens in these states.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dispute | Self::Cancelled)
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMMITTED" => Ok(Self::Committed),
            "RESOLVED" => Ok(Self::Resolved),
            "DISPUTE" => Ok(Self::Dispute),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(DomainError::UnknownVariant {
                kind: "market status",
                value: other.to_string(),
            }),
        }
    }
}

/// Resolution parameters carried by a `MarketCreated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParams {
    /// What to measure.
    pub subject: Subject,
    /// How to judge it.
    pub predicate: Predicate,
    /// When to measure it.
    pub window: ResolutionWindow,
    /// Where to measure it.
    pub oracle_spec: OracleSpec,
    /// Trading cutoff.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub cutoff_time: DateTime<Utc>,
    /// Pool economics.
    #[serde(default)]
    pub economics: Economics,
}

impl MarketParams {
    /// Validate every embedded invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`DomainError`].
    pub fn validate(&self) -> Result<(), DomainError> {
        self.subject.validate()?;
        self.window.validate()?;
        if self.oracle_spec.rounding_decimals > MAX_DECIMALS {
            return Err(DomainError::DecimalsOutOfRange {
                decimals: self.oracle_spec.rounding_decimals,
                max: MAX_DECIMALS,
            });
        }
        Ok(())
    }
}

/// A prediction market tracked for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Market contract address.
    pub id: MarketId,
    /// Human-readable title read from the contract.
    pub title: String,
    /// Creator address as reported by the event.
    pub creator: String,
    /// Market mechanism label (e.g. CPMM, parimutuel).
    pub market_type: String,
    /// What to measure.
    pub subject: Subject,
    /// How to judge it.
    pub predicate: Predicate,
    /// When to measure it.
    pub window: ResolutionWindow,
    /// Where to measure it.
    pub oracle_spec: OracleSpec,
    /// Trading cutoff.
    pub cutoff_time: DateTime<Utc>,
    /// Pool economics.
    pub economics: Economics,
    /// Lifecycle state.
    pub status: MarketStatus,
    /// Resolve time read from the contract, if it exposes one.
    pub resolve_time: Option<DateTime<Utc>>,
    /// Ingestion key of the creating event.
    pub source_event: Option<EventKey>,
    /// When the row was first written.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl Market {
    /// Build an `ACTIVE` market from event parameters.
    #[must_use]
    pub fn from_params(id: MarketId, params: MarketParams, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: String::new(),
            creator: String::new(),
            market_type: String::new(),
            subject: params.subject,
            predicate: params.predicate,
            window: params.window,
            oracle_spec: params.oracle_spec,
            cutoff_time: params.cutoff_time,
            economics: params.economics,
            status: MarketStatus::Active,
            resolve_time: None,
            source_event: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The market can be resolved at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.window.t_end
    }
}
