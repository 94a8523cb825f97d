use std::time::Duration;

use thiserror::Error;

use crate::domain::{DomainError, MarketId, TxHash, TxKind};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while fetching a metric from a data source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network hiccup, 5xx, rate limit; worth retrying.
    #[error("transient error from {source_id}: {message}")]
    Transient { source_id: String, message: String },

    #[error("{source_id} timed out after {after:?}")]
    Timeout { source_id: String, after: Duration },

    #[error("{source_id} cannot fetch {subject}")]
    Unsupported { source_id: String, subject: String },

    /// The response arrived but could not be understood.
    #[error("invalid response from {source_id}: {message}")]
    InvalidResponse { source_id: String, message: String },

    /// No configured source produced a value.
    #[error("no source available for {subject}: {reason}")]
    SourceUnavailable { subject: String, reason: String },
}

impl FetchError {
    /// Retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// A fetched value failed a quality check; nothing is submitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("confidence {confidence} below minimum {min}")]
    LowConfidence { confidence: f64, min: f64 },

    #[error("value timestamp {timestamp} is {ahead_secs}s in the future")]
    FutureTimestamp { timestamp: String, ahead_secs: i64 },

    #[error("value timestamp {timestamp} is {age_secs}s older than the resolution time")]
    Stale { timestamp: String, age_secs: i64 },

    #[error("decimals {decimals} exceed maximum {max}")]
    DecimalsOutOfRange { decimals: u8, max: u8 },

    #[error("values to aggregate have mixed decimals: {expected} and {found}")]
    DecimalsMismatch { expected: u8, found: u8 },

    #[error("need at least {required} sources, got {available}")]
    InsufficientSources { required: usize, available: usize },

    #[error("content hash mismatch for value from {source_id}")]
    HashMismatch { source_id: String },

    #[error("invalid market parameters: {0}")]
    Params(String),
}

/// Oracle contract interaction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("market {market} already has a committed outcome")]
    AlreadyCommitted { market: MarketId },

    #[error("market {market} is already finalized")]
    AlreadyFinalized { market: MarketId },

    #[error("market {market} has no committed outcome")]
    NotCommitted { market: MarketId },

    #[error("dispute window for {market} elapses in {remaining_secs}s")]
    DisputeWindowNotElapsed { market: MarketId, remaining_secs: u64 },

    #[error("{kind} transaction {hash:#x} reverted")]
    TransactionFailed { kind: TxKind, hash: TxHash },

    #[error("{kind} transaction {hash:#x} not mined after {attempts} attempts")]
    TransactionTimeout {
        kind: TxKind,
        hash: TxHash,
        attempts: u32,
    },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("signer error: {0}")]
    Signer(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("market not found: {0}")]
    MarketNotFound(MarketId),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {id} is {status}; only FAILED jobs can be replayed")]
    NotReplayable { id: String, status: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Retrying cannot help; the job fails immediately.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Domain(_)
                | Self::Validation(_)
                | Self::MarketNotFound(_)
                | Self::Oracle(
                    OracleError::TransactionFailed { .. } | OracleError::TransactionTimeout { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        Error::Database(err.to_string())
    }
}
