//! Domain validation errors for core domain types.
//!
//! This module defines errors that occur when domain invariants are violated.
//! These errors are returned by parsing and `try_new` constructors.

use thiserror::Error;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A market address could not be parsed.
    #[error("invalid address: {value}")]
    InvalidAddress {
        /// The rejected input.
        value: String,
    },

    /// A job identifier could not be parsed.
    #[error("invalid job id: {value}")]
    InvalidJobId {
        /// The rejected input.
        value: String,
    },

    /// A big-integer or decimal literal could not be parsed.
    #[error("invalid number '{value}': {reason}")]
    InvalidNumber {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An enum discriminant stored as text did not match any variant.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// The enum being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Resolution window ends before it starts.
    #[error("window end {t_end} precedes start {t_start}")]
    InvertedWindow {
        /// Window start (unix seconds).
        t_start: i64,
        /// Window end (unix seconds).
        t_end: i64,
    },

    /// A subject names neither a metric nor a token.
    #[error("subject key cannot be empty")]
    EmptySubject,

    /// Fixed-point precision exceeds what 256-bit math supports safely.
    #[error("decimals {decimals} exceed maximum {max}")]
    DecimalsOutOfRange {
        /// Requested decimals.
        decimals: u8,
        /// Supported maximum.
        max: u8,
    },

    /// Arithmetic overflowed the 256-bit range.
    #[error("arithmetic overflow: {0}")]
    Overflow(&'static str),
}
