//! Fixed-point arithmetic on 256-bit signed integers.
//!
//! Metric values and market thresholds are integers scaled by `10^decimals`.
//! Nothing in resolution ever touches floating point; rescaling rounds half
//! away from zero.

use alloy_primitives::{I256, U256};

use super::error::DomainError;

/// Largest precision accepted anywhere in the pipeline.
pub const MAX_DECIMALS: u8 = 36;

/// `10^exp` as an `I256`.
///
/// # Errors
///
/// Returns [`DomainError::DecimalsOutOfRange`] above [`MAX_DECIMALS`].
pub fn pow10(exp: u8) -> Result<I256, DomainError> {
    if exp > MAX_DECIMALS {
        return Err(DomainError::DecimalsOutOfRange {
            decimals: exp,
            max: MAX_DECIMALS,
        });
    }
    Ok(I256::from_raw(U256::from(10u8).pow(U256::from(exp))))
}

/// Rescale `value` from `from` decimals to `to` decimals.
///
/// Scaling up is exact. Scaling down rounds half away from zero, so
/// `rescale(rescale(v, a, b), b, a)` is within one unit of `v` for `b < a`.
///
/// # Errors
///
/// Returns an error when either precision exceeds [`MAX_DECIMALS`] or the
/// result overflows.
pub fn rescale(value: I256, from: u8, to: u8) -> Result<I256, DomainError> {
    if from == to {
        pow10(from)?;
        return Ok(value);
    }
    if to > from {
        let factor = pow10(to - from)?;
        pow10(to)?;
        return value
            .checked_mul(factor)
            .ok_or(DomainError::Overflow("rescale up"));
    }

    pow10(from)?;
    let divisor = pow10(from - to)?;
    let quotient = value
        .checked_div(divisor)
        .ok_or(DomainError::Overflow("rescale down"))?;
    let remainder = value % divisor;
    let twice = remainder.unsigned_abs() * U256::from(2u8);
    if twice >= divisor.unsigned_abs() {
        let step = if value.is_negative() {
            I256::MINUS_ONE
        } else {
            I256::ONE
        };
        return quotient
            .checked_add(step)
            .ok_or(DomainError::Overflow("rescale rounding"));
    }
    Ok(quotient)
}

/// `numerator / denominator` rounded half away from zero.
///
/// # Errors
///
/// Returns [`DomainError::Overflow`] on division by zero or overflow.
pub fn div_round(numerator: I256, denominator: I256) -> Result<I256, DomainError> {
    let quotient = numerator
        .checked_div(denominator)
        .ok_or(DomainError::Overflow("division"))?;
    let remainder = numerator % denominator;
    let twice = remainder.unsigned_abs() * U256::from(2u8);
    if twice >= denominator.unsigned_abs() && !remainder.is_zero() {
        let step = if numerator.is_negative() == denominator.is_negative() {
            I256::ONE
        } else {
            I256::MINUS_ONE
        };
        return quotient
            .checked_add(step)
            .ok_or(DomainError::Overflow("division rounding"));
    }
    Ok(quotient)
}

/// Parse a decimal literal into `(scaled_integer, decimals)`.
///
/// Accepts an optional sign, an optional fractional part, and an optional
/// `e<exp>` exponent: `"3500.25"` parses to `(350025, 2)`, `"3000e8"` to
/// `(300000000000, 0)`.
///
/// # Errors
///
/// Returns [`DomainError::InvalidNumber`] for malformed input.
pub fn parse_decimal(input: &str) -> Result<(I256, u8), DomainError> {
    let invalid = |reason: &str| DomainError::InvalidNumber {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((m, e)) => {
            let exp: i32 = e.parse().map_err(|_| invalid("bad exponent"))?;
            (m, exp)
        }
        None => (unsigned, 0),
    };

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("no digits"));
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid("non-digit character"));
    }

    let digits = format!("{int_part}{frac_part}");
    let mut value = I256::from_dec_str(&digits).map_err(|e| invalid(&e.to_string()))?;
    let mut decimals = i32::try_from(frac_part.len())
        .ok()
        .and_then(|frac| frac.checked_sub(exponent))
        .ok_or_else(|| invalid("exponent out of range"))?;

    if decimals < 0 {
        let shift = u8::try_from(-decimals).map_err(|_| invalid("exponent too large"))?;
        value = value
            .checked_mul(pow10(shift)?)
            .ok_or_else(|| invalid("overflow"))?;
        decimals = 0;
    }
    let decimals = u8::try_from(decimals).map_err(|_| invalid("too many decimals"))?;
    if decimals > MAX_DECIMALS {
        return Err(DomainError::DecimalsOutOfRange {
            decimals,
            max: MAX_DECIMALS,
        });
    }

    if negative {
        value = -value;
    }
    Ok((value, decimals))
}

/// Parse an integer literal (no fractional digits after scaling).
///
/// `"300000000000"` and `"3000e8"` are both accepted.
///
/// # Errors
///
/// Returns [`DomainError::InvalidNumber`] when the literal has a fractional
/// part or is malformed.
pub fn parse_integer(input: &str) -> Result<I256, DomainError> {
    let (value, decimals) = parse_decimal(input)?;
    if decimals != 0 {
        return Err(DomainError::InvalidNumber {
            value: input.to_string(),
            reason: "expected an integer".to_string(),
        });
    }
    Ok(value)
}

/// Render a scaled integer as a decimal string, e.g. `(350025, 2)` as `3500.25`.
#[must_use]
pub fn format_fixed(value: I256, decimals: u8) -> String {
    let digits = value.unsigned_abs().to_string();
    let sign = if value.is_negative() { "-" } else { "" };
    if decimals == 0 {
        return format!("{sign}{digits}");
    }
    let width = usize::from(decimals) + 1;
    let padded = format!("{digits:0>width$}");
    let (int_part, frac_part) = padded.split_at(padded.len() - usize::from(decimals));
    format!("{sign}{int_part}.{frac_part}")
}

/// Serde adapter storing an `I256` as a decimal string.
///
/// Deserialization also accepts JSON integers and exponent literals such as
/// `"3000e8"`.
pub mod decimal_string {
    use alloy_primitives::I256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialize as a base-10 string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &I256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserialize from a string or integer.
    ///
    /// # Errors
    ///
    /// Fails on malformed or fractional literals.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<I256, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => super::parse_integer(&text).map_err(de::Error::custom),
            Raw::Signed(v) => I256::try_from(v).map_err(de::Error::custom),
            Raw::Unsigned(v) => I256::try_from(v).map_err(de::Error::custom),
        }
    }
}
