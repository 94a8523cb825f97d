//! Gas limit padding, price ceiling and escalation tiers.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Gas settings for oracle transactions.
#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
    /// Safety multiplier applied to every gas estimate.
    #[serde(default = "default_gas_limit_multiplier")]
    pub gas_limit_multiplier: Decimal,
    /// Hard ceiling on the gas price (gwei).
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,
    /// Price multiplier for the first resubmission.
    #[serde(default = "default_escalation_low")]
    pub escalation_low: Decimal,
    /// Price multiplier for the second resubmission.
    #[serde(default = "default_escalation_medium")]
    pub escalation_medium: Decimal,
    /// Price multiplier for every later resubmission.
    #[serde(default = "default_escalation_high")]
    pub escalation_high: Decimal,
}

fn default_gas_limit_multiplier() -> Decimal {
    dec!(1.2)
}

fn default_max_gas_price_gwei() -> u64 {
    500
}

fn default_escalation_low() -> Decimal {
    dec!(1.125)
}

fn default_escalation_medium() -> Decimal {
    dec!(1.25)
}

fn default_escalation_high() -> Decimal {
    dec!(1.5)
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit_multiplier: default_gas_limit_multiplier(),
            max_gas_price_gwei: default_max_gas_price_gwei(),
            escalation_low: default_escalation_low(),
            escalation_medium: default_escalation_medium(),
            escalation_high: default_escalation_high(),
        }
    }
}

/// Pure gas arithmetic shared by the oracle client and the tx monitor.
#[derive(Debug, Clone, Default)]
pub struct GasPolicy {
    config: GasConfig,
}

impl GasPolicy {
    #[must_use]
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    /// Price ceiling in wei.
    #[must_use]
    pub fn ceiling_wei(&self) -> u128 {
        u128::from(self.config.max_gas_price_gwei).saturating_mul(WEI_PER_GWEI)
    }

    /// Estimate padded by the safety multiplier, rounded up.
    #[must_use]
    pub fn gas_limit(&self, estimate: u64) -> u64 {
        (Decimal::from(estimate) * self.config.gas_limit_multiplier)
            .ceil()
            .to_u64()
            .unwrap_or(u64::MAX)
            .max(estimate)
    }

    /// Recommended price clamped to the ceiling.
    #[must_use]
    pub fn clamp_price(&self, price: u128) -> u128 {
        price.min(self.ceiling_wei())
    }

    /// Multiplier tier for the given resubmission count.
    #[must_use]
    pub fn escalation_multiplier(&self, attempt: u32) -> Decimal {
        match attempt {
            0 => self.config.escalation_low,
            1 => self.config.escalation_medium,
            _ => self.config.escalation_high,
        }
    }

    /// Price for the next resubmission, strictly above `original`.
    ///
    /// Returns `None` when the ceiling leaves no room to go higher.
    #[must_use]
    pub fn escalate(&self, original: u128, recommended: u128, attempt: u32) -> Option<u128> {
        let multiplied = Decimal::from_u128(original)
            .map(|p| (p * self.escalation_multiplier(attempt)).ceil())
            .and_then(|p| p.to_u128())
            .unwrap_or(u128::MAX);
        let mut next = multiplied.max(recommended);
        if next <= original {
            next = original.saturating_add(1);
        }
        let next = self.clamp_price(next);
        (next > original).then_some(next)
    }
}

/// A transaction priced below `threshold` of the current recommendation is
/// unlikely to be mined soon.
#[must_use]
pub fn is_transaction_stuck(gas_price: u128, recommended: u128, threshold: Decimal) -> bool {
    match (Decimal::from_u128(gas_price), Decimal::from_u128(recommended)) {
        (Some(price), Some(recommended)) => price < recommended * threshold,
        _ => false,
    }
}
