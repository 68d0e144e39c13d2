//! Per-market strategy parameters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("invalid market params: {0}")]
    Invalid(String),
}

/// Tunables for one (wallet, market) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketParams {
    /// Reference order size in base units.
    pub base_order_size: Decimal,
    /// Spread the staircase is anchored on.
    #[serde(default = "default_base_spread_bps")]
    pub base_spread_bps: u32,
    #[serde(default = "default_min_spread_bps")]
    pub min_spread_bps: u32,
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: u32,
    /// Gap above which price correction engages.
    #[serde(default = "default_deviation_threshold_bps")]
    pub deviation_threshold_bps: u32,
    /// Oracle cache TTL.
    #[serde(default = "default_price_refresh_secs")]
    pub price_refresh_interval_secs: u64,
    /// Pause between trading cycles.
    #[serde(default = "default_cycle_secs")]
    pub cycle_interval_secs: u64,
}

fn default_base_spread_bps() -> u32 {
    20
}

fn default_min_spread_bps() -> u32 {
    10
}

fn default_max_spread_bps() -> u32 {
    100
}

fn default_deviation_threshold_bps() -> u32 {
    200
}

fn default_price_refresh_secs() -> u64 {
    5
}

fn default_cycle_secs() -> u64 {
    15
}

impl MarketParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.base_order_size.is_sign_positive() || self.base_order_size.is_zero() {
            return Err(ParamsError::Invalid(
                "base_order_size must be positive".to_string(),
            ));
        }
        if self.min_spread_bps > self.base_spread_bps
            || self.base_spread_bps > self.max_spread_bps
        {
            return Err(ParamsError::Invalid(format!(
                "spread bounds must satisfy min <= base <= max (got {}/{}/{})",
                self.min_spread_bps, self.base_spread_bps, self.max_spread_bps
            )));
        }
        if self.cycle_interval_secs == 0 {
            return Err(ParamsError::Invalid(
                "cycle_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn price_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.price_refresh_interval_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> MarketParams {
        MarketParams {
            base_order_size: dec!(15),
            base_spread_bps: 20,
            min_spread_bps: 10,
            max_spread_bps: 100,
            deviation_threshold_bps: 200,
            price_refresh_interval_secs: 5,
            cycle_interval_secs: 15,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_size() {
        let mut p = params();
        p.base_order_size = Decimal::ZERO;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_spreads() {
        let mut p = params();
        p.min_spread_bps = 200;
        assert!(p.validate().is_err());
    }
}
