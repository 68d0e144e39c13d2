//! Per-cycle observations: the price sample and the depth snapshot.

use crate::Price;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mid-prices sampled from both venues at the top of a cycle.
///
/// Either side may be unavailable. A missing mainnet mid makes the cycle
/// idle; a missing testnet mid does not — depth is still built around the
/// mainnet reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub market: String,
    pub mainnet_mid: Option<Price>,
    pub testnet_mid: Option<Price>,
    pub sampled_at: DateTime<Utc>,
}

impl PriceSample {
    /// Relative gap between the venue mids.
    ///
    /// Zero when the testnet mid is unavailable: with no testnet price
    /// there is nothing to correct, only depth to build.
    pub fn gap(&self) -> Option<rust_decimal::Decimal> {
        let mainnet = self.mainnet_mid?;
        match self.testnet_mid {
            Some(testnet) => testnet.gap_from(mainnet),
            None => Some(rust_decimal::Decimal::ZERO),
        }
    }
}

/// Global depth snapshot for one market, taken against a reference price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub market: String,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    /// All resting orders across both sides.
    pub total_orders: usize,
    /// Orders within +/-5% of the reference price.
    pub orders_near_price: usize,
    /// The worker's own resting orders (subset of `total_orders`).
    pub own_orders: usize,
    pub sampled_at: DateTime<Utc>,
}
