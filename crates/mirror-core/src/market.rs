//! Market identification and static metadata.
//!
//! Every configured market exists on two venues at once: the testnet book
//! the engine trades on and the mainnet book it mirrors. Both venue IDs are
//! opaque hex strings assigned by the chain; the engine never inspects them.

use crate::error::{CoreError, Result};
use crate::{Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Opaque on-chain market identifier (0x-prefixed hex on Injective).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet identifier as configured (e.g. `wallet_1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Market class; decides which batch message variant the transaction uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    Derivative,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Derivative => write!(f, "derivative"),
        }
    }
}

/// Static per-market metadata, immutable after load.
///
/// `price_scale` is the exponent converting a human-readable price into
/// chain units (10^12 for most spot pairs, 10^18 for derivatives, 0 for
/// same-decimal pairs such as stINJ/INJ). Tick sizes are in human units,
/// as configured; prices and quantities snap to the tick grid before
/// scaling. `min_notional` applies to the chain-scaled price x quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Unique symbol, e.g. `INJ/USDT`.
    pub symbol: String,
    pub market_type: MarketType,
    pub testnet_market_id: MarketId,
    pub mainnet_market_id: MarketId,
    /// Exponent for human price -> chain price conversion.
    pub price_scale: u32,
    pub base_decimals: u32,
    pub quote_decimals: u32,
    /// Minimum price increment, human units.
    pub min_price_tick: Decimal,
    /// Minimum quantity increment, human units.
    pub min_quantity_tick: Decimal,
    /// Minimum order notional (chain price x chain quantity).
    pub min_notional: Decimal,
}

impl Market {
    /// Validate metadata the chain would reject orders over.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(CoreError::InvalidMarket {
                symbol: self.symbol.clone(),
                reason: reason.to_string(),
            })
        };

        if self.symbol.is_empty() {
            return fail("empty symbol");
        }
        if self.testnet_market_id.as_str().is_empty() || self.mainnet_market_id.as_str().is_empty()
        {
            return fail("empty market id");
        }
        if self.base_decimals == 0 || self.quote_decimals == 0 {
            return fail("decimals must be positive");
        }
        if !self.min_price_tick.is_sign_positive() || self.min_price_tick.is_zero() {
            return fail("min_price_tick must be positive");
        }
        if !self.min_quantity_tick.is_sign_positive() || self.min_quantity_tick.is_zero() {
            return fail("min_quantity_tick must be positive");
        }
        if self.min_notional.is_sign_negative() {
            return fail("min_notional must not be negative");
        }
        Ok(())
    }

    /// Price tick in human units, as configured.
    ///
    /// Used by the planner to deduplicate create intents against resting
    /// orders, which it sees in the same units.
    pub fn human_price_tick(&self) -> Decimal {
        self.min_price_tick
    }

    /// Scale a tick-aligned human price into chain units.
    pub fn scale_price(&self, price: Price) -> Decimal {
        price.inner() * pow10(self.price_scale)
    }

    /// Scale a tick-aligned human quantity into chain units.
    pub fn scale_quantity(&self, quantity: Size) -> Decimal {
        quantity.inner() * pow10(self.base_decimals)
    }
}

fn pow10(exp: u32) -> Decimal {
    let mut out = Decimal::ONE;
    let ten = Decimal::from(10);
    for _ in 0..exp {
        out *= ten;
    }
    out
}

/// Immutable catalog of markets plus per-wallet assignments.
///
/// Built once at startup from config and shared read-only across workers.
#[derive(Debug, Clone)]
pub struct MarketCatalog {
    markets: HashMap<String, Arc<Market>>,
    assignments: HashMap<WalletId, Vec<String>>,
}

impl MarketCatalog {
    /// Build a catalog, validating every market.
    pub fn new(
        markets: Vec<Market>,
        assignments: HashMap<WalletId, Vec<String>>,
    ) -> Result<Self> {
        let mut by_symbol = HashMap::with_capacity(markets.len());
        for market in markets {
            market.validate()?;
            by_symbol.insert(market.symbol.clone(), Arc::new(market));
        }

        // Every assigned symbol must resolve.
        for (wallet, symbols) in &assignments {
            for symbol in symbols {
                if !by_symbol.contains_key(symbol) {
                    return Err(CoreError::UnknownMarket(format!(
                        "{symbol} (assigned to {wallet})"
                    )));
                }
            }
        }

        Ok(Self {
            markets: by_symbol,
            assignments,
        })
    }

    pub fn lookup(&self, symbol: &str) -> Result<Arc<Market>> {
        self.markets
            .get(symbol)
            .cloned()
            .ok_or_else(|| CoreError::UnknownMarket(symbol.to_string()))
    }

    /// Markets assigned to a wallet, in config order.
    pub fn enabled_markets(&self, wallet: &WalletId) -> Result<Vec<Arc<Market>>> {
        let symbols = self
            .assignments
            .get(wallet)
            .ok_or_else(|| CoreError::UnknownWallet(wallet.to_string()))?;
        symbols.iter().map(|s| self.lookup(s)).collect()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
