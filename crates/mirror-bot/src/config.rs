//! Application configuration.
//!
//! A TOML document with two sections: `wallets.<id>.markets` assigns
//! market symbols to wallets, and `markets.<symbol>` carries the static
//! metadata plus strategy tunables for each market. Key material is NOT
//! here; see [`crate::keys`].

use crate::error::{AppError, AppResult};
use mirror_core::{Market, MarketCatalog, MarketId, MarketType, WalletId};
use mirror_mm::MarketParams;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// How the binary reaches a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineMode {
    /// In-memory venue; orders never leave the process.
    #[default]
    DryRun,
    /// Real chain access. Requires the deployment to bind a gRPC-backed
    /// `ChainClient`; this build only ships the dry-run venue.
    Live,
}

/// Engine-wide tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: EngineMode,
    /// Delay between successive worker starts, to keep wallets from
    /// broadcasting in lockstep at boot.
    #[serde(default = "default_stagger_secs")]
    pub stagger_start_secs: u64,
    /// Base RNG seed; each worker derives its own from this and its
    /// wallet id. Unset means seeded from entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_stagger_secs() -> u64 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::default(),
            stagger_start_secs: default_stagger_secs(),
            rng_seed: None,
        }
    }
}

/// Market list for one wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMarkets {
    pub markets: Vec<String>,
}

/// One `markets.<symbol>` entry: static metadata plus strategy params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEntry {
    #[serde(rename = "type")]
    pub market_type: MarketType,
    pub testnet_market_id: String,
    pub mainnet_market_id: String,
    pub price_scale: u32,
    pub base_decimals: u32,
    pub quote_decimals: u32,
    pub min_price_tick: Decimal,
    pub min_quantity_tick: Decimal,
    #[serde(default)]
    pub min_notional: Decimal,
    /// Mainnet mid served by the dry-run venue for this market.
    #[serde(default)]
    pub reference_price: Option<Decimal>,
    #[serde(flatten)]
    pub params: MarketParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub wallets: HashMap<String, WalletMarkets>,
    #[serde(default)]
    pub markets: HashMap<String, MarketEntry>,
}

impl AppConfig {
    /// Load from an explicit path, or `MIRROR_CONFIG`, or the default.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var("MIRROR_CONFIG").ok())
            .unwrap_or_else(|| "config/default.toml".to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!("config file not found: {path}")));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse {path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every market entry and wallet assignment.
    pub fn validate(&self) -> AppResult<()> {
        if self.markets.is_empty() {
            return Err(AppError::Config("no markets configured".to_string()));
        }
        for (symbol, entry) in &self.markets {
            entry.params.validate()?;
            entry.to_market(symbol).validate()?;
        }
        for (wallet, assignment) in &self.wallets {
            if assignment.markets.is_empty() {
                return Err(AppError::Config(format!(
                    "wallet {wallet} has no markets assigned"
                )));
            }
            for symbol in &assignment.markets {
                if !self.markets.contains_key(symbol) {
                    return Err(AppError::Core(mirror_core::CoreError::UnknownMarket(
                        format!("{symbol} (assigned to {wallet})"),
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the immutable market catalog shared across workers.
    pub fn catalog(&self) -> AppResult<MarketCatalog> {
        let markets: Vec<Market> = self
            .markets
            .iter()
            .map(|(symbol, entry)| entry.to_market(symbol))
            .collect();
        let assignments: HashMap<WalletId, Vec<String>> = self
            .wallets
            .iter()
            .map(|(id, w)| (WalletId::new(id.clone()), w.markets.clone()))
            .collect();
        Ok(MarketCatalog::new(markets, assignments)?)
    }

    /// Strategy params for one market symbol.
    pub fn market_params(&self, symbol: &str) -> Option<&MarketParams> {
        self.markets.get(symbol).map(|entry| &entry.params)
    }

    /// The tightest price-refresh interval across configured markets,
    /// used as the shared oracle TTL.
    pub fn oracle_ttl(&self) -> Duration {
        self.markets
            .values()
            .map(|e| e.params.price_refresh_interval())
            .min()
            .unwrap_or(Duration::from_secs(5))
    }
}

impl MarketEntry {
    /// Materialize the immutable market metadata for this entry.
    pub fn to_market(&self, symbol: &str) -> Market {
        Market {
            symbol: symbol.to_string(),
            market_type: self.market_type,
            testnet_market_id: MarketId::new(self.testnet_market_id.clone()),
            mainnet_market_id: MarketId::new(self.mainnet_market_id.clone()),
            price_scale: self.price_scale,
            base_decimals: self.base_decimals,
            quote_decimals: self.quote_decimals,
            min_price_tick: self.min_price_tick,
            min_quantity_tick: self.min_quantity_tick,
            min_notional: self.min_notional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[engine]
stagger_start_secs = 2
rng_seed = 42

[wallets.wallet_1]
markets = ["INJ/USDT"]

[markets."INJ/USDT"]
type = "spot"
testnet_market_id = "0xtest"
mainnet_market_id = "0xmain"
price_scale = 12
base_decimals = 18
quote_decimals = 6
min_price_tick = "0.0001"
min_quantity_tick = "0.01"
min_notional = "0"
base_order_size = "15"
"#;

    #[test]
    fn test_parse_and_validate() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.engine.rng_seed, Some(42));
        let params = config.market_params("INJ/USDT").unwrap();
        assert_eq!(params.base_order_size, Decimal::from(15));
        // serde defaults fill the untuned fields.
        assert_eq!(params.cycle_interval_secs, 15);
        assert_eq!(params.price_refresh_interval_secs, 5);
    }

    #[test]
    fn test_catalog_built_from_config() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let catalog = config.catalog().unwrap();

        let market = catalog.lookup("INJ/USDT").unwrap();
        assert_eq!(market.market_type, MarketType::Spot);
        assert_eq!(market.price_scale, 12);

        let assigned = catalog
            .enabled_markets(&WalletId::new("wallet_1"))
            .unwrap();
        assert_eq!(assigned.len(), 1);
    }

    #[test]
    fn test_dangling_assignment_rejected() {
        let broken = SAMPLE.replace("markets = [\"INJ/USDT\"]", "markets = [\"ATOM/USDT\"]");
        let config: AppConfig = toml::from_str(&broken).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_empty_markets_rejected() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_tick_rejected() {
        let broken = SAMPLE.replace("min_price_tick = \"0.0001\"", "min_price_tick = \"0\"");
        let config: AppConfig = toml::from_str(&broken).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
