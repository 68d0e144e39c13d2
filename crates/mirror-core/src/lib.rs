//! Core domain types for the testnet liquidity mirroring engine.
//!
//! This crate provides the types shared by every other crate in the
//! workspace:
//! - `Price`, `Size`: precision-safe numeric newtypes
//! - `Market`, `MarketCatalog`: static per-market metadata
//! - `OpenOrder`, `OrderSide`: the worker's view of its resting orders
//! - `PriceSample`, `OrderbookSnapshot`: per-cycle observations
//! - `ActionPlan`, `CreateIntent`, `CancelRef`: the planner's output

pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod plan;
pub mod sample;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{Market, MarketCatalog, MarketId, MarketType, WalletId};
pub use order::{OpenOrder, OrderHash, OrderSide, OrderState};
pub use plan::{ActionPlan, CancelRef, CreateIntent, Phase};
pub use sample::{OrderbookSnapshot, PriceSample};
