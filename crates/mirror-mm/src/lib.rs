//! Three-phase liquidity planning.
//!
//! The [`Planner`] classifies a market's state from the cycle's price
//! sample and depth snapshot, then emits an [`mirror_core::ActionPlan`]:
//!
//! - **move**: the testnet price has drifted far from mainnet on a book
//!   deep enough to trade against; shift it with one-sided quotes.
//! - **build**: the book is sparse; seed a five-tier staircase around the
//!   mainnet mid.
//! - **maintain**: price is aligned and depth is healthy; rotate small
//!   orders through widening spread bands.
//!
//! All randomness comes from a per-worker seeded RNG, so a plan is a pure
//! function of (inputs, seed, stage counter).

pub mod config;
pub mod planner;

pub use config::{MarketParams, ParamsError};
pub use planner::{PlanInputs, Planner};
