//! Price sampling and orderbook depth views.
//!
//! Two read-only collaborators of the worker loop:
//! - [`PriceOracle`]: TTL-cached mid-prices for both venues of a market
//! - [`OrderbookView`]: the worker's own orders and a global depth snapshot
//!
//! Neither retries: a failed fetch surfaces as `Unavailable` (oracle) or a
//! transient error (view), and the worker decides what the cycle does.

pub mod error;
pub mod oracle;
pub mod orderbook;

pub use error::{FeedError, FeedResult};
pub use oracle::{Clock, PriceOracle, SystemClock};
pub use orderbook::OrderbookView;
