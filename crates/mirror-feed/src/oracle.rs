//! Mid-price oracle with a short-TTL cache.
//!
//! The mid for a venue is derived from the raw quote as follows: the last
//! trade price wins when it is coherent with the book (within 5% of the
//! bid/ask midpoint), otherwise the book mid is used. A one-sided book
//! falls back to its single best level, and a book with a last trade but
//! no levels at all falls back to the trade.
//!
//! Results are cached per (market, venue) for the refresh interval. A
//! fetch failure may be papered over with a cached value up to twice that
//! old; anything older is discarded and the sample is unavailable.

use crate::FeedResult;
use mirror_chain::{ChainClient, MidQuote};
use mirror_core::{Market, Price};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Last trade further than this from the book mid is discarded as stale.
const TRADE_COHERENCE_LIMIT: Decimal = Decimal::from_parts(5, 0, 0, false, 2); // 0.05

/// Trait for obtaining current time, enabling testability.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Venue {
    Mainnet,
    Testnet,
}

#[derive(Debug, Clone, Copy)]
struct CachedMid {
    price: Price,
    fetched_at: Instant,
}

/// Samples mainnet and testnet mid-prices for configured markets.
///
/// Safe for concurrent use; may be shared read-only across workers.
pub struct PriceOracle<C: Clock = SystemClock> {
    client: Arc<dyn ChainClient>,
    ttl: Duration,
    cache: Mutex<HashMap<(String, Venue), CachedMid>>,
    clock: C,
}

impl PriceOracle<SystemClock> {
    pub fn new(client: Arc<dyn ChainClient>, ttl: Duration) -> Self {
        Self::with_clock(client, ttl, SystemClock)
    }
}

impl<C: Clock> PriceOracle<C> {
    pub fn with_clock(client: Arc<dyn ChainClient>, ttl: Duration, clock: C) -> Self {
        Self {
            client,
            ttl,
            cache: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Mainnet mid for a market, or `None` when unavailable.
    pub async fn mainnet_mid(&self, market: &Market) -> FeedResult<Option<Price>> {
        self.venue_mid(market, Venue::Mainnet).await
    }

    /// Testnet mid for a market, or `None` when unavailable.
    pub async fn testnet_mid(&self, market: &Market) -> FeedResult<Option<Price>> {
        self.venue_mid(market, Venue::Testnet).await
    }

    async fn venue_mid(&self, market: &Market, venue: Venue) -> FeedResult<Option<Price>> {
        let key = (market.symbol.clone(), venue);
        let now = self.clock.now();

        if let Some(cached) = self.cache.lock().get(&key).copied() {
            if now.duration_since(cached.fetched_at) < self.ttl {
                return Ok(Some(cached.price));
            }
        }

        let market_id = match venue {
            Venue::Mainnet => &market.mainnet_market_id,
            Venue::Testnet => &market.testnet_market_id,
        };

        match self.client.query_mid(market_id).await {
            Ok(quote) => {
                let mid = mid_from_quote(&quote).map(Price::new);
                if let Some(price) = mid {
                    self.cache.lock().insert(
                        key,
                        CachedMid {
                            price,
                            fetched_at: now,
                        },
                    );
                }
                Ok(mid)
            }
            Err(err) => {
                debug!(market = %market.symbol, ?venue, error = %err, "mid fetch failed");
                // A recent cached mid beats nothing, but never one older
                // than twice the refresh interval.
                let cached = self.cache.lock().get(&key).copied();
                match cached {
                    Some(c) if now.duration_since(c.fetched_at) < self.ttl * 2 => {
                        Ok(Some(c.price))
                    }
                    _ => Ok(None),
                }
            }
        }
    }
}

/// Derive a mid-price from the raw venue quote.
pub fn mid_from_quote(quote: &MidQuote) -> Option<Decimal> {
    let book_mid = match (quote.best_bid, quote.best_ask) {
        (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
        (Some(bid), None) => Some(bid),
        (None, Some(ask)) => Some(ask),
        (None, None) => None,
    };

    match (quote.last_trade, book_mid) {
        (Some(trade), Some(mid)) => {
            if mid.is_zero() {
                return Some(trade);
            }
            let drift = ((trade - mid) / mid).abs();
            if drift <= TRADE_COHERENCE_LIMIT {
                Some(trade)
            } else {
                Some(mid)
            }
        }
        (Some(trade), None) => Some(trade),
        (None, mid) => mid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mirror_chain::{
        BatchOrders, BookDepth, ChainError, ChainResult, MidQuote, SignedBatch, TxResult,
    };
    use mirror_core::{
        MarketId, MarketType, OpenOrder, WalletId,
    };
    use parking_lot::Mutex as PlMutex;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockClock {
        now: PlMutex<Instant>,
    }

    impl MockClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: PlMutex::new(Instant::now()),
            })
        }

        fn advance(&self, d: Duration) {
            let mut now = self.now.lock();
            *now += d;
        }
    }

    impl Clock for Arc<MockClock> {
        fn now(&self) -> Instant {
            *self.now.lock()
        }
    }

    /// Chain client that returns a scripted sequence of quote results.
    struct QuoteScript {
        responses: PlMutex<Vec<ChainResult<MidQuote>>>,
        calls: AtomicUsize,
    }

    impl QuoteScript {
        fn new(responses: Vec<ChainResult<MidQuote>>) -> Arc<Self> {
            Arc::new(Self {
                responses: PlMutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChainClient for QuoteScript {
        async fn query_account_sequence(&self, _wallet: &WalletId) -> ChainResult<u64> {
            unimplemented!()
        }

        async fn query_open_orders(
            &self,
            _wallet: &WalletId,
            _market_id: &MarketId,
        ) -> ChainResult<Vec<OpenOrder>> {
            unimplemented!()
        }

        async fn query_orderbook(&self, _market_id: &MarketId) -> ChainResult<BookDepth> {
            unimplemented!()
        }

        async fn query_mid(&self, _market_id: &MarketId) -> ChainResult<MidQuote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Err(ChainError::Transport("script exhausted".to_string()))
            } else {
                responses.remove(0)
            }
        }

        async fn build_signed_batch(
            &self,
            _wallet: &WalletId,
            _sequence: u64,
            _batch: &BatchOrders,
        ) -> ChainResult<SignedBatch> {
            unimplemented!()
        }

        async fn broadcast_batch(&self, _tx: SignedBatch) -> ChainResult<TxResult> {
            unimplemented!()
        }
    }

    fn market() -> Market {
        Market {
            symbol: "INJ/USDT".to_string(),
            market_type: MarketType::Spot,
            testnet_market_id: MarketId::new("0xtest"),
            mainnet_market_id: MarketId::new("0xmain"),
            price_scale: 12,
            base_decimals: 18,
            quote_decimals: 6,
            min_price_tick: dec!(0.0001),
            min_quantity_tick: dec!(0.01),
            min_notional: dec!(0),
        }
    }

    fn quote(last: Option<Decimal>, bid: Option<Decimal>, ask: Option<Decimal>) -> MidQuote {
        MidQuote {
            last_trade: last,
            best_bid: bid,
            best_ask: ask,
        }
    }

    #[test]
    fn test_mid_prefers_coherent_last_trade() {
        let q = quote(Some(dec!(24.60)), Some(dec!(24.50)), Some(dec!(24.70)));
        assert_eq!(mid_from_quote(&q), Some(dec!(24.60)));
    }

    #[test]
    fn test_mid_discards_incoherent_last_trade() {
        // Book mid 24.60, trade 30 is >5% away.
        let q = quote(Some(dec!(30)), Some(dec!(24.50)), Some(dec!(24.70)));
        assert_eq!(mid_from_quote(&q), Some(dec!(24.60)));
    }

    #[test]
    fn test_mid_one_sided_book() {
        assert_eq!(
            mid_from_quote(&quote(None, Some(dec!(24.5)), None)),
            Some(dec!(24.5))
        );
        assert_eq!(
            mid_from_quote(&quote(None, None, Some(dec!(24.7)))),
            Some(dec!(24.7))
        );
    }

    #[test]
    fn test_mid_empty_book_with_trade() {
        assert_eq!(
            mid_from_quote(&quote(Some(dec!(24.6)), None, None)),
            Some(dec!(24.6))
        );
    }

    #[test]
    fn test_mid_unavailable() {
        assert_eq!(mid_from_quote(&quote(None, None, None)), None);
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let script = QuoteScript::new(vec![Ok(quote(
            None,
            Some(dec!(24.5)),
            Some(dec!(24.7)),
        ))]);
        let clock = MockClock::new();
        let oracle = PriceOracle::with_clock(
            Arc::clone(&script) as Arc<dyn ChainClient>,
            Duration::from_secs(5),
            clock,
        );

        let m = market();
        let first = oracle.mainnet_mid(&m).await.unwrap();
        let second = oracle.mainnet_mid(&m).await.unwrap();

        assert_eq!(first, Some(Price::new(dec!(24.6))));
        assert_eq!(second, first);
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_serves_recent_cache() {
        let script = QuoteScript::new(vec![
            Ok(quote(None, Some(dec!(24.5)), Some(dec!(24.7)))),
            Err(ChainError::Transport("down".to_string())),
        ]);
        let clock = MockClock::new();
        let oracle = PriceOracle::with_clock(
            script as Arc<dyn ChainClient>,
            Duration::from_secs(5),
            Arc::clone(&clock),
        );

        let m = market();
        assert!(oracle.mainnet_mid(&m).await.unwrap().is_some());

        // Past the TTL but within 2x: error falls back to the cached mid.
        clock.advance(Duration::from_secs(7));
        assert_eq!(
            oracle.mainnet_mid(&m).await.unwrap(),
            Some(Price::new(dec!(24.6)))
        );
    }

    #[tokio::test]
    async fn test_fetch_error_never_serves_stale_cache() {
        let script = QuoteScript::new(vec![
            Ok(quote(None, Some(dec!(24.5)), Some(dec!(24.7)))),
            Err(ChainError::Transport("down".to_string())),
        ]);
        let clock = MockClock::new();
        let oracle = PriceOracle::with_clock(
            script as Arc<dyn ChainClient>,
            Duration::from_secs(5),
            Arc::clone(&clock),
        );

        let m = market();
        assert!(oracle.mainnet_mid(&m).await.unwrap().is_some());

        // Older than 2x the interval: unavailable.
        clock.advance(Duration::from_secs(11));
        assert_eq!(oracle.mainnet_mid(&m).await.unwrap(), None);
    }
}
