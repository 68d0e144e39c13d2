//! Own-order and global-depth views of a testnet book.

use crate::FeedResult;
use chrono::Utc;
use mirror_chain::ChainClient;
use mirror_core::{Market, OpenOrder, OrderbookSnapshot, Price, WalletId};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Band half-width for the near-price count.
const NEAR_PRICE_BAND: Decimal = Decimal::from_parts(5, 0, 0, false, 2); // 0.05

/// Fetches the worker's own orders and a global depth snapshot.
pub struct OrderbookView {
    client: Arc<dyn ChainClient>,
}

impl OrderbookView {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    /// The wallet's live orders on one market.
    pub async fn own_orders(
        &self,
        wallet: &WalletId,
        market: &Market,
    ) -> FeedResult<Vec<OpenOrder>> {
        Ok(self
            .client
            .query_open_orders(wallet, &market.testnet_market_id)
            .await?)
    }

    /// Global depth plus the near-price count against `reference +/- 5%`.
    ///
    /// `own_count` is the caller's own-order count for the same market,
    /// carried along so the planner can tell its depth from the market's.
    pub async fn snapshot(
        &self,
        market: &Market,
        reference: Price,
        own_count: usize,
    ) -> FeedResult<OrderbookSnapshot> {
        let depth = self.client.query_orderbook(&market.testnet_market_id).await?;

        let lo = reference.inner() * (Decimal::ONE - NEAR_PRICE_BAND);
        let hi = reference.inner() * (Decimal::ONE + NEAR_PRICE_BAND);
        let near = depth
            .bids
            .iter()
            .chain(depth.asks.iter())
            .filter(|level| level.price >= lo && level.price <= hi)
            .count();

        Ok(OrderbookSnapshot {
            market: market.symbol.clone(),
            best_bid: depth.best_bid().map(Price::new),
            best_ask: depth.best_ask().map(Price::new),
            total_orders: depth.total_orders(),
            orders_near_price: near,
            own_orders: own_count,
            sampled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mirror_chain::{
        BatchOrders, BookDepth, BookLevel, ChainResult, MidQuote, SignedBatch, TxResult,
    };
    use mirror_core::{MarketId, MarketType};
    use rust_decimal_macros::dec;

    struct FixedBook {
        depth: BookDepth,
    }

    #[async_trait]
    impl ChainClient for FixedBook {
        async fn query_account_sequence(&self, _wallet: &WalletId) -> ChainResult<u64> {
            unimplemented!()
        }

        async fn query_open_orders(
            &self,
            _wallet: &WalletId,
            _market_id: &MarketId,
        ) -> ChainResult<Vec<OpenOrder>> {
            Ok(Vec::new())
        }

        async fn query_orderbook(&self, _market_id: &MarketId) -> ChainResult<BookDepth> {
            Ok(self.depth.clone())
        }

        async fn query_mid(&self, _market_id: &MarketId) -> ChainResult<MidQuote> {
            unimplemented!()
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

    fn level(price: Decimal) -> BookLevel {
        BookLevel {
            price,
            quantity: dec!(1),
        }
    }

    #[tokio::test]
    async fn test_snapshot_near_count() {
        // Reference 100: band is [95, 105].
        let client = FixedBook {
            depth: BookDepth {
                bids: vec![level(dec!(99)), level(dec!(96)), level(dec!(90))],
                asks: vec![level(dec!(101)), level(dec!(104.9)), level(dec!(120))],
            },
        };
        let view = OrderbookView::new(Arc::new(client));

        let snapshot = view
            .snapshot(&market(), Price::new(dec!(100)), 2)
            .await
            .unwrap();

        assert_eq!(snapshot.total_orders, 6);
        assert_eq!(snapshot.orders_near_price, 4);
        assert_eq!(snapshot.own_orders, 2);
        assert_eq!(snapshot.best_bid, Some(Price::new(dec!(99))));
        assert_eq!(snapshot.best_ask, Some(Price::new(dec!(101))));
    }

    #[tokio::test]
    async fn test_snapshot_empty_book() {
        let client = FixedBook {
            depth: BookDepth::default(),
        };
        let view = OrderbookView::new(Arc::new(client));

        let snapshot = view
            .snapshot(&market(), Price::new(dec!(100)), 0)
            .await
            .unwrap();

        assert_eq!(snapshot.total_orders, 0);
        assert_eq!(snapshot.orders_near_price, 0);
        assert!(snapshot.best_bid.is_none());
        assert!(snapshot.best_ask.is_none());
    }
}
