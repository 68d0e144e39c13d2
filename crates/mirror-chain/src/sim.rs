//! In-memory venue for dry runs and tests.
//!
//! Implements [`ChainClient`] over a local book: broadcasts mutate
//! per-wallet order sets under real sequence checking, queries read them
//! back. Mid quotes are whatever the harness (or the dry-run config) set.
//! Faults can be queued to exercise the engine's recovery paths.

use crate::client::ChainClient;
use crate::error::{ChainError, ChainResult};
use crate::types::{BatchOrders, BookDepth, BookLevel, MidQuote, SignedBatch, TxResult};
use async_trait::async_trait;
use mirror_core::{
    Market, MarketId, OpenOrder, OrderHash, OrderSide, OrderState, Price, Size, WalletId,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Serialize, Deserialize)]
struct SimPayload {
    wallet: WalletId,
    batch: BatchOrders,
    market_id: MarketId,
}

#[derive(Debug, Clone)]
struct SimOrder {
    wallet: WalletId,
    order: OpenOrder,
}

#[derive(Debug, Clone, Copy)]
struct MarketScale {
    price_scale: u32,
    base_decimals: u32,
}

#[derive(Default)]
struct SimState {
    sequences: HashMap<WalletId, u64>,
    /// market id -> resting orders
    books: HashMap<MarketId, Vec<SimOrder>>,
    mids: HashMap<MarketId, MidQuote>,
    scales: HashMap<MarketId, MarketScale>,
}

/// Local stand-in for the chain, good enough to run the whole engine
/// against without touching a network.
#[derive(Default)]
pub struct SimulatedClient {
    state: Mutex<SimState>,
    next_hash: AtomicU64,
    /// Errors popped (front first) by the next broadcasts.
    broadcast_faults: Mutex<Vec<ChainError>>,
}

impl SimulatedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Teach the sim a market's scaling so queries can return human units.
    pub fn register_market(&self, market: &Market) {
        let mut state = self.state.lock();
        let scale = MarketScale {
            price_scale: market.price_scale,
            base_decimals: market.base_decimals,
        };
        state
            .scales
            .insert(market.testnet_market_id.clone(), scale);
        state
            .scales
            .insert(market.mainnet_market_id.clone(), scale);
    }

    /// Set the quote served for one venue book.
    pub fn set_mid(&self, market_id: &MarketId, quote: MidQuote) {
        self.state.lock().mids.insert(market_id.clone(), quote);
    }

    pub fn set_sequence(&self, wallet: &WalletId, sequence: u64) {
        self.state.lock().sequences.insert(wallet.clone(), sequence);
    }

    pub fn sequence_of(&self, wallet: &WalletId) -> u64 {
        *self.state.lock().sequences.get(wallet).unwrap_or(&0)
    }

    /// Queue an error for an upcoming broadcast (front of queue first).
    pub fn inject_broadcast_fault(&self, fault: ChainError) {
        self.broadcast_faults.lock().push(fault);
    }

    pub fn open_order_count(&self, market_id: &MarketId) -> usize {
        self.state
            .lock()
            .books
            .get(market_id)
            .map(|b| b.len())
            .unwrap_or(0)
    }

    fn descale(scale: Option<MarketScale>, price: Decimal, quantity: Decimal) -> (Price, Size) {
        match scale {
            Some(s) => (
                Price::new(price / pow10(s.price_scale)),
                Size::new(quantity / pow10(s.base_decimals)),
            ),
            None => (Price::new(price), Size::new(quantity)),
        }
    }
}

fn pow10(exp: u32) -> Decimal {
    let mut out = Decimal::ONE;
    for _ in 0..exp {
        out *= Decimal::from(10);
    }
    out
}

#[async_trait]
impl ChainClient for SimulatedClient {
    async fn query_account_sequence(&self, wallet: &WalletId) -> ChainResult<u64> {
        Ok(self.sequence_of(wallet))
    }

    async fn query_open_orders(
        &self,
        wallet: &WalletId,
        market_id: &MarketId,
    ) -> ChainResult<Vec<OpenOrder>> {
        let state = self.state.lock();
        Ok(state
            .books
            .get(market_id)
            .map(|book| {
                book.iter()
                    .filter(|o| &o.wallet == wallet)
                    .map(|o| o.order.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn query_orderbook(&self, market_id: &MarketId) -> ChainResult<BookDepth> {
        let state = self.state.lock();
        let mut bids = Vec::new();
        let mut asks = Vec::new();
        if let Some(book) = state.books.get(market_id) {
            for sim in book {
                let level = BookLevel {
                    price: sim.order.price.inner(),
                    quantity: sim.order.quantity.inner(),
                };
                match sim.order.side {
                    OrderSide::Buy => bids.push(level),
                    OrderSide::Sell => asks.push(level),
                }
            }
        }
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(BookDepth { bids, asks })
    }

    async fn query_mid(&self, market_id: &MarketId) -> ChainResult<MidQuote> {
        Ok(self
            .state
            .lock()
            .mids
            .get(market_id)
            .copied()
            .unwrap_or_default())
    }

    async fn build_signed_batch(
        &self,
        wallet: &WalletId,
        sequence: u64,
        batch: &BatchOrders,
    ) -> ChainResult<SignedBatch> {
        let market_id = batch
            .creates
            .first()
            .map(|o| o.market_id.clone())
            .or_else(|| batch.cancels.first().map(|c| c.market_id.clone()))
            .ok_or_else(|| ChainError::Signing("empty batch".to_string()))?;

        let payload = SimPayload {
            wallet: wallet.clone(),
            batch: batch.clone(),
            market_id,
        };
        let bytes = serde_json::to_vec(&payload)
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        Ok(SignedBatch {
            sequence,
            payload: bytes,
        })
    }

    async fn broadcast_batch(&self, tx: SignedBatch) -> ChainResult<TxResult> {
        {
            let mut faults = self.broadcast_faults.lock();
            if !faults.is_empty() {
                return Err(faults.remove(0));
            }
        }

        let payload: SimPayload = serde_json::from_slice(&tx.payload)
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let mut state = self.state.lock();
        let expected = *state.sequences.get(&payload.wallet).unwrap_or(&0);
        if tx.sequence != expected {
            return Err(ChainError::Broadcast {
                code: 32,
                raw_log: format!(
                    "account sequence mismatch, expected {expected}, got {}: incorrect account sequence",
                    tx.sequence
                ),
            });
        }

        let scale = state.scales.get(&payload.market_id).copied();
        let book = state.books.entry(payload.market_id.clone()).or_default();

        for cancel in &payload.batch.cancels {
            book.retain(|o| o.order.order_hash != cancel.order_hash);
        }
        for create in &payload.batch.creates {
            let (price, quantity) = Self::descale(scale, create.price, create.quantity);
            let hash = self.next_hash.fetch_add(1, Ordering::SeqCst);
            book.push(SimOrder {
                wallet: payload.wallet.clone(),
                order: OpenOrder {
                    order_hash: OrderHash::new(format!("0xsim{hash:08x}")),
                    side: create.side,
                    price,
                    quantity,
                    filled_quantity: Size::ZERO,
                    state: OrderState::Booked,
                },
            });
        }

        state.sequences.insert(payload.wallet, expected + 1);
        Ok(TxResult::accepted(format!("0xtx{:08x}", tx.sequence)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainOrder;
    use mirror_core::MarketType;
    use rust_decimal_macros::dec;

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

    fn batch(creates: Vec<ChainOrder>) -> BatchOrders {
        BatchOrders {
            market_type: MarketType::Spot,
            creates,
            cancels: Vec::new(),
        }
    }

    fn order(price: Decimal, quantity: Decimal) -> ChainOrder {
        ChainOrder {
            market_id: MarketId::new("0xtest"),
            side: OrderSide::Buy,
            price,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_broadcast_checks_sequence() {
        let sim = SimulatedClient::new();
        let wallet = WalletId::new("wallet_1");
        sim.set_sequence(&wallet, 7);

        let b = batch(vec![order(dec!(100), dec!(1))]);
        let signed = sim.build_signed_batch(&wallet, 6, &b).await.unwrap();
        let err = sim.broadcast_batch(signed).await.unwrap_err();
        assert!(err.reason().contains("expected 7"));

        let signed = sim.build_signed_batch(&wallet, 7, &b).await.unwrap();
        assert!(sim.broadcast_batch(signed).await.unwrap().ok());
        assert_eq!(sim.sequence_of(&wallet), 8);
    }

    #[tokio::test]
    async fn test_orders_round_trip_in_human_units() {
        let sim = SimulatedClient::new();
        let m = market();
        sim.register_market(&m);
        let wallet = WalletId::new("wallet_1");

        // 24.5 scaled by 1e12, 15 scaled by 1e18.
        let chain_price = dec!(24.5) * pow10(12);
        let chain_qty = dec!(15) * pow10(18);
        let b = batch(vec![order(chain_price, chain_qty)]);

        let signed = sim.build_signed_batch(&wallet, 0, &b).await.unwrap();
        sim.broadcast_batch(signed).await.unwrap();

        let orders = sim
            .query_open_orders(&wallet, &m.testnet_market_id)
            .await
            .unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].price, Price::new(dec!(24.5)));
        assert_eq!(orders[0].quantity, Size::new(dec!(15)));
    }

    #[tokio::test]
    async fn test_injected_fault_consumed_once() {
        let sim = SimulatedClient::new();
        let wallet = WalletId::new("wallet_1");
        sim.inject_broadcast_fault(ChainError::Broadcast {
            code: 30,
            raw_log: "tx timeout height exceeded".to_string(),
        });

        let b = batch(vec![order(dec!(100), dec!(1))]);
        let signed = sim.build_signed_batch(&wallet, 0, &b).await.unwrap();
        assert!(sim.broadcast_batch(signed).await.is_err());

        let signed = sim.build_signed_batch(&wallet, 0, &b).await.unwrap();
        assert!(sim.broadcast_batch(signed).await.is_ok());
    }
}
