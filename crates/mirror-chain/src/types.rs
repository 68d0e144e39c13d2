//! Wire types crossing the chain client boundary.

use mirror_core::{MarketId, MarketType, OrderHash, OrderSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw mid-price ingredients for one venue book.
///
/// Prices are in human units; the client undoes chain scaling before
/// returning. Any field may be missing on a thin testnet book.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MidQuote {
    pub last_trade: Option<Decimal>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

/// One price level of a venue book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Full depth of one venue book, best levels first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BookDepth {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookDepth {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn total_orders(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

/// One create in chain units, ready for message composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOrder {
    pub market_id: MarketId,
    pub side: OrderSide,
    /// Chain-unit price, a multiple of the market's price tick.
    pub price: Decimal,
    /// Chain-unit quantity, a multiple of the market's quantity tick.
    pub quantity: Decimal,
}

/// One cancel in chain terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCancel {
    pub market_id: MarketId,
    pub order_hash: OrderHash,
}

/// The batched create-and-cancel payload for a single transaction.
///
/// Spot and derivative orders ride different message fields on the chain,
/// so the batch is tagged with the market type it was built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOrders {
    pub market_type: MarketType,
    pub creates: Vec<ChainOrder>,
    pub cancels: Vec<ChainCancel>,
}

impl BatchOrders {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.cancels.is_empty()
    }
}

/// An opaque signed transaction produced by the client's signer.
#[derive(Debug, Clone)]
pub struct SignedBatch {
    pub sequence: u64,
    pub payload: Vec<u8>,
}

/// Broadcast outcome as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    /// Zero means accepted.
    pub code: u32,
    pub raw_log: String,
    pub tx_hash: String,
}

impl TxResult {
    pub fn ok(&self) -> bool {
        self.code == 0
    }

    pub fn accepted(tx_hash: impl Into<String>) -> Self {
        Self {
            code: 0,
            raw_log: String::new(),
            tx_hash: tx_hash.into(),
        }
    }
}
