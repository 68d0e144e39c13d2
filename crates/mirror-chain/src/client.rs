//! The `ChainClient` trait: everything the engine needs from the chain.

use crate::error::ChainResult;
use crate::types::{BatchOrders, BookDepth, MidQuote, SignedBatch, TxResult};
use async_trait::async_trait;
use mirror_core::{MarketId, OpenOrder, WalletId};

/// Typed access to the chain SDK (signing, broadcast, indexer queries).
///
/// Implementations are expected to be cheap to clone behind an `Arc` and
/// safe for concurrent use across workers. Each call maps to one network
/// round-trip; retries and timeouts are the caller's responsibility.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Authoritative account sequence for a wallet.
    async fn query_account_sequence(&self, wallet: &WalletId) -> ChainResult<u64>;

    /// The wallet's live orders on one testnet market, in human units.
    async fn query_open_orders(
        &self,
        wallet: &WalletId,
        market_id: &MarketId,
    ) -> ChainResult<Vec<OpenOrder>>;

    /// Full depth of one venue book, in human units.
    async fn query_orderbook(&self, market_id: &MarketId) -> ChainResult<BookDepth>;

    /// Mid-price ingredients (last trade plus best bid/ask) for one book.
    async fn query_mid(&self, market_id: &MarketId) -> ChainResult<MidQuote>;

    /// Sign a batched create-and-cancel transaction at a given sequence.
    async fn build_signed_batch(
        &self,
        wallet: &WalletId,
        sequence: u64,
        batch: &BatchOrders,
    ) -> ChainResult<SignedBatch>;

    /// Broadcast a signed transaction and wait for the node's verdict.
    async fn broadcast_batch(&self, tx: SignedBatch) -> ChainResult<TxResult>;
}
