//! Chain client interface consumed by the mirroring engine.
//!
//! The engine never talks gRPC or signs bytes itself; everything below the
//! `ChainClient` trait (SDK, signing, broadcast, indexer queries) is an
//! external collaborator. Tests drive the engine through a scripted mock.

pub mod client;
pub mod error;
pub mod sim;
pub mod types;

pub use client::ChainClient;
pub use error::{ChainError, ChainResult};
pub use sim::SimulatedClient;
pub use types::{
    BatchOrders, BookDepth, BookLevel, ChainCancel, ChainOrder, MidQuote, SignedBatch, TxResult,
};
