//! Core error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Requested market symbol is not in the catalog.
    #[error("unknown market: {0}")]
    UnknownMarket(String),

    /// Requested wallet has no market assignments.
    #[error("unknown wallet: {0}")]
    UnknownWallet(String),

    /// Market metadata failed validation at load time.
    #[error("invalid market {symbol}: {reason}")]
    InvalidMarket { symbol: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
