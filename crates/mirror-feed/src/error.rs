//! Feed error types.

use mirror_chain::ChainError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum FeedError {
    /// The underlying chain query failed; the cycle should be skipped.
    #[error("transient fetch failure: {0}")]
    Transient(#[from] ChainError),
}

pub type FeedResult<T> = Result<T, FeedError>;
