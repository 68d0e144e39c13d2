//! Chain client error types.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ChainError {
    /// Query or broadcast failed before reaching the chain (gRPC/REST).
    #[error("transport error: {0}")]
    Transport(String),

    /// Call exceeded its deadline.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Transaction was broadcast but rejected by the chain.
    ///
    /// `raw_log` carries the node's reason string; the sequence controller
    /// classifies it ("account sequence mismatch", "timeout height", ...).
    #[error("broadcast rejected (code {code}): {raw_log}")]
    Broadcast { code: u32, raw_log: String },

    /// Signing failed locally; indicates bad key material or a builder bug.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl ChainError {
    /// The reason string the sequence controller matches error patterns on.
    pub fn reason(&self) -> &str {
        match self {
            Self::Transport(msg) | Self::Signing(msg) => msg,
            Self::Broadcast { raw_log, .. } => raw_log,
            Self::Timeout(_) => "timeout",
        }
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
