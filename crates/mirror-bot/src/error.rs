//! Application error types and process exit codes.

use mirror_core::CoreError;
use mirror_mm::ParamsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("market params error: {0}")]
    Params(#[from] ParamsError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("unknown wallet: {0}")]
    UnknownWallet(String),

    /// Chain connectivity could not be established at startup.
    #[error("chain connectivity error: {0}")]
    Connectivity(String),

    /// Invariant violation inside the engine; indicates a bug.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Map to the process exit code contract:
    /// 0 clean shutdown, 2 configuration, 3 unknown wallet/market,
    /// 4 chain connectivity, 1 anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Params(_) | Self::Io(_) => 2,
            Self::Core(CoreError::InvalidMarket { .. }) => 2,
            Self::Core(CoreError::UnknownMarket(_) | CoreError::UnknownWallet(_)) => 3,
            Self::UnknownWallet(_) => 3,
            Self::Connectivity(_) => 4,
            Self::Fatal(_) => 1,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
