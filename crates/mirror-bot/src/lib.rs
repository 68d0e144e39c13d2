//! Per-wallet mirroring workers and their supervisor.
//!
//! One [`worker::WalletWorker`] per wallet runs the sample-classify-act
//! loop across its assigned markets; the [`supervisor::Supervisor`]
//! starts, stops, and reports on workers. Configuration comes from a TOML
//! file plus `WALLET_<N>_*` environment variables for key material.

pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod supervisor;
pub mod worker;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use keys::{load_wallets_from_env, PrivateKey, WalletCredentials};
pub use supervisor::Supervisor;
pub use worker::{WalletWorker, WorkerContext, WorkerState, WorkerStatus};
