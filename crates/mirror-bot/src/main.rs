//! Testnet liquidity mirroring engine - entry point.

use clap::Parser;
use mirror_bot::config::EngineMode;
use mirror_bot::{load_wallets_from_env, AppConfig, AppError, AppResult, Supervisor};
use mirror_chain::{ChainClient, MidQuote, SimulatedClient};
use mirror_core::WalletId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Testnet liquidity mirroring engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MIRROR_CONFIG)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    mirror_bot::logging::init_logging();

    if let Err(err) = run().await {
        error!(error = %err, exit_code = err.exit_code(), "exiting");
        std::process::exit(err.exit_code());
    }
}

async fn run() -> AppResult<()> {
    let args = Args::parse();
    info!("starting mirror-bot v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(args.config.as_deref())?;
    let wallets = load_wallets_from_env();
    if wallets.is_empty() {
        return Err(AppError::Config(
            "no enabled wallets in environment (expected WALLET_<N>_PRIVATE_KEY)".to_string(),
        ));
    }

    let client = build_client(&config)?;
    verify_connectivity(&client, &wallets[0].wallet_id).await?;

    let supervisor = Supervisor::new(client, config, wallets)?;
    let started = supervisor.start_all()?;
    if started == 0 {
        return Err(AppError::Config(
            "no wallet has both credentials and market assignments".to_string(),
        ));
    }
    info!(started, "workers running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    supervisor.shutdown_all().await;
    info!("all workers stopped");
    Ok(())
}

fn build_client(config: &AppConfig) -> AppResult<Arc<dyn ChainClient>> {
    match config.engine.mode {
        EngineMode::DryRun => {
            info!("dry-run mode: using the in-memory venue");
            let sim = SimulatedClient::new();
            for (symbol, entry) in &config.markets {
                let market = entry.to_market(symbol);
                sim.register_market(&market);
                if let Some(reference) = entry.reference_price {
                    let quote = MidQuote {
                        last_trade: Some(reference),
                        best_bid: Some(reference),
                        best_ask: Some(reference),
                    };
                    sim.set_mid(&market.mainnet_market_id, quote);
                } else {
                    warn!(market = %symbol, "no reference_price configured; dry-run cycles will idle");
                }
            }
            Ok(Arc::new(sim))
        }
        EngineMode::Live => Err(AppError::Connectivity(
            "live mode requires a chain client binding; this build ships the dry-run venue only"
                .to_string(),
        )),
    }
}

/// Probe the chain before starting workers; persistent failure is the
/// unrecoverable-connectivity exit.
async fn verify_connectivity(client: &Arc<dyn ChainClient>, wallet: &WalletId) -> AppResult<()> {
    const ATTEMPTS: u32 = 3;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut last_error = String::new();
    for attempt in 1..=ATTEMPTS {
        match client.query_account_sequence(wallet).await {
            Ok(sequence) => {
                info!(wallet = %wallet, sequence, "chain connectivity verified");
                return Ok(());
            }
            Err(err) => {
                warn!(attempt, error = %err, "connectivity probe failed");
                last_error = err.to_string();
                if attempt < ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    Err(AppError::Connectivity(format!(
        "chain unreachable after {ATTEMPTS} attempts: {last_error}"
    )))
}
