//! The per-wallet control loop.
//!
//! One worker owns one wallet and trades its assigned markets in a
//! round-robin, one market per cycle, so sequence numbers stay serial per
//! account. Each cycle samples both venues, snapshots depth, asks the
//! planner for an action, and submits one batched transaction under a
//! sequence lease. Repeated failures trip the circuit breaker into a
//! cooling pause instead of aborting.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use mirror_chain::{ChainClient, ChainError};
use mirror_core::{Market, Phase, Price, PriceSample, WalletId};
use mirror_executor::{RetryKind, SequenceController, SubmitError, TxBuilder};
use mirror_feed::{FeedResult, OrderbookView, PriceOracle};
use mirror_mm::{MarketParams, PlanInputs, Planner};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Bound on every network call.
const NETWORK_TIMEOUT: Duration = Duration::from_secs(10);
/// Broadcast attempts within one cycle before cooling.
const MAX_BROADCAST_ATTEMPTS: u32 = 3;
/// Circuit-breaker pause.
const COOLDOWN: Duration = Duration::from_secs(10);
/// Cadence of the proactive refresh and drift check between cycles.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Cooling,
    Stopping,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Cooling => write!(f, "cooling"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Per-worker counters, reported at shutdown and via `worker_status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradingStats {
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub broadcasts: u64,
    pub orders_created: u64,
    pub orders_cancelled: u64,
    pub sequence_errors: u64,
}

/// Snapshot of a worker's externally visible state.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub started_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub stats: TradingStats,
}

impl WorkerStatus {
    fn new() -> Self {
        Self {
            state: WorkerState::Starting,
            started_at: Utc::now(),
            last_cycle_at: None,
            last_error: None,
            stats: TradingStats::default(),
        }
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Everything a worker needs at construction.
pub struct WorkerContext {
    pub wallet: WalletId,
    pub max_open_orders: usize,
    pub markets: Vec<Arc<Market>>,
    pub params: HashMap<String, MarketParams>,
    pub client: Arc<dyn ChainClient>,
    pub oracle_ttl: Duration,
    pub seed: u64,
}

/// How one cycle ended, from the loop's point of view.
enum CycleEnd {
    Completed,
    Skipped,
    Cooling,
    ShuttingDown,
}

pub struct WalletWorker {
    wallet: WalletId,
    max_open_orders: usize,
    markets: Vec<Arc<Market>>,
    params: HashMap<String, MarketParams>,
    client: Arc<dyn ChainClient>,
    oracle: PriceOracle,
    view: OrderbookView,
    sequence: SequenceController,
    planner: Planner,
    status: Arc<RwLock<WorkerStatus>>,
    shutdown: watch::Receiver<bool>,
    next_market: usize,
    last_maintenance: Instant,
}

impl WalletWorker {
    pub fn new(ctx: WorkerContext, shutdown: watch::Receiver<bool>) -> Self {
        let WorkerContext {
            wallet,
            max_open_orders,
            markets,
            params,
            client,
            oracle_ttl,
            seed,
        } = ctx;
        Self {
            oracle: PriceOracle::new(Arc::clone(&client), oracle_ttl),
            view: OrderbookView::new(Arc::clone(&client)),
            sequence: SequenceController::new(Arc::clone(&client), wallet.clone()),
            planner: Planner::new(seed),
            wallet,
            max_open_orders,
            markets,
            params,
            client,
            status: Arc::new(RwLock::new(WorkerStatus::new())),
            shutdown,
            next_market: 0,
            last_maintenance: Instant::now(),
        }
    }

    /// Handle for the supervisor's `worker_status`.
    pub fn status_handle(&self) -> Arc<RwLock<WorkerStatus>> {
        Arc::clone(&self.status)
    }

    /// Run until shutdown. Only configuration and invariant errors return.
    pub async fn run(mut self) -> AppResult<()> {
        info!(wallet = %self.wallet, markets = self.markets.len(), "worker starting");
        self.set_state(WorkerState::Starting);

        if self.markets.is_empty() {
            let err = AppError::Config(format!("wallet {} has no enabled markets", self.wallet));
            self.record_error(&err.to_string());
            return Err(err);
        }
        self.sequence.refresh(true).await;
        self.set_state(WorkerState::Running);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let market = Arc::clone(&self.markets[self.next_market % self.markets.len()]);
            self.next_market += 1;

            let cycle_interval = self
                .params
                .get(&market.symbol)
                .map(|p| p.cycle_interval())
                .unwrap_or(Duration::from_secs(15));

            let end = match self.cycle(&market).await {
                Ok(end) => end,
                Err(err) => {
                    self.set_state(WorkerState::Stopped);
                    return Err(err);
                }
            };
            {
                let mut status = self.status.write();
                status.last_cycle_at = Some(Utc::now());
                status.stats.cycles += 1;
                if matches!(end, CycleEnd::Skipped) {
                    status.stats.skipped_cycles += 1;
                }
            }

            match end {
                CycleEnd::ShuttingDown => break,
                CycleEnd::Cooling => {
                    if self.cool_down().await {
                        break;
                    }
                }
                CycleEnd::Completed | CycleEnd::Skipped => {
                    if self.sequence.tripped() {
                        if self.cool_down().await {
                            break;
                        }
                    } else {
                        self.between_cycles().await;
                        if self.sleep_or_shutdown(cycle_interval).await {
                            break;
                        }
                    }
                }
            }
        }

        self.set_state(WorkerState::Stopping);
        let stats = self.status.read().stats;
        info!(
            wallet = %self.wallet,
            cycles = stats.cycles,
            skipped = stats.skipped_cycles,
            broadcasts = stats.broadcasts,
            orders_created = stats.orders_created,
            orders_cancelled = stats.orders_cancelled,
            sequence_errors = stats.sequence_errors,
            "worker stopped"
        );
        self.set_state(WorkerState::Stopped);
        Ok(())
    }

    /// One trading cycle for one market.
    async fn cycle(&mut self, market: &Market) -> AppResult<CycleEnd> {
        let params = self
            .params
            .get(&market.symbol)
            .cloned()
            .ok_or_else(|| AppError::Config(format!("no params for {}", market.symbol)))?;

        // 1. Sample both venues.
        let mainnet_mid =
            fetch(&self.wallet, market, "mainnet mid", self.oracle.mainnet_mid(market))
                .await
                .flatten();
        let Some(mainnet_mid) = mainnet_mid else {
            debug!(wallet = %self.wallet, market = %market.symbol, "no mainnet reference, skipping cycle");
            return Ok(CycleEnd::Skipped);
        };
        let testnet_mid =
            fetch(&self.wallet, market, "testnet mid", self.oracle.testnet_mid(market))
                .await
                .flatten();

        // 2. Own orders and global depth.
        let Some(own_orders) = fetch(
            &self.wallet,
            market,
            "own orders",
            self.view.own_orders(&self.wallet, market),
        )
        .await
        else {
            return Ok(CycleEnd::Skipped);
        };
        let Some(snapshot) = fetch(
            &self.wallet,
            market,
            "orderbook snapshot",
            self.view.snapshot(market, mainnet_mid, own_orders.len()),
        )
        .await
        else {
            return Ok(CycleEnd::Skipped);
        };

        let sample = PriceSample {
            market: market.symbol.clone(),
            mainnet_mid: Some(mainnet_mid),
            testnet_mid,
            sampled_at: Utc::now(),
        };
        self.log_alignment(market, &params, &sample, mainnet_mid);

        // 3. Plan.
        let plan = self.planner.plan(&PlanInputs {
            market,
            params: &params,
            sample: &sample,
            snapshot: &snapshot,
            own_orders: &own_orders,
            max_open_orders: self.max_open_orders,
        });

        // 4. Nothing to do.
        if plan.phase == Phase::Idle || plan.is_empty() {
            debug!(wallet = %self.wallet, market = %market.symbol, "idle cycle");
            return Ok(CycleEnd::Completed);
        }
        info!(
            wallet = %self.wallet,
            market = %market.symbol,
            phase = %plan.phase,
            creates = plan.creates.len(),
            cancels = plan.cancels.len(),
            rationale = %plan.rationale,
            "plan ready"
        );

        // 5. Build the batch; an emptied-out plan skips the broadcast and
        // consumes no sequence number.
        let batch = match TxBuilder::build(market, &plan, &own_orders) {
            Ok(batch) => batch,
            Err(mirror_executor::BuildError::NothingToDo) => {
                debug!(wallet = %self.wallet, market = %market.symbol, "plan emptied out, skipping broadcast");
                return Ok(CycleEnd::Completed);
            }
        };

        // 6. Broadcast under the sequence lease, retrying per the error
        // classification.
        self.submit(market, batch).await
    }

    async fn submit(
        &mut self,
        market: &Market,
        batch: mirror_chain::BatchOrders,
    ) -> AppResult<CycleEnd> {
        for attempt in 1..=MAX_BROADCAST_ATTEMPTS {
            let client = Arc::clone(&self.client);
            let wallet = self.wallet.clone();
            let tx_batch = batch.clone();
            let result = self
                .sequence
                .with_sequence(move |seq| async move {
                    let signed = timeout(
                        NETWORK_TIMEOUT,
                        client.build_signed_batch(&wallet, seq, &tx_batch),
                    )
                    .await
                    .map_err(|_| ChainError::Timeout(NETWORK_TIMEOUT.as_secs()))??;
                    timeout(NETWORK_TIMEOUT, client.broadcast_batch(signed))
                        .await
                        .map_err(|_| ChainError::Timeout(NETWORK_TIMEOUT.as_secs()))?
                })
                .await;

            match result {
                Ok(tx) => {
                    info!(
                        wallet = %self.wallet,
                        market = %market.symbol,
                        tx_hash = %tx.tx_hash,
                        creates = batch.creates.len(),
                        cancels = batch.cancels.len(),
                        "batch accepted"
                    );
                    let mut status = self.status.write();
                    status.stats.broadcasts += 1;
                    status.stats.orders_created += batch.creates.len() as u64;
                    status.stats.orders_cancelled += batch.cancels.len() as u64;
                    status.last_error = None;
                    return Ok(CycleEnd::Completed);
                }
                Err(SubmitError::Retryable { kind, backoff }) => {
                    if kind == RetryKind::SequenceMismatch {
                        self.status.write().stats.sequence_errors += 1;
                    }
                    self.record_error(&format!("broadcast failed ({kind:?})"));
                    warn!(
                        wallet = %self.wallet,
                        market = %market.symbol,
                        attempt,
                        max = MAX_BROADCAST_ATTEMPTS,
                        ?kind,
                        ?backoff,
                        "broadcast attempt failed"
                    );
                    if attempt == MAX_BROADCAST_ATTEMPTS {
                        return Ok(CycleEnd::Cooling);
                    }
                    if self.sleep_or_shutdown(backoff).await {
                        return Ok(CycleEnd::ShuttingDown);
                    }
                }
                Err(SubmitError::Fatal(msg)) => {
                    self.record_error(&msg);
                    return Err(AppError::Fatal(msg));
                }
            }
        }
        Ok(CycleEnd::Cooling)
    }

    /// Proactive refresh and drift check, throttled to every 30 s.
    async fn between_cycles(&mut self) {
        if self.last_maintenance.elapsed() < MAINTENANCE_INTERVAL {
            return;
        }
        self.last_maintenance = Instant::now();
        self.sequence.refresh(false).await;
        self.sequence.check_drift().await;
    }

    /// Circuit-breaker pause. Returns true when shutdown fired.
    async fn cool_down(&mut self) -> bool {
        warn!(wallet = %self.wallet, cooldown = ?COOLDOWN, "entering cooldown");
        self.set_state(WorkerState::Cooling);
        if self.sleep_or_shutdown(COOLDOWN).await {
            return true;
        }
        self.sequence.refresh(true).await;
        self.sequence.reset_errors();
        self.set_state(WorkerState::Running);
        info!(wallet = %self.wallet, "cooldown finished, resuming");
        false
    }

    /// Sleep, waking early on shutdown. Returns true when shutdown fired.
    async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        if *self.shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            result = self.shutdown.changed() => {
                result.is_err() || *self.shutdown.borrow()
            }
        }
    }

    fn log_alignment(
        &self,
        market: &Market,
        params: &MarketParams,
        sample: &PriceSample,
        mainnet_mid: Price,
    ) {
        if let Some(gap) = sample.gap() {
            let threshold = Decimal::from(params.deviation_threshold_bps) / Decimal::from(10_000);
            if gap > threshold {
                info!(
                    wallet = %self.wallet,
                    market = %market.symbol,
                    mainnet = %mainnet_mid,
                    testnet = ?sample.testnet_mid,
                    gap_pct = %(gap * Decimal::ONE_HUNDRED),
                    "venues misaligned beyond deviation threshold"
                );
            }
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.status.write().state = state;
    }

    fn record_error(&self, message: &str) {
        self.status.write().last_error = Some(message.to_string());
    }
}

/// Run a feed fetch under the network timeout, mapping failure to `None`
/// so the caller can skip the cycle.
async fn fetch<T>(
    wallet: &WalletId,
    market: &Market,
    what: &str,
    fut: impl Future<Output = FeedResult<T>>,
) -> Option<T> {
    match timeout(NETWORK_TIMEOUT, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(wallet = %wallet, market = %market.symbol, what, error = %err, "fetch failed, skipping cycle");
            None
        }
        Err(_) => {
            warn!(wallet = %wallet, market = %market.symbol, what, "fetch timed out, skipping cycle");
            None
        }
    }
}
