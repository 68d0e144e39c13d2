//! Account sequence management with single-holder leases.
//!
//! Every signed transaction carries the wallet's next sequence number, and
//! the chain rejects anything out of order. This controller is the only
//! place that number lives: broadcasts go through [`SequenceController::with_sequence`],
//! which holds an exclusive lease for the duration of the call, advances
//! the counter on success, and classifies failures into a typed retry
//! directive the worker acts on.
//!
//! # Guarantees
//! - At most one lease is active per wallet; a second concurrent caller is
//!   an invariant violation, not a queue.
//! - Successful broadcasts consume sequence numbers strictly in order.
//! - A rejected broadcast never advances the local value; recovery goes
//!   through a forced refresh against the chain.

use mirror_chain::{ChainClient, ChainResult, TxResult};
use mirror_core::WalletId;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Failure classes a broadcast can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// The chain expected a different sequence number.
    SequenceMismatch,
    /// The transaction expired before inclusion (network congestion).
    TimeoutHeight,
    /// Any other rejection or transport failure.
    Other,
}

/// Typed outcome of a failed `with_sequence` call.
///
/// The retry policy is a pure function of this classification: the worker
/// sleeps for `backoff` and retries `Retryable` errors up to its attempt
/// budget, and exits on `Fatal`.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("retryable broadcast failure ({kind:?}), backoff {backoff:?}")]
    Retryable { kind: RetryKind, backoff: Duration },

    /// Invariant violation; indicates a bug, terminates the worker.
    #[error("fatal submit error: {0}")]
    Fatal(String),
}

impl SubmitError {
    pub fn backoff(&self) -> Duration {
        match self {
            Self::Retryable { backoff, .. } => *backoff,
            Self::Fatal(_) => Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct SequenceState {
    value: u64,
    last_refreshed_at: Option<Instant>,
}

/// Owns the signing sequence number for one wallet.
pub struct SequenceController {
    client: Arc<dyn ChainClient>,
    wallet: WalletId,
    state: Mutex<SequenceState>,
    consecutive_errors: AtomicU32,
}

impl SequenceController {
    /// Non-forced refreshes within this window are skipped.
    const REFRESH_MIN_INTERVAL: Duration = Duration::from_secs(30);
    /// Local/authoritative divergence beyond this is treated as drift.
    const DRIFT_TOLERANCE: u64 = 2;
    /// Consecutive failures that trip the circuit breaker.
    const TRIP_THRESHOLD: u32 = 3;

    const MISMATCH_BACKOFF: Duration = Duration::from_secs(3);
    const TIMEOUT_BACKOFF: Duration = Duration::from_secs(5);
    const OTHER_BACKOFF: Duration = Duration::from_secs(1);

    pub fn new(client: Arc<dyn ChainClient>, wallet: WalletId) -> Self {
        Self {
            client,
            wallet,
            state: Mutex::new(SequenceState {
                value: 0,
                last_refreshed_at: None,
            }),
            consecutive_errors: AtomicU32::new(0),
        }
    }

    /// Run a broadcast under an exclusive sequence lease.
    ///
    /// `f` receives the sequence number to sign with. On an accepted
    /// broadcast the local value advances to `seq + 1` and the error
    /// counter resets. On failure the error is classified, state is
    /// updated (including a forced refresh on sequence mismatch), and a
    /// [`SubmitError::Retryable`] carries the prescribed backoff.
    pub async fn with_sequence<F, Fut>(&self, f: F) -> Result<TxResult, SubmitError>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ChainResult<TxResult>>,
    {
        // The lease is mandatory: a second concurrent caller for the same
        // wallet is a bug upstream, so it fails loudly instead of waiting.
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| SubmitError::Fatal(format!("concurrent sequence lease for {}", self.wallet)))?;

        let seq = state.value;
        debug!(wallet = %self.wallet, seq, "sequence lease acquired");

        let outcome = f(seq).await;
        match outcome {
            Ok(result) if result.ok() => {
                state.value = seq + 1;
                self.consecutive_errors.store(0, Ordering::Release);
                debug!(wallet = %self.wallet, seq, tx_hash = %result.tx_hash, "broadcast accepted");
                Ok(result)
            }
            Ok(result) => {
                warn!(
                    wallet = %self.wallet,
                    seq,
                    code = result.code,
                    raw_log = %result.raw_log,
                    "broadcast rejected"
                );
                Err(self.classify_failure(&mut state, &result.raw_log).await)
            }
            Err(err) => {
                warn!(wallet = %self.wallet, seq, error = %err, "broadcast failed");
                let reason = err.reason().to_string();
                Err(self.classify_failure(&mut state, &reason).await)
            }
        }
    }

    /// Classify a failure reason and update state accordingly.
    async fn classify_failure(&self, state: &mut SequenceState, reason: &str) -> SubmitError {
        self.consecutive_errors.fetch_add(1, Ordering::AcqRel);
        let lower = reason.to_lowercase();

        if lower.contains("sequence mismatch") || lower.contains("account sequence") {
            // The node often names the sequence it wanted; adopting it
            // skips a round-trip when the refresh query is also degraded.
            if let Some(expected) = parse_expected_sequence(reason) {
                info!(wallet = %self.wallet, expected, "adopting expected sequence from raw log");
                state.value = expected;
            }
            self.refresh_locked(state, true).await;
            SubmitError::Retryable {
                kind: RetryKind::SequenceMismatch,
                backoff: Self::MISMATCH_BACKOFF,
            }
        } else if lower.contains("timeout height") {
            SubmitError::Retryable {
                kind: RetryKind::TimeoutHeight,
                backoff: Self::TIMEOUT_BACKOFF,
            }
        } else {
            SubmitError::Retryable {
                kind: RetryKind::Other,
                backoff: Self::OTHER_BACKOFF,
            }
        }
    }

    /// Refresh the local value from the chain.
    ///
    /// Non-forced calls are throttled to once per 30 s. A failed query
    /// leaves the state unchanged.
    pub async fn refresh(&self, force: bool) {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state, force).await;
    }

    async fn refresh_locked(&self, state: &mut SequenceState, force: bool) {
        if !force {
            if let Some(at) = state.last_refreshed_at {
                if at.elapsed() < Self::REFRESH_MIN_INTERVAL {
                    return;
                }
            }
        }

        match self.client.query_account_sequence(&self.wallet).await {
            Ok(authoritative) => {
                if authoritative != state.value {
                    info!(
                        wallet = %self.wallet,
                        local = state.value,
                        authoritative,
                        "sequence refreshed"
                    );
                }
                state.value = authoritative;
                state.last_refreshed_at = Some(Instant::now());
            }
            Err(err) => {
                warn!(wallet = %self.wallet, error = %err, "sequence refresh failed, state unchanged");
            }
        }
    }

    /// Compare against the authoritative sequence and adopt it when the
    /// divergence exceeds the tolerance.
    pub async fn check_drift(&self) {
        let mut state = self.state.lock().await;
        match self.client.query_account_sequence(&self.wallet).await {
            Ok(authoritative) => {
                let drift = authoritative.abs_diff(state.value);
                if drift > Self::DRIFT_TOLERANCE {
                    warn!(
                        wallet = %self.wallet,
                        local = state.value,
                        authoritative,
                        drift,
                        "sequence drift detected, adopting authoritative value"
                    );
                    state.value = authoritative;
                    state.last_refreshed_at = Some(Instant::now());
                }
            }
            Err(err) => {
                debug!(wallet = %self.wallet, error = %err, "drift check query failed");
            }
        }
    }

    /// True once the consecutive-failure count reaches the trip threshold.
    pub fn tripped(&self) -> bool {
        self.consecutive_errors.load(Ordering::Acquire) >= Self::TRIP_THRESHOLD
    }

    /// Clear the failure counter; called when the worker leaves cooldown.
    pub fn reset_errors(&self) {
        self.consecutive_errors.store(0, Ordering::Release);
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) async fn current_value(&self) -> u64 {
        self.state.lock().await.value
    }
}

/// Pull the expected sequence out of a mismatch raw log, e.g.
/// `account sequence mismatch, expected 4227, got 4226: incorrect account sequence`.
fn parse_expected_sequence(raw_log: &str) -> Option<u64> {
    let idx = raw_log.find("expected ")?;
    let rest = &raw_log[idx + "expected ".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mirror_chain::{
        BatchOrders, BookDepth, ChainError, MidQuote, SignedBatch,
    };
    use mirror_core::{MarketId, OpenOrder};
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::AtomicUsize;

    /// Chain client whose account-sequence query returns scripted values.
    struct SeqScript {
        sequences: PlMutex<Vec<ChainResult<u64>>>,
        queries: AtomicUsize,
    }

    impl SeqScript {
        fn new(sequences: Vec<ChainResult<u64>>) -> Arc<Self> {
            Arc::new(Self {
                sequences: PlMutex::new(sequences),
                queries: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChainClient for SeqScript {
        async fn query_account_sequence(&self, _wallet: &WalletId) -> ChainResult<u64> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let mut seqs = self.sequences.lock();
            if seqs.is_empty() {
                Err(ChainError::Transport("script exhausted".to_string()))
            } else {
                seqs.remove(0)
            }
        }

        async fn query_open_orders(
            &self,
            _wallet: &WalletId,
            _market_id: &MarketId,
        ) -> ChainResult<Vec<OpenOrder>> {
            unimplemented!()
        }

        async fn query_orderbook(&self, _market_id: &MarketId) -> ChainResult<BookDepth> {
            unimplemented!()
        }

        async fn query_mid(&self, _market_id: &MarketId) -> ChainResult<MidQuote> {
            unimplemented!()
        }

        async fn build_signed_batch(
            &self,
            _wallet: &WalletId,
            _sequence: u64,
            _batch: &BatchOrders,
        ) -> ChainResult<SignedBatch> {
            unimplemented!()
        }

        async fn broadcast_batch(&self, _tx: SignedBatch) -> ChainResult<TxResult> {
            unimplemented!()
        }
    }

    fn controller(sequences: Vec<ChainResult<u64>>) -> SequenceController {
        SequenceController::new(
            SeqScript::new(sequences) as Arc<dyn ChainClient>,
            WalletId::new("wallet_1"),
        )
    }

    #[tokio::test]
    async fn test_success_advances_by_one() {
        let ctrl = controller(vec![Ok(100)]);
        ctrl.refresh(true).await;

        for expected in 100..105 {
            let result = ctrl
                .with_sequence(|seq| async move {
                    assert_eq!(seq, expected);
                    Ok(TxResult::accepted("0xaa"))
                })
                .await;
            assert!(result.is_ok());
        }

        assert_eq!(ctrl.current_value().await, 105);
        assert_eq!(ctrl.consecutive_errors(), 0);
    }

    #[tokio::test]
    async fn test_sequence_mismatch_refreshes_and_retries() {
        // Initial refresh says 100; the forced refresh after the mismatch
        // says 103.
        let ctrl = controller(vec![Ok(100), Ok(103)]);
        ctrl.refresh(true).await;

        let err = ctrl
            .with_sequence(|_seq| async move {
                Err(ChainError::Broadcast {
                    code: 32,
                    raw_log: "account sequence mismatch, expected 103, got 100: incorrect account sequence".to_string(),
                })
            })
            .await
            .unwrap_err();

        match err {
            SubmitError::Retryable { kind, backoff } => {
                assert_eq!(kind, RetryKind::SequenceMismatch);
                assert_eq!(backoff, Duration::from_secs(3));
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert_eq!(ctrl.consecutive_errors(), 1);
        assert_eq!(ctrl.current_value().await, 103);

        // Retry succeeds at the refreshed sequence and resets the counter.
        let result = ctrl
            .with_sequence(|seq| async move {
                assert_eq!(seq, 103);
                Ok(TxResult::accepted("0xbb"))
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(ctrl.consecutive_errors(), 0);
        assert_eq!(ctrl.current_value().await, 104);
    }

    #[tokio::test]
    async fn test_mismatch_adopts_expected_when_refresh_down() {
        // Refresh query fails after the mismatch; the raw log still names
        // the expected value, which is adopted.
        let ctrl = controller(vec![
            Ok(100),
            Err(ChainError::Transport("down".to_string())),
        ]);
        ctrl.refresh(true).await;

        let _ = ctrl
            .with_sequence(|_seq| async move {
                Err(ChainError::Broadcast {
                    code: 32,
                    raw_log: "account sequence mismatch, expected 97, got 100".to_string(),
                })
            })
            .await;

        assert_eq!(ctrl.current_value().await, 97);
    }

    #[tokio::test]
    async fn test_timeout_height_classification() {
        let ctrl = controller(vec![Ok(100)]);
        ctrl.refresh(true).await;

        let err = ctrl
            .with_sequence(|_seq| async move {
                Err(ChainError::Broadcast {
                    code: 30,
                    raw_log: "tx timeout height exceeded".to_string(),
                })
            })
            .await
            .unwrap_err();

        match err {
            SubmitError::Retryable { kind, backoff } => {
                assert_eq!(kind, RetryKind::TimeoutHeight);
                assert_eq!(backoff, Duration::from_secs(5));
            }
            other => panic!("unexpected: {other:?}"),
        }
        // Value is untouched by a timeout.
        assert_eq!(ctrl.current_value().await, 100);
    }

    #[tokio::test]
    async fn test_trips_after_three_failures() {
        let ctrl = controller(vec![Ok(100)]);
        ctrl.refresh(true).await;

        for _ in 0..3 {
            let _ = ctrl
                .with_sequence(|_seq| async move {
                    Err(ChainError::Broadcast {
                        code: 5,
                        raw_log: "insufficient funds".to_string(),
                    })
                })
                .await;
        }

        assert!(ctrl.tripped());
        ctrl.reset_errors();
        assert!(!ctrl.tripped());
    }

    #[tokio::test]
    async fn test_refresh_throttled_unless_forced() {
        let script = SeqScript::new(vec![Ok(100), Ok(101)]);
        let ctrl = SequenceController::new(
            Arc::clone(&script) as Arc<dyn ChainClient>,
            WalletId::new("wallet_1"),
        );

        ctrl.refresh(true).await;
        ctrl.refresh(false).await; // within 30s window, skipped
        assert_eq!(script.queries.load(Ordering::SeqCst), 1);

        ctrl.refresh(true).await; // forced, queries again
        assert_eq!(script.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_drift_convergence() {
        // Local lands at 100, authoritative reports 105 (+5 drift).
        let ctrl = controller(vec![Ok(100), Ok(105)]);
        ctrl.refresh(true).await;

        ctrl.check_drift().await;
        assert_eq!(ctrl.current_value().await, 105);
    }

    #[tokio::test]
    async fn test_drift_within_tolerance_ignored() {
        let ctrl = controller(vec![Ok(100), Ok(102)]);
        ctrl.refresh(true).await;

        ctrl.check_drift().await;
        assert_eq!(ctrl.current_value().await, 100);
    }

    #[tokio::test]
    async fn test_concurrent_lease_is_fatal() {
        let ctrl = Arc::new(controller(vec![Ok(100)]));
        ctrl.refresh(true).await;

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = Arc::clone(&ctrl);
        let first = tokio::spawn(async move {
            holder
                .with_sequence(|_seq| async move {
                    started_tx.send(()).unwrap();
                    release_rx.await.unwrap();
                    Ok(TxResult::accepted("0xcc"))
                })
                .await
        });

        started_rx.await.unwrap();

        // Second lease attempt while the first is in flight.
        let err = ctrl
            .with_sequence(|_seq| async move { Ok(TxResult::accepted("0xdd")) })
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Fatal(_)));

        release_tx.send(()).unwrap();
        assert!(first.await.unwrap().is_ok());
    }

    #[test]
    fn test_parse_expected_sequence() {
        assert_eq!(
            parse_expected_sequence("account sequence mismatch, expected 4227, got 4226"),
            Some(4227)
        );
        assert_eq!(parse_expected_sequence("no numbers here"), None);
    }
}
