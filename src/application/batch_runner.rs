//! Batch Runner
//!
//! One verification pass over every open signal. Signals are evaluated on a
//! bounded pool of tasks (the candle source is rate limited), each with its
//! own provider timeout. Failures are counted per signal and never abort the
//! pass; results are applied with a compare-and-set on the status read at the
//! start of the pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::{EvalResult, SignalStatus, TradeSignal};
use crate::evaluation::{EvaluationError, EvaluatorConfig, IntegrityEvaluator};
use crate::ports::{CandleProvider, CandleProviderError, Clock, StoreError, TradeStore};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Trade store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("Signal not found: {0}")]
    NotFound(String),
}

impl BatchError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, BatchError::Store(StoreError::StatusConflict { .. }))
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum signals evaluated at the same time
    pub concurrency: usize,
    /// Per-signal bound on the candle fetch
    pub provider_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            provider_timeout: Duration::from_secs(20),
        }
    }
}

/// Outcome counts of one pass.
///
/// `evaluated` counts every open signal the pass picked up, so
/// `evaluated == entered + resolved + flagged + noop + errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub evaluated: usize,
    pub entered: usize,
    pub resolved: usize,
    pub flagged: usize,
    pub noop: usize,
    /// Provider failures, timeouts, store conflicts and rejected updates
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    fn record(&mut self, result: &EvalResult) {
        match result {
            EvalResult::Noop => self.noop += 1,
            EvalResult::Enter { .. } => self.entered += 1,
            EvalResult::ResolveTp { .. } | EvalResult::ResolveSl { .. } => self.resolved += 1,
            EvalResult::MarkUnverified { .. } => self.flagged += 1,
        }
    }
}

/// Result of evaluating and applying one signal
#[derive(Debug, Clone, Serialize)]
pub struct SignalOutcome {
    pub id: String,
    pub result: EvalResult,
    pub previous_status: SignalStatus,
    pub status: SignalStatus,
}

pub struct BatchRunner {
    evaluator: Arc<IntegrityEvaluator>,
    store: Arc<dyn TradeStore>,
    config: BatchConfig,
}

impl BatchRunner {
    /// Wire a runner from its collaborators
    pub fn new(
        provider: Arc<dyn CandleProvider>,
        store: Arc<dyn TradeStore>,
        clock: Arc<dyn Clock>,
        evaluator_config: EvaluatorConfig,
        config: BatchConfig,
    ) -> Self {
        let evaluator = IntegrityEvaluator::new(provider, clock, evaluator_config);
        Self {
            evaluator: Arc::new(evaluator),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn TradeStore> {
        &self.store
    }

    pub fn evaluator(&self) -> &IntegrityEvaluator {
        &self.evaluator
    }

    /// Evaluate every pending or entered signal once and apply the results
    pub async fn evaluate_all_pending_trades(&self) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        let signals = self.store.list_open().await?;
        let mut summary = BatchSummary {
            started_at: self.evaluator.now(),
            ..BatchSummary::default()
        };

        tracing::info!(
            "Starting batch pass over {} open signals (concurrency {}, provider {})",
            signals.len(),
            self.config.concurrency,
            self.evaluator.provider_name()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for signal in signals {
            summary.evaluated += 1;

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                // the semaphore is never closed
                summary.errors += 1;
                continue;
            };
            let evaluator = self.evaluator.clone();
            let store = self.store.clone();
            let timeout = self.config.provider_timeout;

            tasks.spawn(async move {
                let id = signal.id.clone();
                let outcome = process_signal(&evaluator, store.as_ref(), timeout, signal).await;
                drop(permit);
                (id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => summary.record(&report.result),
                Ok((id, Err(e))) => {
                    summary.errors += 1;
                    log_failure(&id, &e, Origin::Batch);
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!("Signal evaluation task failed: {}", e);
                }
            }
        }

        summary.finished_at = self.evaluator.now();
        tracing::info!(
            evaluated = summary.evaluated,
            entered = summary.entered,
            resolved = summary.resolved,
            flagged = summary.flagged,
            noop = summary.noop,
            errors = summary.errors,
            "Batch pass finished in {}ms",
            started.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Evaluate and apply a single signal by id
    pub async fn evaluate_signal(&self, id: &str) -> Result<SignalOutcome, BatchError> {
        let signal = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| BatchError::NotFound(id.to_string()))?;

        let outcome = process_signal(
            &self.evaluator,
            self.store.as_ref(),
            self.config.provider_timeout,
            signal,
        )
        .await;
        if let Err(e) = &outcome {
            log_failure(id, e, Origin::Single);
        }
        outcome
    }
}

async fn process_signal(
    evaluator: &IntegrityEvaluator,
    store: &dyn TradeStore,
    timeout: Duration,
    signal: TradeSignal,
) -> Result<SignalOutcome, BatchError> {
    let result = match tokio::time::timeout(timeout, evaluator.evaluate(&signal)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(EvaluationError::ProviderUnavailable {
                instrument: signal.instrument.symbol.clone(),
                source: CandleProviderError::Timeout(timeout),
            }
            .into())
        }
    };

    let now = evaluator.now();
    let Some(transition) = result.transition(signal.status, now, evaluator.provider_name()) else {
        return Ok(SignalOutcome {
            id: signal.id,
            result,
            previous_status: signal.status,
            status: signal.status,
        });
    };

    let updated = store.apply_transition(&signal.id, &transition).await?;
    tracing::info!(
        "Signal {} {} {}: {} -> {} ({})",
        signal.id,
        signal.direction,
        signal.instrument.symbol,
        signal.status,
        updated.status,
        result
    );

    Ok(SignalOutcome {
        id: signal.id,
        result,
        previous_status: signal.status,
        status: updated.status,
    })
}

/// Where a failed evaluation was requested from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// The pass only picks open signals, so a terminal one is a bug
    Batch,
    /// An operator asked for this id; it may already be terminal
    Single,
}

fn failure_level(error: &BatchError, origin: Origin) -> tracing::Level {
    match error {
        BatchError::Evaluation(e) if e.is_transient() => tracing::Level::WARN,
        BatchError::Evaluation(EvaluationError::InvalidSignalState { .. })
            if origin == Origin::Single =>
        {
            tracing::Level::WARN
        }
        BatchError::Evaluation(_) => tracing::Level::ERROR,
        e if e.is_conflict() => tracing::Level::WARN,
        BatchError::NotFound(_) => tracing::Level::WARN,
        BatchError::Store(_) => tracing::Level::ERROR,
    }
}

fn log_failure(id: &str, error: &BatchError, origin: Origin) {
    let note = match error {
        BatchError::Evaluation(e) if e.is_transient() => "left as is, will retry next pass",
        BatchError::Evaluation(EvaluationError::InvalidSignalState { .. }) => match origin {
            Origin::Batch => "should not have reached the evaluator",
            Origin::Single => "is already settled",
        },
        BatchError::Evaluation(_) => "cannot be evaluated",
        e if e.is_conflict() => "changed during the pass, result dropped",
        BatchError::NotFound(_) => "does not exist",
        BatchError::Store(_) => "could not be updated",
    };

    if failure_level(error, origin) == tracing::Level::ERROR {
        tracing::error!("Signal {} {}: {}", id, note, error);
    } else {
        tracing::warn!("Signal {} {}: {}", id, note, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::market_data::InMemoryCandleProvider;
    use crate::adapters::store::JsonTradeStore;
    use crate::domain::{Candle, Direction, Instrument, InstrumentType};
    use crate::ports::{FixedClock, MockTradeStore};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap()
    }

    fn bar(minutes: i64, low: Decimal, high: Decimal) -> Candle {
        Candle::new(t0() + chrono::Duration::minutes(minutes), low, high, low, high)
    }

    fn signal(id: &str, symbol: &str) -> TradeSignal {
        TradeSignal::new(
            id,
            Instrument::new(symbol, InstrumentType::Forex),
            Direction::Long,
            dec!(1.1000),
            dec!(1.0950),
            dec!(1.1050),
            t0(),
        )
    }

    fn runner(
        provider: Arc<dyn CandleProvider>,
        store: Arc<dyn TradeStore>,
        now: DateTime<Utc>,
        config: BatchConfig,
    ) -> BatchRunner {
        BatchRunner::new(
            provider,
            store,
            Arc::new(FixedClock::new(now)),
            EvaluatorConfig::default().with_horizon(chrono::Duration::days(1)),
            config,
        )
    }

    #[tokio::test]
    async fn test_mixed_batch_tally() {
        let store = Arc::new(JsonTradeStore::in_memory());
        store.insert(signal("enters", "EURUSD")).await.unwrap();
        store.insert(signal("no-data", "GBPUSD")).await.unwrap();
        store.insert(signal("broken", "USDJPY")).await.unwrap();

        let mut resolving = signal("resolves", "AUDUSD");
        resolving.status = SignalStatus::Entered;
        resolving.entered_at = Some(t0());
        store.insert(resolving).await.unwrap();

        let provider = InMemoryCandleProvider::new()
            .with_candles("EURUSD", vec![bar(2, dec!(1.0995), dec!(1.1005))])
            .with_candles("AUDUSD", vec![bar(30, dec!(1.1040), dec!(1.1060))])
            .with_failure("USDJPY");

        // two days later: GBPUSD's window has elapsed without data
        let runner = runner(
            Arc::new(provider),
            store.clone(),
            t0() + chrono::Duration::days(2),
            BatchConfig::default(),
        );
        let summary = runner.evaluate_all_pending_trades().await.unwrap();

        assert_eq!(summary.evaluated, 4);
        assert_eq!(summary.entered, 1);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.flagged, 1);
        assert_eq!(summary.errors, 1);

        let broken = store.get("broken").await.unwrap().unwrap();
        assert_eq!(broken.status, SignalStatus::Pending);
        assert!(broken.verification.is_none());

        let flagged = store.get("no-data").await.unwrap().unwrap();
        assert_eq!(flagged.status, SignalStatus::Unverified);
        assert_eq!(
            flagged.verification.map(|v| v.reason),
            Some("no market data".to_string())
        );

        let resolved = store.get("resolves").await.unwrap().unwrap();
        assert_eq!(resolved.status, SignalStatus::ResolvedTp);
        assert_eq!(resolved.resolution_source.as_deref(), Some("in-memory"));
    }

    #[tokio::test]
    async fn test_second_pass_skips_terminal_signals() {
        let store = Arc::new(JsonTradeStore::in_memory());
        store.insert(signal("a", "GBPUSD")).await.unwrap();

        let provider = Arc::new(InMemoryCandleProvider::new());
        let runner = runner(
            provider.clone(),
            store.clone(),
            t0() + chrono::Duration::days(2),
            BatchConfig::default(),
        );

        let first = runner.evaluate_all_pending_trades().await.unwrap();
        assert_eq!(first.flagged, 1);

        let second = runner.evaluate_all_pending_trades().await.unwrap();
        assert_eq!(second.evaluated, 0);
        assert_eq!(second.started_at, t0() + chrono::Duration::days(2));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let store = Arc::new(JsonTradeStore::in_memory());
        store.insert(signal("slow", "EURUSD")).await.unwrap();

        let provider = InMemoryCandleProvider::new()
            .with_candles("EURUSD", vec![bar(2, dec!(1.0995), dec!(1.1005))])
            .with_latency("EURUSD", Duration::from_millis(500));

        let runner = runner(
            Arc::new(provider),
            store.clone(),
            t0() + chrono::Duration::hours(1),
            BatchConfig {
                concurrency: 1,
                provider_timeout: Duration::from_millis(20),
            },
        );
        let summary = runner.evaluate_all_pending_trades().await.unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.entered, 0);
        let stored = store.get("slow").await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Pending);
    }

    #[tokio::test]
    async fn test_conflicting_update_is_counted_not_applied() {
        let mut store = MockTradeStore::new();
        store
            .expect_list_open()
            .returning(|| Ok(vec![signal("a", "EURUSD")]));
        store.expect_apply_transition().times(1).returning(|id, _| {
            Err(StoreError::StatusConflict {
                id: id.to_string(),
                expected: SignalStatus::Pending,
                actual: SignalStatus::Entered,
            })
        });

        let provider = InMemoryCandleProvider::new()
            .with_candles("EURUSD", vec![bar(2, dec!(1.0995), dec!(1.1005))]);
        let runner = runner(
            Arc::new(provider),
            Arc::new(store),
            t0() + chrono::Duration::hours(1),
            BatchConfig::default(),
        );

        let summary = runner.evaluate_all_pending_trades().await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.entered, 0);
    }

    #[tokio::test]
    async fn test_terminal_signal_from_store_is_an_error() {
        let mut closed = signal("closed", "EURUSD");
        closed.status = SignalStatus::ResolvedSl;

        let mut store = MockTradeStore::new();
        store
            .expect_list_open()
            .returning(move || Ok(vec![closed.clone()]));
        store.expect_apply_transition().times(0);

        let provider = Arc::new(InMemoryCandleProvider::new());
        let runner = runner(
            provider.clone(),
            Arc::new(store),
            t0() + chrono::Duration::hours(1),
            BatchConfig::default(),
        );

        let summary = runner.evaluate_all_pending_trades().await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_pass() {
        let mut store = MockTradeStore::new();
        store
            .expect_list_open()
            .returning(|| Err(StoreError::Io("disk gone".to_string())));

        let runner = runner(
            Arc::new(InMemoryCandleProvider::new()),
            Arc::new(store),
            t0(),
            BatchConfig::default(),
        );
        assert!(matches!(
            runner.evaluate_all_pending_trades().await,
            Err(BatchError::Store(_))
        ));
    }

    /// Tracks how many fetches are in flight at once
    #[derive(Default)]
    struct CountingProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CandleProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fetch_one_minute_candles(
            &self,
            _instrument: &Instrument,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Candle>, CandleProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let store = Arc::new(JsonTradeStore::in_memory());
        for i in 0..8 {
            store
                .insert(signal(&format!("s{}", i), "EURUSD"))
                .await
                .unwrap();
        }

        let provider = Arc::new(CountingProvider::default());
        let runner = runner(
            provider.clone(),
            store,
            t0() + chrono::Duration::hours(1),
            BatchConfig {
                concurrency: 2,
                provider_timeout: Duration::from_secs(5),
            },
        );

        let summary = runner.evaluate_all_pending_trades().await.unwrap();
        assert_eq!(summary.noop, 8);
        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_evaluate_single_signal() {
        let store = Arc::new(JsonTradeStore::in_memory());
        store.insert(signal("a", "EURUSD")).await.unwrap();
        let provider = InMemoryCandleProvider::new()
            .with_candles("EURUSD", vec![bar(2, dec!(1.0995), dec!(1.1005))]);

        let runner = runner(
            Arc::new(provider),
            store,
            t0() + chrono::Duration::hours(1),
            BatchConfig::default(),
        );

        let report = runner.evaluate_signal("a").await.unwrap();
        assert_eq!(report.previous_status, SignalStatus::Pending);
        assert_eq!(report.status, SignalStatus::Entered);

        assert!(matches!(
            runner.evaluate_signal("missing").await,
            Err(BatchError::NotFound(_))
        ));
    }

    #[test]
    fn test_settled_signal_logs_by_origin() {
        let error = BatchError::Evaluation(EvaluationError::InvalidSignalState {
            id: "sig-1".to_string(),
            status: SignalStatus::ResolvedTp,
        });

        assert_eq!(failure_level(&error, Origin::Batch), tracing::Level::ERROR);
        assert_eq!(failure_level(&error, Origin::Single), tracing::Level::WARN);
    }

    #[test]
    fn test_transient_and_conflict_log_as_warnings() {
        let timeout = BatchError::Evaluation(EvaluationError::ProviderUnavailable {
            instrument: "EURUSD".to_string(),
            source: CandleProviderError::Timeout(Duration::from_secs(1)),
        });
        let conflict = BatchError::Store(StoreError::StatusConflict {
            id: "sig-1".to_string(),
            expected: SignalStatus::Pending,
            actual: SignalStatus::Entered,
        });

        for origin in [Origin::Batch, Origin::Single] {
            assert_eq!(failure_level(&timeout, origin), tracing::Level::WARN);
            assert_eq!(failure_level(&conflict, origin), tracing::Level::WARN);
        }
    }
}
