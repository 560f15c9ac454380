//! Integrity Evaluator
//!
//! Reconciles one trade signal against one-minute candles and decides the
//! next step of its lifecycle:
//!
//! - pending: the first bar whose range contains the declared entry price
//!   confirms the entry (`Enter`)
//! - entered: the first bar after the entry that touches take-profit or
//!   stop-loss resolves the trade; a bar touching both falls back to the
//!   configured tie-break
//! - a window that elapsed without evidence flags the signal unverified
//!
//! The evaluator never mutates the signal and never swallows provider errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::params::{EvaluatorConfig, Level, LookupWindow};
use crate::domain::{Candle, EvalResult, SignalStatus, TradeSignal, UnverifiedReason};
use crate::ports::{CandleProvider, CandleProviderError, Clock};

#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Transient: the signal stays as it is and is retried on a later pass
    #[error("Candle provider unavailable for {instrument}: {source}")]
    ProviderUnavailable {
        instrument: String,
        #[source]
        source: CandleProviderError,
    },

    /// Caller bug: terminal signals must be filtered out before evaluation
    #[error("Signal {id} is in terminal status {status}")]
    InvalidSignalState { id: String, status: SignalStatus },

    #[error("Invalid signal {id}: {reason}")]
    InvalidSignal { id: String, reason: String },
}

impl EvaluationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EvaluationError::ProviderUnavailable { .. })
    }
}

pub struct IntegrityEvaluator {
    provider: Arc<dyn CandleProvider>,
    clock: Arc<dyn Clock>,
    config: EvaluatorConfig,
}

impl IntegrityEvaluator {
    pub fn new(
        provider: Arc<dyn CandleProvider>,
        clock: Arc<dyn Clock>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            provider,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Evaluate a signal against the current time
    pub async fn evaluate(&self, signal: &TradeSignal) -> Result<EvalResult, EvaluationError> {
        self.evaluate_at(signal, self.clock.now()).await
    }

    /// Evaluate a signal as of `now`
    pub async fn evaluate_at(
        &self,
        signal: &TradeSignal,
        now: DateTime<Utc>,
    ) -> Result<EvalResult, EvaluationError> {
        let anchor = self.anchor(signal)?;

        // Evidence cannot exist yet
        if anchor > now {
            tracing::debug!(
                "Signal {} anchored in the future ({}), nothing to check",
                signal.id,
                anchor
            );
            return Ok(EvalResult::Noop);
        }

        let window = self.config.window(anchor, now);
        let candles = self.fetch(signal, &window).await?;

        if candles.is_empty() && window.fully_elapsed {
            return Ok(unverified(UnverifiedReason::NoMarketData, signal, &window, 0));
        }

        let result = match signal.status {
            SignalStatus::Pending => self.check_entry(signal, &window, &candles),
            SignalStatus::Entered => self.check_resolution(signal, anchor, &window, &candles),
            // rejected by anchor()
            _ => EvalResult::Noop,
        };

        tracing::debug!(
            signal_id = %signal.id,
            instrument = %signal.instrument,
            candles = candles.len(),
            "Evaluated signal {}: {}",
            signal.id,
            result
        );
        Ok(result)
    }

    /// Start of the evidence window: the declared entry for pending signals,
    /// the recorded entry for entered ones
    fn anchor(&self, signal: &TradeSignal) -> Result<DateTime<Utc>, EvaluationError> {
        if signal.status.is_terminal() {
            return Err(EvaluationError::InvalidSignalState {
                id: signal.id.clone(),
                status: signal.status,
            });
        }
        if signal.instrument.symbol.trim().is_empty() {
            return Err(EvaluationError::InvalidSignal {
                id: signal.id.clone(),
                reason: "instrument is empty".to_string(),
            });
        }

        match signal.status {
            SignalStatus::Entered => signal.entered_at.ok_or_else(|| EvaluationError::InvalidSignal {
                id: signal.id.clone(),
                reason: "entered without a recorded entry time".to_string(),
            }),
            _ => Ok(signal.declared_entry_at),
        }
    }

    async fn fetch(
        &self,
        signal: &TradeSignal,
        window: &LookupWindow,
    ) -> Result<Vec<Candle>, EvaluationError> {
        let mut candles = self
            .provider
            .fetch_one_minute_candles(&signal.instrument, window.start, window.end)
            .await
            .map_err(|source| EvaluationError::ProviderUnavailable {
                instrument: signal.instrument.symbol.clone(),
                source,
            })?;

        let fetched = candles.len();
        candles.retain(|c| {
            c.is_well_formed() && c.timestamp >= window.start && c.timestamp <= window.end
        });
        if candles.len() != fetched {
            tracing::warn!(
                "Dropped {} malformed or out-of-window candles for {}",
                fetched - candles.len(),
                signal.instrument.symbol
            );
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    fn check_entry(
        &self,
        signal: &TradeSignal,
        window: &LookupWindow,
        candles: &[Candle],
    ) -> EvalResult {
        if let Some(candle) = candles.iter().find(|c| c.contains(signal.entry_price)) {
            return EvalResult::Enter {
                timestamp: candle.timestamp,
            };
        }

        if window.fully_elapsed {
            unverified(UnverifiedReason::EntryNeverReached, signal, window, candles.len())
        } else {
            EvalResult::Noop
        }
    }

    fn check_resolution(
        &self,
        signal: &TradeSignal,
        entered_at: DateTime<Utc>,
        window: &LookupWindow,
        candles: &[Candle],
    ) -> EvalResult {
        for candle in candles.iter().filter(|c| c.timestamp > entered_at) {
            let hit_tp = candle.contains(signal.take_profit);
            let hit_sl = candle.contains(signal.stop_loss);

            let level = match (hit_tp, hit_sl) {
                (false, false) => continue,
                (true, false) => Level::TakeProfit,
                (false, true) => Level::StopLoss,
                (true, true) => {
                    let level = self.config.tie_break.resolve(signal.direction);
                    tracing::info!(
                        "Signal {} ({}) bar at {} straddles TP {} and SL {}, resolving {:?}",
                        signal.id,
                        signal.direction,
                        candle.timestamp,
                        signal.take_profit,
                        signal.stop_loss,
                        level
                    );
                    level
                }
            };

            return match level {
                Level::TakeProfit => EvalResult::ResolveTp {
                    timestamp: candle.timestamp,
                },
                Level::StopLoss => EvalResult::ResolveSl {
                    timestamp: candle.timestamp,
                },
            };
        }

        if window.fully_elapsed {
            unverified(
                UnverifiedReason::NoResolutionBeforeHorizon,
                signal,
                window,
                candles.len(),
            )
        } else {
            EvalResult::Noop
        }
    }
}

fn unverified(
    reason: UnverifiedReason,
    signal: &TradeSignal,
    window: &LookupWindow,
    candle_count: usize,
) -> EvalResult {
    EvalResult::MarkUnverified {
        reason,
        details: format!(
            "{} {} entry={} tp={} sl={}; window {} .. {}; {} candles",
            signal.instrument.symbol,
            signal.direction,
            signal.entry_price,
            signal.take_profit,
            signal.stop_loss,
            window.start.to_rfc3339(),
            window.horizon_end.to_rfc3339(),
            candle_count
        ),
    }
}
