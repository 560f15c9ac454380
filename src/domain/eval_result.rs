use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::signal::{SignalStatus, Transition, Verification};

/// Why a signal was flagged unverified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnverifiedReason {
    /// The whole window elapsed and the provider never returned a candle
    NoMarketData,
    /// Candles exist but none touched the declared entry
    EntryNeverReached,
    /// Entered, but neither TP nor SL was touched before the horizon
    NoResolutionBeforeHorizon,
}

impl UnverifiedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnverifiedReason::NoMarketData => "no market data",
            UnverifiedReason::EntryNeverReached => "entry never reached",
            UnverifiedReason::NoResolutionBeforeHorizon => "no resolution before horizon",
        }
    }
}

impl fmt::Display for UnverifiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instruction produced by one evaluation of one signal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvalResult {
    Noop,
    Enter {
        timestamp: DateTime<Utc>,
    },
    ResolveTp {
        timestamp: DateTime<Utc>,
    },
    ResolveSl {
        timestamp: DateTime<Utc>,
    },
    MarkUnverified {
        reason: UnverifiedReason,
        details: String,
    },
}

impl EvalResult {
    pub fn is_noop(&self) -> bool {
        matches!(self, EvalResult::Noop)
    }

    /// Status the signal ends up in, `None` for `Noop`
    pub fn target_status(&self) -> Option<SignalStatus> {
        match self {
            EvalResult::Noop => None,
            EvalResult::Enter { .. } => Some(SignalStatus::Entered),
            EvalResult::ResolveTp { .. } => Some(SignalStatus::ResolvedTp),
            EvalResult::ResolveSl { .. } => Some(SignalStatus::ResolvedSl),
            EvalResult::MarkUnverified { .. } => Some(SignalStatus::Unverified),
        }
    }

    /// Build the store update for a signal currently in `from`
    pub fn transition(
        &self,
        from: SignalStatus,
        now: DateTime<Utc>,
        source: &str,
    ) -> Option<Transition> {
        let to = self.target_status()?;
        let (at, verification) = match self {
            EvalResult::Noop => return None,
            EvalResult::Enter { timestamp }
            | EvalResult::ResolveTp { timestamp }
            | EvalResult::ResolveSl { timestamp } => (*timestamp, None),
            EvalResult::MarkUnverified { reason, details } => (
                now,
                Some(Verification {
                    reason: reason.as_str().to_string(),
                    details: details.clone(),
                    flagged_at: now,
                }),
            ),
        };

        Some(Transition {
            from,
            to,
            at,
            recorded_at: now,
            resolution_source: source.to_string(),
            verification,
        })
    }
}

impl fmt::Display for EvalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalResult::Noop => write!(f, "NOOP"),
            EvalResult::Enter { timestamp } => write!(f, "ENTER at {}", timestamp),
            EvalResult::ResolveTp { timestamp } => write!(f, "RESOLVE_TP at {}", timestamp),
            EvalResult::ResolveSl { timestamp } => write!(f, "RESOLVE_SL at {}", timestamp),
            EvalResult::MarkUnverified { reason, .. } => write!(f, "MARK_UNVERIFIED ({})", reason),
        }
    }
}
