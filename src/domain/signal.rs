//! Trade Signal
//!
//! A user-submitted claim of an opened trade, pending independent
//! verification against market candles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset class of the traded instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentType {
    Crypto,
    Forex,
    Cfd,
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentType::Crypto => write!(f, "CRYPTO"),
            InstrumentType::Forex => write!(f, "FOREX"),
            InstrumentType::Cfd => write!(f, "CFD"),
        }
    }
}

/// Instrument a signal was placed on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub kind: InstrumentType,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, kind: InstrumentType) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Verification status of a signal.
///
/// Only `Pending -> Entered -> Resolved*` and `Pending|Entered -> Unverified`
/// are legal; the three terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalStatus {
    Pending,
    Entered,
    ResolvedTp,
    ResolvedSl,
    Unverified,
}

impl SignalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SignalStatus::ResolvedTp | SignalStatus::ResolvedSl | SignalStatus::Unverified
        )
    }

    /// Whether the evaluator may move a signal from `self` to `next`
    pub fn can_transition_to(&self, next: SignalStatus) -> bool {
        match (self, next) {
            (SignalStatus::Pending, SignalStatus::Entered) => true,
            (SignalStatus::Pending, SignalStatus::Unverified) => true,
            (SignalStatus::Entered, SignalStatus::ResolvedTp) => true,
            (SignalStatus::Entered, SignalStatus::ResolvedSl) => true,
            (SignalStatus::Entered, SignalStatus::Unverified) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Entered => "entered",
            SignalStatus::ResolvedTp => "resolved-tp",
            SignalStatus::ResolvedSl => "resolved-sl",
            SignalStatus::Unverified => "unverified",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record written when a signal is flagged unverified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub reason: String,
    pub details: String,
    pub flagged_at: DateTime<Utc>,
}

/// A submitted trade claim and its verification state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub instrument: Instrument,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// When the user claims the trade was opened
    pub declared_entry_at: DateTime<Utc>,
    pub status: SignalStatus,
    #[serde(default)]
    pub entered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution_source: Option<String>,
    #[serde(default)]
    pub verification: Option<Verification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeSignal {
    /// Create a pending signal as submitted by a user
    pub fn new(
        id: impl Into<String>,
        instrument: Instrument,
        direction: Direction,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        declared_entry_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: None,
            instrument,
            direction,
            entry_price,
            stop_loss,
            take_profit,
            declared_entry_at,
            status: SignalStatus::Pending,
            entered_at: None,
            resolved_at: None,
            resolution_source: None,
            verification: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Apply an evaluator transition.
    ///
    /// All fields are computed before any is written, so a rejected
    /// transition leaves the signal untouched.
    pub fn apply(&mut self, transition: &Transition) -> Result<(), TransitionError> {
        if self.status != transition.from {
            return Err(TransitionError::StaleStatus {
                expected: transition.from,
                actual: self.status,
            });
        }
        if !self.status.can_transition_to(transition.to) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: transition.to,
            });
        }

        let mut next = self.clone();
        match transition.to {
            SignalStatus::Entered => next.entered_at = Some(transition.at),
            SignalStatus::ResolvedTp | SignalStatus::ResolvedSl => {
                next.resolved_at = Some(transition.at)
            }
            SignalStatus::Pending | SignalStatus::Unverified => {}
        }
        next.status = transition.to;
        next.resolution_source = Some(transition.resolution_source.clone());
        if let Some(verification) = &transition.verification {
            next.verification = Some(verification.clone());
        }
        next.updated_at = transition.recorded_at;

        *self = next;
        Ok(())
    }

    /// Basic sanity of the declared levels
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Signal id cannot be empty".to_string());
        }
        if self.instrument.symbol.trim().is_empty() {
            return Err(format!("Signal {} has an empty instrument", self.id));
        }
        for (name, price) in [
            ("entry_price", self.entry_price),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
        ] {
            if price <= Decimal::ZERO {
                return Err(format!("Signal {}: {} must be > 0, got {}", self.id, name, price));
            }
        }
        Ok(())
    }
}

/// A status change the evaluator asks the store to apply
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: SignalStatus,
    pub to: SignalStatus,
    /// Evidence timestamp (candle time), or evaluation time for flags
    pub at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub resolution_source: String,
    pub verification: Option<Verification>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("Status changed since read: expected {expected}, found {actual}")]
    StaleStatus {
        expected: SignalStatus,
        actual: SignalStatus,
    },
    #[error("Illegal transition {from} -> {to}")]
    Illegal { from: SignalStatus, to: SignalStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample() -> TradeSignal {
        TradeSignal::new(
            "sig-1",
            Instrument::new("EURUSD", InstrumentType::Forex),
            Direction::Long,
            dec!(1.1000),
            dec!(1.0950),
            dec!(1.1050),
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
        )
    }

    fn transition(from: SignalStatus, to: SignalStatus) -> Transition {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 14, 2, 0).unwrap();
        Transition {
            from,
            to,
            at,
            recorded_at: at,
            resolution_source: "stub".to_string(),
            verification: None,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SignalStatus::Pending.is_terminal());
        assert!(!SignalStatus::Entered.is_terminal());
        assert!(SignalStatus::ResolvedTp.is_terminal());
        assert!(SignalStatus::ResolvedSl.is_terminal());
        assert!(SignalStatus::Unverified.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let all = [
            SignalStatus::Pending,
            SignalStatus::Entered,
            SignalStatus::ResolvedTp,
            SignalStatus::ResolvedSl,
            SignalStatus::Unverified,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{} -> {} allowed", from, to);
            }
        }
    }

    #[test]
    fn test_apply_enter_records_timestamp() {
        let mut signal = sample();
        let t = transition(SignalStatus::Pending, SignalStatus::Entered);
        signal.apply(&t).unwrap();

        assert_eq!(signal.status, SignalStatus::Entered);
        assert_eq!(signal.entered_at, Some(t.at));
        assert_eq!(signal.resolution_source.as_deref(), Some("stub"));
        assert!(signal.resolved_at.is_none());
    }

    #[test]
    fn test_apply_rejects_stale_status() {
        let mut signal = sample();
        let before = signal.clone();
        let t = transition(SignalStatus::Entered, SignalStatus::ResolvedTp);
        let err = signal.apply(&t).unwrap_err();

        assert!(matches!(err, TransitionError::StaleStatus { .. }));
        assert_eq!(signal, before);
    }

    #[test]
    fn test_apply_rejects_skipping_entry() {
        let mut signal = sample();
        let t = transition(SignalStatus::Pending, SignalStatus::ResolvedSl);
        assert!(matches!(
            signal.apply(&t),
            Err(TransitionError::Illegal { .. })
        ));
        assert!(signal.resolved_at.is_none());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&SignalStatus::ResolvedTp).unwrap();
        assert_eq!(json, "\"resolved-tp\"");
        let parsed: InstrumentType = serde_json::from_str("\"CFD\"").unwrap();
        assert_eq!(parsed, InstrumentType::Cfd);
    }

    #[test]
    fn test_validate() {
        assert!(sample().validate().is_ok());

        let mut empty = sample();
        empty.instrument.symbol = "  ".to_string();
        assert!(empty.validate().is_err());

        let mut negative = sample();
        negative.stop_loss = dec!(-1);
        assert!(negative.validate().is_err());
    }
}
