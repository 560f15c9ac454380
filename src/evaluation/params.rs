//! Evaluator Parameters
//!
//! Horizon, settlement grace and tie-break policy, with the lookup window
//! they produce for a given anchor time.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Deserialize;

use crate::domain::Direction;

/// Which level wins when a single bar contains both take-profit and stop-loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// Assume the worse ordering: the stop-loss was hit first
    #[default]
    Adverse,
    /// Assume the take-profit was hit first
    Favorable,
}

/// Level touched by a candle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    TakeProfit,
    StopLoss,
}

impl TieBreak {
    /// Level assumed hit first when one bar straddles both.
    ///
    /// The answer does not depend on direction: for a LONG the dip to the
    /// stop-loss is assumed before the rise, for a SHORT the spike to the
    /// stop-loss is assumed before the fall.
    pub fn resolve(&self, _direction: Direction) -> Level {
        match self {
            TieBreak::Adverse => Level::StopLoss,
            TieBreak::Favorable => Level::TakeProfit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Maximum time after the anchor during which evidence is accepted
    pub horizon: Duration,
    /// Extra wait past the horizon before missing data counts as absent
    pub settlement_grace: Duration,
    pub tie_break: TieBreak,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::days(7),
            settlement_grace: Duration::minutes(5),
            tie_break: TieBreak::Adverse,
        }
    }
}

/// Time range a single evaluation looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupWindow {
    /// Anchor floored to its minute so the bar containing it is included
    pub start: DateTime<Utc>,
    /// `min(now, horizon_end)`
    pub end: DateTime<Utc>,
    pub horizon_end: DateTime<Utc>,
    /// No further evidence can arrive for this window
    pub fully_elapsed: bool,
}

impl EvaluatorConfig {
    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_settlement_grace(mut self, grace: Duration) -> Self {
        self.settlement_grace = grace;
        self
    }

    pub fn window(&self, anchor: DateTime<Utc>, now: DateTime<Utc>) -> LookupWindow {
        let horizon_end = anchor + self.horizon;
        let start = anchor
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(anchor);

        LookupWindow {
            start,
            end: now.min(horizon_end),
            horizon_end,
            fully_elapsed: now >= horizon_end + self.settlement_grace,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.horizon <= Duration::zero() {
            return Err(format!("horizon must be > 0, got {}", self.horizon));
        }
        if self.settlement_grace < Duration::zero() {
            return Err(format!(
                "settlement_grace must be >= 0, got {}",
                self.settlement_grace
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
    }

    #[test]
    fn test_window_open() {
        let config = EvaluatorConfig::default().with_horizon(Duration::hours(2));
        let window = config.window(t(10, 0, 30), t(11, 0, 0));

        assert_eq!(window.start, t(10, 0, 0));
        assert_eq!(window.end, t(11, 0, 0));
        assert_eq!(window.horizon_end, t(12, 0, 30));
        assert!(!window.fully_elapsed);
    }

    #[test]
    fn test_window_capped_at_horizon() {
        let config = EvaluatorConfig::default().with_horizon(Duration::hours(2));
        let window = config.window(t(10, 0, 0), t(18, 0, 0));

        assert_eq!(window.end, t(12, 0, 0));
        assert!(window.fully_elapsed);
    }

    #[test]
    fn test_grace_delays_elapsed() {
        let config = EvaluatorConfig::default()
            .with_horizon(Duration::hours(2))
            .with_settlement_grace(Duration::minutes(5));

        assert!(!config.window(t(10, 0, 0), t(12, 4, 59)).fully_elapsed);
        assert!(config.window(t(10, 0, 0), t(12, 5, 0)).fully_elapsed);
    }

    #[test]
    fn test_tie_break_adverse_is_stop_loss_both_ways() {
        assert_eq!(TieBreak::Adverse.resolve(Direction::Long), Level::StopLoss);
        assert_eq!(TieBreak::Adverse.resolve(Direction::Short), Level::StopLoss);
        assert_eq!(TieBreak::Favorable.resolve(Direction::Long), Level::TakeProfit);
    }

    #[test]
    fn test_validate() {
        assert!(EvaluatorConfig::default().validate().is_ok());
        assert!(EvaluatorConfig::default()
            .with_horizon(Duration::zero())
            .validate()
            .is_err());
    }
}
