use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One-minute OHLC aggregate for an instrument.
///
/// `timestamp` is the minute the bar opened at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    /// Inclusive range check: `low <= price <= high`
    pub fn contains(&self, price: Decimal) -> bool {
        self.low <= price && price <= self.high
    }

    /// A bar whose low is above its high cannot have traded
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.high
    }
}
