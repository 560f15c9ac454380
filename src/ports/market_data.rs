//! Candle Provider Port
//!
//! Source of one-minute OHLC candles. Implementations must return candles in
//! ascending timestamp order. An empty vector means "no data in range" and is
//! distinct from an error, which means the source could not be asked.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Candle, Instrument};

#[derive(Error, Debug)]
pub enum CandleProviderError {
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Data parsing error: {0}")]
    Parse(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Short name recorded as the resolution source of a signal
    fn name(&self) -> &'static str;

    /// Fetch one-minute candles with `from <= timestamp <= to`
    async fn fetch_one_minute_candles(
        &self,
        instrument: &Instrument,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CandleProviderError>;
}
