use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Candle, Instrument};
use crate::ports::{CandleProvider, CandleProviderError};

/// Provider with no data source behind it: every range is empty
#[derive(Debug, Default, Clone, Copy)]
pub struct StubCandleProvider;

#[async_trait]
impl CandleProvider for StubCandleProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn fetch_one_minute_candles(
        &self,
        _instrument: &Instrument,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CandleProviderError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InstrumentType;

    #[test]
    fn test_stub_is_always_empty() {
        let provider = StubCandleProvider;
        let now = Utc::now();
        let candles = tokio_test::block_on(provider.fetch_one_minute_candles(
            &Instrument::new("BTCUSDT", InstrumentType::Crypto),
            now - chrono::Duration::days(1),
            now,
        ))
        .unwrap();

        assert!(candles.is_empty());
        assert_eq!(provider.name(), "stub");
    }
}
