//! Market Data Adapters
//!
//! Candle sources implementing `CandleProvider`:
//! - `StubCandleProvider`: no data source, every range is empty
//! - `BinanceCandleClient`: live one-minute klines over REST
//! - `InMemoryCandleProvider`: fixtures for tests and dry runs
//!
//! The provider is chosen once at process wiring time from configuration.

mod binance;
mod in_memory;
mod rate_limiter;
mod stub;

pub use binance::{normalize_symbol, parse_klines, BinanceCandleClient, LiveProviderConfig};
pub use in_memory::InMemoryCandleProvider;
pub use rate_limiter::RateLimiter;
pub use stub::StubCandleProvider;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ProviderKind, ProviderSection};
use crate::ports::{CandleProvider, CandleProviderError};

/// Build the configured candle provider
pub fn build_candle_provider(
    section: &ProviderSection,
) -> Result<Arc<dyn CandleProvider>, CandleProviderError> {
    let provider: Arc<dyn CandleProvider> = match section.kind {
        ProviderKind::Stub => {
            tracing::warn!("Using stub candle provider: signals will never find market data");
            Arc::new(StubCandleProvider)
        }
        ProviderKind::Live => {
            let config = LiveProviderConfig::from(&section.live);
            tracing::info!("Using live candle provider at {}", config.base_url);
            Arc::new(BinanceCandleClient::new(config)?)
        }
        ProviderKind::Fixture => {
            let path = section.fixture_path.as_deref().ok_or_else(|| {
                CandleProviderError::Parse("provider.fixture_path is required".to_string())
            })?;
            let path = PathBuf::from(shellexpand::tilde(path).to_string());
            tracing::info!("Using candle fixtures from {}", path.display());
            Arc::new(InMemoryCandleProvider::from_file(&path)?)
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_stub() {
        let section = ProviderSection {
            kind: ProviderKind::Stub,
            ..ProviderSection::default()
        };
        let provider = build_candle_provider(&section).unwrap();
        assert_eq!(provider.name(), "stub");
    }

    #[test]
    fn test_default_section_is_live() {
        let provider = build_candle_provider(&ProviderSection::default()).unwrap();
        assert_eq!(provider.name(), "binance");
    }

    #[test]
    fn test_build_live() {
        let section = ProviderSection {
            kind: ProviderKind::Live,
            ..ProviderSection::default()
        };
        let provider = build_candle_provider(&section).unwrap();
        assert_eq!(provider.name(), "binance");
    }

    #[test]
    fn test_fixture_requires_path() {
        let section = ProviderSection {
            kind: ProviderKind::Fixture,
            ..ProviderSection::default()
        };
        assert!(build_candle_provider(&section).is_err());
    }
}
