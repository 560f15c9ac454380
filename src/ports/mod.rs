//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Candle data sources (one-minute OHLC)
//! - Trade record persistence
//! - Wall-clock time

pub mod clock;
pub mod market_data;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use market_data::{CandleProvider, CandleProviderError};
pub use store::{StoreError, TradeStore};

#[cfg(test)]
pub use market_data::MockCandleProvider;
#[cfg(test)]
pub use store::MockTradeStore;
