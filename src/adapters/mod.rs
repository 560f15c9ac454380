//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits and the outer
//! surfaces:
//! - Market Data: candle providers (stub, live klines, fixtures)
//! - Store: JSON-file trade store
//! - HTTP: admin server
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod http;
pub mod market_data;
pub mod store;

pub use cli::CliApp;
pub use market_data::{
    build_candle_provider, BinanceCandleClient, InMemoryCandleProvider, StubCandleProvider,
};
pub use store::JsonTradeStore;
