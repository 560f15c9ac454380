//! Trade Integrity - verification of user-submitted trade signals
//!
//! Reconciles each open signal against one-minute market candles: confirms
//! the entry, resolves take-profit or stop-loss, or flags the claim as
//! unverified.
//!
//! # Modules
//!
//! - `domain`: Signals, candles, evaluation results and status transitions
//! - `ports`: Trait abstractions (CandleProvider, TradeStore, Clock)
//! - `evaluation`: The integrity evaluator and its window/tie-break policy
//! - `adapters`: External implementations (candle sources, JSON store, HTTP, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Batch runner

pub mod domain;
pub mod ports;
pub mod evaluation;
pub mod adapters;
pub mod config;
pub mod application;
