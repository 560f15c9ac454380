//! Domain Layer - Core types for trade signal verification
//!
//! This module contains pure domain types and logic with no external dependencies.
//! All external interactions happen through the ports layer.

pub mod candle;
pub mod eval_result;
pub mod signal;

pub use candle::Candle;
pub use eval_result::{EvalResult, UnverifiedReason};
pub use signal::{
    Direction, Instrument, InstrumentType, SignalStatus, TradeSignal, Transition, TransitionError,
    Verification,
};
