//! Application Layer
//!
//! Wires the evaluator to the trade store and runs verification passes.

pub mod batch_runner;

pub use batch_runner::{BatchConfig, BatchError, BatchRunner, BatchSummary, SignalOutcome};
