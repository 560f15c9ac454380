//! Evaluation Layer - Candle-based verification of trade signals
//!
//! - `params`: horizon, settlement grace and tie-break policy
//! - `evaluator`: the signal state machine driven by candle evidence

pub mod evaluator;
pub mod params;

pub use evaluator::{EvaluationError, IntegrityEvaluator};
pub use params::{EvaluatorConfig, Level, LookupWindow, TieBreak};
