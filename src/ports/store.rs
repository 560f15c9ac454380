//! Trade Record Store Port
//!
//! Persistence of submitted signals. Status updates are conditioned on the
//! status the caller read, so two overlapping batch passes cannot both apply
//! a transition to the same signal.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{SignalStatus, TradeSignal, Transition, TransitionError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Signal not found: {0}")]
    NotFound(String),

    #[error("Signal already exists: {0}")]
    Duplicate(String),

    #[error("Signal {id} is {actual}, expected {expected}")]
    StatusConflict {
        id: String,
        expected: SignalStatus,
        actual: SignalStatus,
    },

    #[error("Rejected transition for {id}: {source}")]
    Rejected {
        id: String,
        #[source]
        source: TransitionError,
    },

    #[error("Invalid signal: {0}")]
    Invalid(String),

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Signals in `pending` or `entered` status
    async fn list_open(&self) -> Result<Vec<TradeSignal>, StoreError>;

    async fn list_all(&self) -> Result<Vec<TradeSignal>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<TradeSignal>, StoreError>;

    /// Add a new pending signal; existing ids are rejected
    async fn insert(&self, signal: TradeSignal) -> Result<(), StoreError>;

    /// Compare-and-set: applies `transition` only if the stored status still
    /// equals `transition.from`. Returns the updated signal.
    async fn apply_transition(
        &self,
        id: &str,
        transition: &Transition,
    ) -> Result<TradeSignal, StoreError>;
}
