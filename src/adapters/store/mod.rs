//! Trade Store Adapters

mod json_store;

pub use json_store::JsonTradeStore;
