//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    load_config, BatchSection, Config, ConfigError, EvaluatorSection, LiveSection, LoggingSection,
    ProviderKind, ProviderSection, ServerSection, StoreSection,
};
