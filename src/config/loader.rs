//! Configuration Loader
//!
//! Loads and validates configuration from a TOML file. Every section is
//! optional and falls back to its defaults, so an empty file is a valid
//! configuration using the live provider. The file itself must exist.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::market_data::LiveProviderConfig;
use crate::application::BatchConfig;
use crate::domain::InstrumentType;
use crate::evaluation::{EvaluatorConfig, TieBreak};

const MAX_HORIZON_DAYS: i64 = 365;
const MAX_GRACE_MINUTES: i64 = 24 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub evaluator: EvaluatorSection,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Evaluation window and ambiguity policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluatorSection {
    /// How long after the anchor evidence is searched for
    pub horizon_days: i64,
    /// Extra wait past the horizon before a window counts as elapsed
    pub settlement_grace_minutes: i64,
    /// Outcome for a bar that touches both TP and SL: "adverse" or "favorable"
    pub tie_break: TieBreak,
}

impl Default for EvaluatorSection {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            settlement_grace_minutes: 5,
            tie_break: TieBreak::Adverse,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Signals evaluated in parallel
    pub concurrency: usize,
    /// Per-signal provider timeout
    pub provider_timeout_secs: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            concurrency: 4,
            provider_timeout_secs: 20,
        }
    }
}

/// Which candle source to wire in
///
/// `Stub` never finds data, so it is only used when named explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Stub,
    #[default]
    Live,
    Fixture,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub live: LiveSection,
    /// JSON candle fixtures, required when `kind = "fixture"`
    #[serde(default)]
    pub fixture_path: Option<String>,
}

/// Live klines API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveSection {
    pub base_url: String,
    pub timeout_secs: u64,
    pub rate_limit_rpm: u32,
    pub page_limit: usize,
    pub instrument_types: Vec<InstrumentType>,
}

impl Default for LiveSection {
    fn default() -> Self {
        let defaults = LiveProviderConfig::default();
        Self {
            base_url: defaults.base_url,
            timeout_secs: defaults.timeout.as_secs(),
            rate_limit_rpm: defaults.rate_limit_rpm,
            page_limit: defaults.page_limit,
            instrument_types: defaults.instrument_types,
        }
    }
}

impl LiveSection {
    /// Get API URL with environment variable override
    /// Checks CANDLE_API_URL env var first, falls back to config value
    pub fn get_base_url(&self) -> String {
        std::env::var("CANDLE_API_URL").unwrap_or_else(|_| self.base_url.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Path of the JSON trade store
    pub path: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: "data/trades.json".to_string(),
        }
    }
}

impl StoreSection {
    /// Get store path with environment variable override and `~` expanded
    /// Checks TRADE_STORE_PATH env var first, falls back to config value
    pub fn get_path(&self) -> PathBuf {
        let raw = std::env::var("TRADE_STORE_PATH").unwrap_or_else(|_| self.path.clone());
        PathBuf::from(shellexpand::tilde(&raw).to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    /// Bearer token for the admin routes; admin routes are disabled without one
    pub admin_token: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            admin_token: None,
        }
    }
}

impl ServerSection {
    /// Get admin token with environment variable fallback
    /// Checks ADMIN_TOKEN env var if config value is empty/None
    pub fn get_admin_token(&self) -> Option<String> {
        if let Some(ref token) = self.admin_token {
            if !token.is_empty() {
                return Some(token.clone());
            }
        }
        std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluator.horizon_days <= 0 || self.evaluator.horizon_days > MAX_HORIZON_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "horizon_days must be 1-{}, got {}",
                MAX_HORIZON_DAYS, self.evaluator.horizon_days
            )));
        }

        if self.evaluator.settlement_grace_minutes < 0
            || self.evaluator.settlement_grace_minutes > MAX_GRACE_MINUTES
        {
            return Err(ConfigError::ValidationError(format!(
                "settlement_grace_minutes must be 0-{}, got {}",
                MAX_GRACE_MINUTES, self.evaluator.settlement_grace_minutes
            )));
        }

        EvaluatorConfig::from(self)
            .validate()
            .map_err(ConfigError::ValidationError)?;

        if self.batch.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "batch.concurrency must be > 0".to_string(),
            ));
        }

        if self.batch.provider_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "batch.provider_timeout_secs must be > 0".to_string(),
            ));
        }

        match self.provider.kind {
            ProviderKind::Live => {
                let live = &self.provider.live;
                if live.base_url.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "provider.live.base_url cannot be empty".to_string(),
                    ));
                }
                if live.rate_limit_rpm == 0 {
                    return Err(ConfigError::ValidationError(
                        "provider.live.rate_limit_rpm must be > 0".to_string(),
                    ));
                }
                if live.page_limit == 0 || live.page_limit > 1000 {
                    return Err(ConfigError::ValidationError(format!(
                        "provider.live.page_limit must be 1-1000, got {}",
                        live.page_limit
                    )));
                }
            }
            ProviderKind::Fixture => {
                if self.provider.fixture_path.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::ValidationError(
                        "provider.fixture_path is required for the fixture provider".to_string(),
                    ));
                }
            }
            ProviderKind::Stub => {}
        }

        if self.store.path.is_empty() {
            return Err(ConfigError::ValidationError(
                "store.path cannot be empty".to_string(),
            ));
        }

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            )));
        }

        Ok(())
    }
}

impl From<&Config> for EvaluatorConfig {
    fn from(config: &Config) -> Self {
        EvaluatorConfig::default()
            .with_horizon(chrono::Duration::days(config.evaluator.horizon_days))
            .with_settlement_grace(chrono::Duration::minutes(
                config.evaluator.settlement_grace_minutes,
            ))
            .with_tie_break(config.evaluator.tie_break)
    }
}

impl From<&Config> for BatchConfig {
    fn from(config: &Config) -> Self {
        BatchConfig {
            concurrency: config.batch.concurrency,
            provider_timeout: Duration::from_secs(config.batch.provider_timeout_secs),
        }
    }
}

impl From<&LiveSection> for LiveProviderConfig {
    fn from(section: &LiveSection) -> Self {
        LiveProviderConfig {
            base_url: section.get_base_url(),
            timeout: Duration::from_secs(section.timeout_secs),
            rate_limit_rpm: section.rate_limit_rpm,
            page_limit: section.page_limit,
            instrument_types: section.instrument_types.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[evaluator]
horizon_days = 3
settlement_grace_minutes = 10
tie_break = "favorable"

[batch]
concurrency = 8
provider_timeout_secs = 15

[provider]
kind = "live"

[provider.live]
base_url = "https://data.example.com"
timeout_secs = 5
rate_limit_rpm = 600
page_limit = 500
instrument_types = ["CRYPTO", "FOREX"]

[store]
path = "/var/lib/trade-integrity/trades.json"

[server]
bind = "0.0.0.0:9000"
admin_token = "s3cret"

[logging]
level = "debug"
json = true
"#
        .to_string()
    }

    fn load_str(content: &str) -> Result<Config, ConfigError> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        load_config(file.path())
    }

    #[test]
    fn test_load_valid_config() {
        let config = load_str(&create_valid_config()).unwrap();

        assert_eq!(config.evaluator.horizon_days, 3);
        assert_eq!(config.evaluator.tie_break, TieBreak::Favorable);
        assert_eq!(config.batch.concurrency, 8);
        assert_eq!(config.provider.kind, ProviderKind::Live);
        assert_eq!(config.provider.live.page_limit, 500);
        assert_eq!(
            config.provider.live.instrument_types,
            vec![InstrumentType::Crypto, InstrumentType::Forex]
        );
        assert_eq!(config.server.admin_token.as_deref(), Some("s3cret"));
        assert!(config.logging.json);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = load_str("").unwrap();

        assert_eq!(config.evaluator.horizon_days, 7);
        assert_eq!(config.evaluator.settlement_grace_minutes, 5);
        assert_eq!(config.evaluator.tie_break, TieBreak::Adverse);
        assert_eq!(config.provider.kind, ProviderKind::Live);
        assert_eq!(config.logging.level, "info");
        assert!(config.server.admin_token.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_stub_provider_only_when_named() {
        let config = load_str("[provider]\n").unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Live);

        let config = load_str("[provider]\nkind = \"stub\"\n").unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Stub);
    }

    #[test]
    fn test_unknown_provider_kind() {
        let result = load_str("[provider]\nkind = \"carrier-pigeon\"\n");
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_horizon() {
        let result = load_str("[evaluator]\nhorizon_days = 0\n");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_zero_concurrency() {
        let result = load_str("[batch]\nconcurrency = 0\n");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_fixture_requires_path() {
        let result = load_str("[provider]\nkind = \"fixture\"\n");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));

        let config = load_str("[provider]\nkind = \"fixture\"\nfixture_path = \"candles.json\"\n")
            .unwrap();
        assert_eq!(config.provider.fixture_path.as_deref(), Some("candles.json"));
    }

    #[test]
    fn test_bad_bind_address() {
        let result = load_str("[server]\nbind = \"localhost\"\n");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_config_to_evaluator_config() {
        let config = load_str(&create_valid_config()).unwrap();
        let evaluator = EvaluatorConfig::from(&config);

        assert_eq!(evaluator.horizon, chrono::Duration::days(3));
        assert_eq!(evaluator.settlement_grace, chrono::Duration::minutes(10));
        assert_eq!(evaluator.tie_break, TieBreak::Favorable);
    }

    #[test]
    fn test_config_to_batch_config() {
        let config = load_str(&create_valid_config()).unwrap();
        let batch = BatchConfig::from(&config);

        assert_eq!(batch.concurrency, 8);
        assert_eq!(batch.provider_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_live_section_to_provider_config() {
        let section = LiveSection {
            timeout_secs: 3,
            ..LiveSection::default()
        };
        let live = LiveProviderConfig::from(&section);

        assert_eq!(live.timeout, Duration::from_secs(3));
        assert_eq!(live.page_limit, 1000);
        assert_eq!(live.instrument_types, vec![InstrumentType::Crypto]);
    }
}
