//! Fixture-backed candle provider.
//!
//! Serves candles from memory (optionally loaded from a JSON file keyed by
//! symbol) and can inject failures or latency per symbol.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Candle, Instrument};
use crate::ports::{CandleProvider, CandleProviderError};

#[derive(Debug, Default)]
pub struct InMemoryCandleProvider {
    candles: RwLock<HashMap<String, Vec<Candle>>>,
    failing: RwLock<HashSet<String>>,
    latency: RwLock<HashMap<String, Duration>>,
    calls: AtomicUsize,
}

impl InMemoryCandleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{ "SYMBOL": [candle, ...], ... }` from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, CandleProviderError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CandleProviderError::Parse(format!("cannot read {}: {}", path.display(), e))
        })?;
        let candles: HashMap<String, Vec<Candle>> = serde_json::from_str(&content)
            .map_err(|e| CandleProviderError::Parse(format!("{}: {}", path.display(), e)))?;

        let provider = Self::new();
        for (symbol, series) in candles {
            provider.insert_candles(&symbol, series);
        }
        Ok(provider)
    }

    pub fn with_candles(self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.insert_candles(symbol, candles);
        self
    }

    /// Every request for `symbol` fails with a timeout
    pub fn with_failure(self, symbol: &str) -> Self {
        self.set_failing(symbol, true);
        self
    }

    /// Every request for `symbol` sleeps before answering
    pub fn with_latency(self, symbol: &str, delay: Duration) -> Self {
        write(&self.latency).insert(symbol.to_string(), delay);
        self
    }

    /// Append candles for a symbol, keeping the series sorted
    pub fn insert_candles(&self, symbol: &str, candles: Vec<Candle>) {
        let mut map = write(&self.candles);
        let series = map.entry(symbol.to_string()).or_default();
        series.extend(candles);
        series.sort_by_key(|c| c.timestamp);
        series.dedup_by_key(|c| c.timestamp);
    }

    pub fn set_failing(&self, symbol: &str, failing: bool) {
        let mut set = write(&self.failing);
        if failing {
            set.insert(symbol.to_string());
        } else {
            set.remove(symbol);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl CandleProvider for InMemoryCandleProvider {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn fetch_one_minute_candles(
        &self,
        instrument: &Instrument,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CandleProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let symbol = instrument.symbol.as_str();

        let delay = read(&self.latency).get(symbol).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if read(&self.failing).contains(symbol) {
            return Err(CandleProviderError::Timeout(Duration::from_secs(10)));
        }

        Ok(read(&self.candles)
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|c| c.timestamp >= from && c.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
