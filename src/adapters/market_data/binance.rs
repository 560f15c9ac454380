//! Live candle provider backed by a Binance-compatible klines endpoint.
//!
//! Pages through `GET /api/v3/klines?interval=1m` until the requested range
//! is covered, respecting a requests-per-minute budget.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::rate_limiter::RateLimiter;
use crate::domain::{Candle, Instrument, InstrumentType};
use crate::ports::{CandleProvider, CandleProviderError};

pub const DEFAULT_BINANCE_API: &str = "https://api.binance.com";

/// Binance error code for an unknown symbol
const INVALID_SYMBOL_CODE: i64 = -1121;

const ONE_MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone)]
pub struct LiveProviderConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub rate_limit_rpm: u32,
    /// Candles per request, the API caps this at 1000
    pub page_limit: usize,
    /// Instrument kinds this source has data for
    pub instrument_types: Vec<InstrumentType>,
}

impl Default for LiveProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BINANCE_API.to_string(),
            timeout: Duration::from_secs(10),
            rate_limit_rpm: 1200,
            page_limit: 1000,
            instrument_types: vec![InstrumentType::Crypto],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinanceCandleClient {
    http: Client,
    config: LiveProviderConfig,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl BinanceCandleClient {
    pub fn new(config: LiveProviderConfig) -> Result<Self, CandleProviderError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CandleProviderError::Http(e.to_string()))?;
        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(config.rate_limit_rpm)));

        Ok(Self {
            http,
            config,
            rate_limiter,
        })
    }

    fn supports(&self, kind: InstrumentType) -> bool {
        self.config.instrument_types.contains(&kind)
    }

    async fn wait_for_slot(&self) {
        loop {
            let wait = {
                let mut limiter = self.rate_limiter.lock().await;
                match limiter.check() {
                    None => {
                        limiter.record_request();
                        return;
                    }
                    Some(wait) => wait,
                }
            };
            tracing::debug!("Candle API rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    fn map_request_error(&self, e: reqwest::Error) -> CandleProviderError {
        if e.is_timeout() {
            CandleProviderError::Timeout(self.config.timeout)
        } else {
            CandleProviderError::Http(e.to_string())
        }
    }

    /// Fetch one page starting at `start_ms`. `None` means the symbol is unknown.
    async fn fetch_page(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Option<Vec<Candle>>, CandleProviderError> {
        self.wait_for_slot().await;

        let url = format!("{}/api/v3/klines", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", "1m".to_string()),
                ("startTime", start_ms.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", self.config.page_limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::BAD_REQUEST && is_unknown_symbol(&body) {
                return Ok(None);
            }
            return Err(CandleProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .map_err(|e| CandleProviderError::Parse(e.to_string()))?;
        parse_klines(&rows).map(Some)
    }
}

#[async_trait]
impl CandleProvider for BinanceCandleClient {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_one_minute_candles(
        &self,
        instrument: &Instrument,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CandleProviderError> {
        if !self.supports(instrument.kind) {
            tracing::debug!("No live candle source for {}", instrument);
            return Ok(Vec::new());
        }

        let symbol = normalize_symbol(&instrument.symbol);
        let end_ms = to.timestamp_millis();
        let mut cursor = from.timestamp_millis();
        let mut candles = Vec::new();

        while cursor <= end_ms {
            let page = match self.fetch_page(&symbol, cursor, end_ms).await? {
                Some(page) => page,
                None => {
                    tracing::warn!("Candle API does not know symbol {}", symbol);
                    return Ok(Vec::new());
                }
            };

            let page_len = page.len();
            let last = match page.last() {
                Some(last) => last.timestamp.timestamp_millis(),
                None => break,
            };
            candles.extend(page);

            if page_len < self.config.page_limit {
                break;
            }
            cursor = last + ONE_MINUTE_MS;
        }

        tracing::debug!(
            "Fetched {} candles for {} between {} and {}",
            candles.len(),
            symbol,
            from,
            to
        );
        Ok(candles)
    }
}

/// `BTC/USDT`, `btc-usdt` and `BTC_USDT` all map to `BTCUSDT`
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | '_' | ' '))
        .collect::<String>()
        .to_uppercase()
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
}

fn is_unknown_symbol(body: &str) -> bool {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.code == INVALID_SYMBOL_CODE)
        .unwrap_or(false)
}

/// Parse kline rows: `[openTime, open, high, low, close, volume, ...]`
pub fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Candle>, CandleProviderError> {
    rows.iter().map(|row| parse_kline(row)).collect()
}

fn parse_kline(row: &[Value]) -> Result<Candle, CandleProviderError> {
    if row.len() < 6 {
        return Err(CandleProviderError::Parse(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| CandleProviderError::Parse(format!("invalid open time: {}", row[0])))?;
    let timestamp = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| CandleProviderError::Parse(format!("open time out of range: {}", open_ms)))?;

    Ok(Candle {
        timestamp,
        open: decimal_field(&row[1], "open")?,
        high: decimal_field(&row[2], "high")?,
        low: decimal_field(&row[3], "low")?,
        close: decimal_field(&row[4], "close")?,
        volume: Some(decimal_field(&row[5], "volume")?),
    })
}

fn decimal_field(value: &Value, name: &str) -> Result<Decimal, CandleProviderError> {
    let parsed = match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CandleProviderError::Parse(format!("invalid {}: {}", name, value)))
}
