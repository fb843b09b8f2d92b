//! Market Data Port
//!
//! Independent third-party feeds (volume, liquidity, price, price history).
//! Every provider carries a native confidence used to weight its readings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Market data error type
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Data parsing error: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        MarketDataError::Http(err.to_string())
    }
}

/// Metric a signal is aggregated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Volume24h,
    Liquidity,
    Price,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Volume24h => f.write_str("volume_24h"),
            Metric::Liquidity => f.write_str("liquidity"),
            Metric::Price => f.write_str("price"),
        }
    }
}

/// Candle width for price history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
            Timeframe::D1 => "1D",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::M15 => 900,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }
}

/// One historical price sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Short provider name for logs and warnings
    fn name(&self) -> &str;

    /// Trust in this provider's readings, in [0, 1]
    fn native_confidence(&self) -> f64;

    /// 24h volume in USD; `None` if the token is unknown to the provider
    async fn get_volume_24h(&self, token: &str) -> Result<Option<f64>, MarketDataError>;

    /// Pool liquidity in USD
    async fn get_liquidity(&self, token: &str) -> Result<Option<f64>, MarketDataError>;

    /// Spot price in USD
    async fn get_price(&self, token: &str) -> Result<Option<f64>, MarketDataError>;

    /// Up to `count` most recent candles, oldest first
    async fn get_price_history(
        &self,
        token: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<PricePoint>, MarketDataError>;

    /// Dispatch by metric
    async fn get_metric(&self, token: &str, metric: Metric) -> Result<Option<f64>, MarketDataError> {
        match metric {
            Metric::Volume24h => self.get_volume_24h(token).await,
            Metric::Liquidity => self.get_liquidity(token).await,
            Metric::Price => self.get_price(token).await,
        }
    }
}
