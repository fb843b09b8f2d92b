//! DexScreener market data client (no key, 10 requests/s)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::throttle::Throttle;
use crate::ports::market_data::{MarketDataError, MarketDataProvider, PricePoint, Timeframe};

pub const DEXSCREENER_API: &str = "https://api.dexscreener.com";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const NATIVE_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Deserialize)]
struct TokenPairsResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub pair_address: Option<String>,
    pub dex_id: Option<String>,
    pub price_usd: Option<String>,
    #[serde(default)]
    pub volume: Option<Volume>,
    #[serde(default)]
    pub liquidity: Option<Liquidity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

impl Pair {
    fn volume_24h(&self) -> f64 {
        self.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0)
    }

    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }
}

/// Summed over every pair; zero means unknown
pub fn total_volume(pairs: &[Pair]) -> Option<f64> {
    let total: f64 = pairs.iter().map(Pair::volume_24h).filter(|v| *v > 0.0).sum();
    (total > 0.0).then_some(total)
}

pub fn total_liquidity(pairs: &[Pair]) -> Option<f64> {
    let total: f64 = pairs.iter().map(Pair::liquidity_usd).filter(|l| *l > 0.0).sum();
    (total > 0.0).then_some(total)
}

/// USD price quoted by the highest-volume pair
pub fn best_price(pairs: &[Pair]) -> Option<f64> {
    pairs
        .iter()
        .filter(|p| p.price_usd.is_some())
        .max_by(|a, b| a.volume_24h().total_cmp(&b.volume_24h()))
        .and_then(|p| p.price_usd.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|p| *p > 0.0)
}

pub struct DexScreenerClient {
    http: Client,
    base_url: String,
    throttle: Throttle,
}

impl DexScreenerClient {
    pub fn new() -> Result<Self, MarketDataError> {
        Self::with_base_url(DEXSCREENER_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("raydium-sniper/0.1")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            throttle: Throttle::new(MIN_REQUEST_INTERVAL),
        })
    }

    pub async fn token_pairs(&self, token: &str) -> Result<Vec<Pair>, MarketDataError> {
        self.throttle.wait().await;

        let url = format!("{}/latest/dex/tokens/{}", self.base_url, token);
        debug!("DexScreener request: {}", url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited);
        }
        if !status.is_success() {
            return Err(MarketDataError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: TokenPairsResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::Parse(e.to_string()))?;
        Ok(body.pairs.unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataProvider for DexScreenerClient {
    fn name(&self) -> &str {
        "dexscreener"
    }

    fn native_confidence(&self) -> f64 {
        NATIVE_CONFIDENCE
    }

    async fn get_volume_24h(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(total_volume(&self.token_pairs(token).await?))
    }

    async fn get_liquidity(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(total_liquidity(&self.token_pairs(token).await?))
    }

    async fn get_price(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(best_price(&self.token_pairs(token).await?))
    }

    async fn get_price_history(
        &self,
        _token: &str,
        _timeframe: Timeframe,
        _count: usize,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        Err(MarketDataError::Unsupported(
            "dexscreener has no price history endpoint".to_string(),
        ))
    }
}
