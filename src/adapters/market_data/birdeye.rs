//! Birdeye market data client
//!
//! Token overview (price, 24h volume, liquidity) and hourly price history.
//! One request per second, keyed by `X-API-KEY`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::throttle::Throttle;
use crate::ports::market_data::{MarketDataError, MarketDataProvider, PricePoint, Timeframe};

pub const BIRDEYE_API: &str = "https://public-api.birdeye.so";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);
const NATIVE_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenOverview {
    pub price: Option<f64>,
    pub liquidity: Option<f64>,
    #[serde(rename = "v24hUSD", alias = "volume24hUSD")]
    pub volume_24h_usd: Option<f64>,
    #[serde(rename = "mc")]
    pub market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    #[serde(default)]
    items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
struct HistoryItem {
    #[serde(rename = "unixTime")]
    unix_time: i64,
    value: f64,
}

pub struct BirdeyeClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    throttle: Throttle,
}

impl BirdeyeClient {
    pub fn new(api_key: Option<String>) -> Result<Self, MarketDataError> {
        Self::with_base_url(BIRDEYE_API, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            throttle: Throttle::new(MIN_REQUEST_INTERVAL),
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, MarketDataError> {
        self.throttle.wait().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("Birdeye request: {}", url);
        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header("accept", "application/json")
            .header("x-chain", "solana");
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Birdeye API error {}: {}", status, message);
            return Err(MarketDataError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| MarketDataError::Parse(e.to_string()))?;
        Ok(if envelope.success { envelope.data } else { None })
    }

    pub async fn token_overview(&self, token: &str) -> Result<Option<TokenOverview>, MarketDataError> {
        self.get("/defi/token_overview", &[("address", token.to_string())])
            .await
    }
}

fn history_points(items: Vec<HistoryItem>, count: usize) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = items
        .into_iter()
        .filter_map(|item| {
            Utc.timestamp_opt(item.unix_time, 0)
                .single()
                .map(|timestamp| PricePoint {
                    timestamp,
                    price: item.value,
                })
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    let skip = points.len().saturating_sub(count);
    points.split_off(skip)
}

/// Zero or negative readings count as missing
fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

#[async_trait]
impl MarketDataProvider for BirdeyeClient {
    fn name(&self) -> &str {
        "birdeye"
    }

    fn native_confidence(&self) -> f64 {
        NATIVE_CONFIDENCE
    }

    async fn get_volume_24h(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(positive(self.token_overview(token).await?.and_then(|o| o.volume_24h_usd)))
    }

    async fn get_liquidity(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(positive(self.token_overview(token).await?.and_then(|o| o.liquidity)))
    }

    async fn get_price(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(positive(self.token_overview(token).await?.and_then(|o| o.price)))
    }

    async fn get_price_history(
        &self,
        token: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let time_to = Utc::now().timestamp();
        let time_from = time_to - timeframe.seconds() * count as i64;
        let data: Option<HistoryData> = self
            .get(
                "/defi/history_price",
                &[
                    ("address", token.to_string()),
                    ("address_type", "token".to_string()),
                    ("type", timeframe.as_str().to_string()),
                    ("time_from", time_from.to_string()),
                    ("time_to", time_to.to_string()),
                ],
            )
            .await?;
        Ok(data.map(|d| history_points(d.items, count)).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_parsing() {
        let json = r#"{
            "success": true,
            "data": {"price": 0.0021, "liquidity": 48000.5, "v24hUSD": 125000.0, "mc": 2100000}
        }"#;
        let envelope: Envelope<TokenOverview> = serde_json::from_str(json).unwrap();
        let overview = envelope.data.unwrap();
        assert!(envelope.success);
        assert_eq!(overview.price, Some(0.0021));
        assert_eq!(overview.volume_24h_usd, Some(125000.0));
        assert_eq!(overview.market_cap, Some(2100000.0));
    }

    #[test]
    fn test_overview_legacy_volume_key() {
        let json = r#"{"success": true, "data": {"volume24hUSD": 900.0}}"#;
        let envelope: Envelope<TokenOverview> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.unwrap().volume_24h_usd, Some(900.0));
    }

    #[test]
    fn test_history_sorted_and_truncated() {
        let items = vec![
            HistoryItem { unix_time: 7200, value: 3.0 },
            HistoryItem { unix_time: 0, value: 1.0 },
            HistoryItem { unix_time: 3600, value: 2.0 },
        ];
        let points = history_points(items, 2);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].price, 2.0);
        assert_eq!(points[1].price, 3.0);
    }

    #[test]
    fn test_positive_filter() {
        assert_eq!(positive(Some(0.0)), None);
        assert_eq!(positive(Some(-1.0)), None);
        assert_eq!(positive(Some(f64::NAN)), None);
        assert_eq!(positive(Some(5.0)), Some(5.0));
    }

    #[test]
    fn test_empty_key_treated_as_missing() {
        let client = BirdeyeClient::new(Some(String::new())).unwrap();
        assert!(client.api_key.is_none());
        assert_eq!(client.name(), "birdeye");
        assert_eq!(client.native_confidence(), 0.8);
    }
}
