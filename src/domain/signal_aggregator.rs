//! Signal Aggregator
//!
//! Reduces readings from independent market-data providers to a single value
//! with a confidence score. The aggregator never blocks a trade on its own;
//! it only scores, and callers apply their own confidence floor.
//!
//! Agreement between sources is judged by the coefficient of variation
//! (sample std-dev / mean):
//!
//! | CV          | Method                | Consistency | Value  |
//! |-------------|-----------------------|-------------|--------|
//! | < 0.10      | high consistency      | 1.0         | mean   |
//! | < 0.30      | moderate consistency  | 0.8         | mean   |
//! | < 0.50      | low consistency       | 0.6         | median |
//! | otherwise   | inconsistent          | 0.3         | median |
//!
//! Final confidence = consistency x mean native confidence x (n / 2), capped at 1.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::ports::market_data::{MarketDataProvider, Metric, PricePoint, Timeframe};

/// Confidence multiplier for an uncorroborated single source
pub const SINGLE_SOURCE_PENALTY: f64 = 0.7;

/// Volume reported when no provider has data
pub const DEFAULT_NO_DATA_VOLUME: f64 = 10_000.0;

/// Volume floor applied when confidence is below the caller's minimum
pub const DEFAULT_LOW_CONFIDENCE_VOLUME: f64 = 25_000.0;

/// Volume assumed when every provider errored
pub const DEFAULT_ERROR_FALLBACK_VOLUME: f64 = 100_000.0;

/// Concurrent lookups in bulk mode
pub const DEFAULT_BULK_CONCURRENCY: usize = 5;

/// Candles used for the volatility estimate
pub const VOLATILITY_POINTS: usize = 24;

/// How the final value was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    NoData,
    SingleSource,
    HighConsistency,
    ModerateConsistency,
    LowConsistency,
    Inconsistent,
}

impl ValidationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMethod::NoData => "no_data",
            ValidationMethod::SingleSource => "single_source",
            ValidationMethod::HighConsistency => "high_consistency",
            ValidationMethod::ModerateConsistency => "moderate_consistency",
            ValidationMethod::LowConsistency => "low_consistency",
            ValidationMethod::Inconsistent => "inconsistent",
        }
    }
}

/// One provider's reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReading {
    pub source: String,
    pub value: f64,
    /// Native confidence of the provider, in [0, 1]
    pub confidence: f64,
}

impl SourceReading {
    pub fn new(source: impl Into<String>, value: f64, confidence: f64) -> Self {
        Self {
            source: source.into(),
            value,
            confidence,
        }
    }
}

/// Combined signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSignal {
    pub value: f64,
    /// Always in [0, 1]
    pub confidence: f64,
    pub sources_used: usize,
    /// Providers that errored or timed out
    pub sources_failed: usize,
    pub method: ValidationMethod,
    pub warnings: Vec<String>,
    pub readings: Vec<SourceReading>,
}

/// Volume after the caller-side confidence floor
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeAssessment {
    /// Value to compare against the minimum volume
    pub volume: f64,
    pub signal: ValidatedSignal,
    /// Why the raw signal value was replaced, if it was
    pub fallback: Option<String>,
}

/// Liquidity and estimated price impact for a trade size
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityAnalysis {
    pub liquidity_usd: Option<f64>,
    pub price_impact_pct: Option<f64>,
    pub can_trade: bool,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SignalAggregatorConfig {
    /// Per-provider deadline; a late provider counts as absent
    pub provider_timeout: Duration,
    pub no_data_volume: f64,
    pub low_confidence_volume: f64,
    pub error_fallback_volume: f64,
    /// Caller floor for volume confidence
    pub min_volume_confidence: f64,
    pub bulk_concurrency: usize,
}

impl Default for SignalAggregatorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(5),
            no_data_volume: DEFAULT_NO_DATA_VOLUME,
            low_confidence_volume: DEFAULT_LOW_CONFIDENCE_VOLUME,
            error_fallback_volume: DEFAULT_ERROR_FALLBACK_VOLUME,
            min_volume_confidence: 0.3,
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
        }
    }
}

/// Combine raw readings. Non-positive and non-finite values are discarded.
pub fn combine(readings: Vec<SourceReading>, sources_failed: usize, fallback: f64) -> ValidatedSignal {
    let readings: Vec<SourceReading> = readings
        .into_iter()
        .filter(|r| r.value.is_finite() && r.value > 0.0)
        .map(|r| SourceReading {
            confidence: clamp_unit(r.confidence),
            ..r
        })
        .collect();

    let mut warnings = Vec::new();
    if sources_failed > 0 {
        warnings.push(format!("{} data source(s) unavailable", sources_failed));
    }

    match readings.len() {
        0 => {
            warnings.push("No data sources available".to_string());
            ValidatedSignal {
                value: fallback,
                confidence: 0.0,
                sources_used: 0,
                sources_failed,
                method: ValidationMethod::NoData,
                warnings,
                readings,
            }
        }
        1 => {
            let only = &readings[0];
            warnings.push(format!("Single data source: {}", only.source));
            ValidatedSignal {
                value: only.value,
                confidence: clamp_unit(only.confidence * SINGLE_SOURCE_PENALTY),
                sources_used: 1,
                sources_failed,
                method: ValidationMethod::SingleSource,
                warnings,
                readings,
            }
        }
        n => {
            let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
            let mean = values.iter().mean();
            let std_dev = values.iter().std_dev();
            let cv = if mean > 0.0 { std_dev / mean } else { f64::INFINITY };

            let (method, consistency) = if cv < 0.1 {
                (ValidationMethod::HighConsistency, 1.0)
            } else if cv < 0.3 {
                (ValidationMethod::ModerateConsistency, 0.8)
            } else if cv < 0.5 {
                warnings.push(format!("Volume variation: {:.1}%", cv * 100.0));
                (ValidationMethod::LowConsistency, 0.6)
            } else {
                warnings.push(format!("High volume variation: {:.1}%", cv * 100.0));
                warnings.push("Using median value".to_string());
                (ValidationMethod::Inconsistent, 0.3)
            };

            let value = if consistency >= 0.8 { mean } else { median(&values) };
            let avg_confidence = readings.iter().map(|r| r.confidence).mean();
            let confidence = clamp_unit(consistency * avg_confidence * (n as f64 / 2.0));

            ValidatedSignal {
                value,
                confidence,
                sources_used: n,
                sources_failed,
                method,
                warnings,
                readings,
            }
        }
    }
}

/// Sample std-dev of simple returns, capped at 1.0. `None` below three points.
pub fn volatility(history: &[PricePoint]) -> Option<f64> {
    if history.len() < 3 {
        return None;
    }

    let returns: Vec<f64> = history
        .windows(2)
        .filter(|w| w[0].price > 0.0)
        .map(|w| w[1].price / w[0].price - 1.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }

    let sd = returns.iter().std_dev();
    if !sd.is_finite() {
        return None;
    }
    Some(sd.min(1.0))
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Concurrent multi-provider aggregation
#[derive(Clone)]
pub struct SignalAggregator {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    config: SignalAggregatorConfig,
}

impl SignalAggregator {
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>, config: SignalAggregatorConfig) -> Self {
        Self { providers, config }
    }

    pub fn config(&self) -> &SignalAggregatorConfig {
        &self.config
    }

    /// Query every provider for `metric` and combine
    pub async fn aggregate(&self, token: &str, metric: Metric) -> ValidatedSignal {
        let (readings, failed) = self.collect(token, metric).await;
        let fallback = match metric {
            Metric::Volume24h => self.config.no_data_volume,
            Metric::Liquidity | Metric::Price => 0.0,
        };
        combine(readings, failed, fallback)
    }

    /// 24h volume with the confidence floor applied
    pub async fn volume_with_floor(&self, token: &str) -> VolumeAssessment {
        let signal = self.aggregate(token, Metric::Volume24h).await;

        let all_failed = !self.providers.is_empty()
            && signal.sources_used == 0
            && signal.sources_failed == self.providers.len();

        let (volume, fallback) = if all_failed {
            (
                self.config.error_fallback_volume,
                Some("all volume providers failed".to_string()),
            )
        } else if signal.confidence < self.config.min_volume_confidence {
            (
                signal.value.max(self.config.low_confidence_volume),
                Some(format!(
                    "confidence {:.2} below {:.2}",
                    signal.confidence, self.config.min_volume_confidence
                )),
            )
        } else {
            (signal.value, None)
        };

        if let Some(reason) = &fallback {
            tracing::warn!(
                "Volume for {}: using conservative ${:.0} ({})",
                token,
                volume,
                reason
            );
        }

        VolumeAssessment {
            volume,
            signal,
            fallback,
        }
    }

    /// Confidence-weighted liquidity and price impact of a `trade_usd` order
    pub async fn liquidity_analysis(
        &self,
        token: &str,
        trade_usd: f64,
        max_price_impact_pct: f64,
    ) -> LiquidityAnalysis {
        let (readings, _) = self.collect(token, Metric::Liquidity).await;
        let usable: Vec<&SourceReading> = readings
            .iter()
            .filter(|r| r.value.is_finite() && r.value > 0.0)
            .collect();

        let weight: f64 = usable.iter().map(|r| r.confidence).sum();
        if usable.is_empty() || weight <= 0.0 {
            return LiquidityAnalysis {
                liquidity_usd: None,
                price_impact_pct: None,
                can_trade: false,
                reason: "No liquidity data available".to_string(),
            };
        }

        let liquidity = usable.iter().map(|r| r.value * r.confidence).sum::<f64>() / weight;
        let impact = trade_usd / liquidity.max(1.0) * 100.0;
        let can_trade = impact <= max_price_impact_pct;
        let reason = if can_trade {
            format!("Price impact {:.2}% within {:.2}%", impact, max_price_impact_pct)
        } else {
            format!(
                "Price impact {:.2}% exceeds {:.2}% (liquidity ${:.0})",
                impact, max_price_impact_pct, liquidity
            )
        };

        LiquidityAnalysis {
            liquidity_usd: Some(liquidity),
            price_impact_pct: Some(impact),
            can_trade,
            reason,
        }
    }

    /// Hourly volatility from the first provider with enough history
    pub async fn volatility(&self, token: &str) -> Option<f64> {
        for provider in &self.providers {
            let fut = provider.get_price_history(token, Timeframe::H1, VOLATILITY_POINTS + 1);
            match tokio::time::timeout(self.config.provider_timeout, fut).await {
                Ok(Ok(history)) => {
                    if let Some(v) = volatility(&history) {
                        return Some(v);
                    }
                }
                Ok(Err(e)) => tracing::debug!("{} price history failed: {}", provider.name(), e),
                Err(_) => tracing::debug!("{} price history timed out", provider.name()),
            }
        }
        None
    }

    /// Volume for many tokens, at most `bulk_concurrency` in flight
    pub async fn bulk_volume(&self, tokens: &[String]) -> Vec<(String, ValidatedSignal)> {
        let concurrency = self.config.bulk_concurrency.max(1);
        stream::iter(tokens.iter().cloned())
            .map(|token| async move {
                let signal = self.aggregate(&token, Metric::Volume24h).await;
                (token, signal)
            })
            .buffered(concurrency)
            .collect()
            .await
    }

    async fn collect(&self, token: &str, metric: Metric) -> (Vec<SourceReading>, usize) {
        let timeout = self.config.provider_timeout;
        let calls = self.providers.iter().map(|provider| async move {
            let result = tokio::time::timeout(timeout, provider.get_metric(token, metric)).await;
            (provider, result)
        });

        let mut readings = Vec::new();
        let mut failed = 0;
        for (provider, result) in futures::future::join_all(calls).await {
            match result {
                Ok(Ok(Some(value))) => readings.push(SourceReading::new(
                    provider.name(),
                    value,
                    provider.native_confidence(),
                )),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::warn!("{} {} lookup failed for {}: {}", provider.name(), metric, token, e);
                }
                Err(_) => {
                    failed += 1;
                    tracing::warn!("{} {} lookup timed out for {}", provider.name(), metric, token);
                }
            }
        }
        (readings, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::{MockMarketData, ProviderScript};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn r(source: &str, value: f64, confidence: f64) -> SourceReading {
        SourceReading::new(source, value, confidence)
    }

    fn history(prices: &[f64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
                price: *p,
            })
            .collect()
    }

    #[test]
    fn test_no_data() {
        let s = combine(vec![r("a", 0.0, 0.9), r("b", -5.0, 0.9)], 0, 10_000.0);
        assert_eq!(s.method, ValidationMethod::NoData);
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.value, 10_000.0);
        assert_eq!(s.sources_used, 0);
    }

    #[test]
    fn test_single_source_penalty() {
        let s = combine(vec![r("birdeye", 42_000.0, 0.85)], 1, 10_000.0);
        assert_eq!(s.method, ValidationMethod::SingleSource);
        assert_relative_eq!(s.confidence, 0.85 * 0.7, epsilon = 1e-12);
        assert!(s.confidence <= 0.85 * SINGLE_SOURCE_PENALTY + 1e-12);
        assert!(!s.warnings.is_empty());
    }

    #[test]
    fn test_close_sources_use_mean() {
        let s = combine(
            vec![r("birdeye", 100_000.0, 0.85), r("dexscreener", 95_000.0, 0.80)],
            0,
            10_000.0,
        );
        assert_eq!(s.method, ValidationMethod::HighConsistency);
        assert_relative_eq!(s.value, 97_500.0);
        assert!(s.confidence > 0.8);
    }

    #[test]
    fn test_divergent_sources_use_median() {
        let s = combine(
            vec![r("birdeye", 100_000.0, 0.85), r("dexscreener", 50_000.0, 0.80)],
            0,
            10_000.0,
        );
        assert_relative_eq!(s.value, 75_000.0);
        assert!(s.confidence < 0.5);
        assert!(!s.warnings.is_empty());
        assert!(matches!(
            s.method,
            ValidationMethod::LowConsistency | ValidationMethod::Inconsistent
        ));
    }

    #[test]
    fn test_consistency_orders_confidence() {
        let tight = combine(vec![r("a", 100.0, 0.8), r("b", 101.0, 0.8)], 0, 0.0);
        let loose = combine(vec![r("a", 100.0, 0.8), r("b", 10.0, 0.8)], 0, 0.0);
        assert_eq!(tight.method, ValidationMethod::HighConsistency);
        assert_eq!(loose.method, ValidationMethod::Inconsistent);
        assert!(tight.confidence > loose.confidence);
    }

    #[test]
    fn test_confidence_bounded() {
        let many: Vec<SourceReading> = (0..10).map(|i| r("x", 100.0 + i as f64, 1.5)).collect();
        let s = combine(many, 0, 0.0);
        assert!(s.confidence <= 1.0 && s.confidence >= 0.0);

        let weird = combine(vec![r("a", f64::NAN, 0.9), r("b", 10.0, f64::NAN)], 0, 0.0);
        assert!(weird.confidence >= 0.0 && weird.confidence <= 1.0);
    }

    #[test]
    fn test_volatility() {
        assert_eq!(volatility(&history(&[100.0, 101.0])), None);
        assert_eq!(volatility(&history(&[100.0; 25])), Some(0.0));

        let stable: Vec<f64> = (0..25).map(|i| 100.0 + i as f64 * 0.01).collect();
        assert!(volatility(&history(&stable)).unwrap() < 0.01);

        let wild: Vec<f64> = (0..25).map(|i| if i % 2 == 0 { 150.0 } else { 50.0 }).collect();
        assert_eq!(volatility(&history(&wild)), Some(1.0));
    }

    fn aggregator(providers: Vec<Arc<dyn MarketDataProvider>>) -> SignalAggregator {
        SignalAggregator::new(
            providers,
            SignalAggregatorConfig {
                provider_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_aggregate_treats_failures_as_absent() {
        let a = MockMarketData::new("birdeye", 0.85).with_volume("T", 80_000.0);
        let b = MockMarketData::new("dexscreener", 0.8).failing("T");
        let agg = aggregator(vec![Arc::new(a), Arc::new(b)]);

        let s = agg.aggregate("T", Metric::Volume24h).await;
        assert_eq!(s.method, ValidationMethod::SingleSource);
        assert_eq!(s.sources_failed, 1);
        assert_eq!(s.value, 80_000.0);
    }

    #[tokio::test]
    async fn test_aggregate_price() {
        let a = MockMarketData::new("birdeye", 0.8).with_price("T", 0.000120);
        let b = MockMarketData::new("dexscreener", 0.7).with_price("T", 0.000118);
        let agg = aggregator(vec![Arc::new(a), Arc::new(b)]);

        let s = agg.aggregate("T", Metric::Price).await;
        assert_eq!(s.method, ValidationMethod::HighConsistency);
        assert_relative_eq!(s.value, 0.000119, epsilon = 1e-12);

        let missing = agg.aggregate("UNKNOWN", Metric::Price).await;
        assert_eq!(missing.method, ValidationMethod::NoData);
        assert_eq!(missing.value, 0.0);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let slow = MockMarketData::new("slow", 0.9).with_script(
            "T",
            ProviderScript {
                volume: Some(1.0),
                delay_ms: 1_000,
                ..Default::default()
            },
        );
        let fast = MockMarketData::new("fast", 0.8).with_volume("T", 50_000.0);
        let agg = aggregator(vec![Arc::new(slow), Arc::new(fast)]);

        let s = agg.aggregate("T", Metric::Volume24h).await;
        assert_eq!(s.sources_used, 1);
        assert_eq!(s.sources_failed, 1);
    }

    #[tokio::test]
    async fn test_volume_floor() {
        let single = MockMarketData::new("birdeye", 0.3).with_volume("T", 6_000.0);
        let agg = aggregator(vec![Arc::new(single)]);
        let v = agg.volume_with_floor("T").await;
        assert_eq!(v.volume, DEFAULT_LOW_CONFIDENCE_VOLUME);
        assert!(v.fallback.is_some());

        let broken = MockMarketData::new("birdeye", 0.85).failing("T");
        let agg = aggregator(vec![Arc::new(broken)]);
        let v = agg.volume_with_floor("T").await;
        assert_eq!(v.volume, DEFAULT_ERROR_FALLBACK_VOLUME);
    }

    #[tokio::test]
    async fn test_liquidity_analysis() {
        let a = MockMarketData::new("birdeye", 0.8).with_liquidity("T", 10_000.0);
        let b = MockMarketData::new("dexscreener", 0.8).with_liquidity("T", 10_000.0);
        let agg = aggregator(vec![Arc::new(a), Arc::new(b)]);

        let ok = agg.liquidity_analysis("T", 100.0, 5.0).await;
        assert!(ok.can_trade);
        assert_relative_eq!(ok.price_impact_pct.unwrap(), 1.0);

        let too_big = agg.liquidity_analysis("T", 1_000.0, 5.0).await;
        assert!(!too_big.can_trade);

        let none = agg.liquidity_analysis("UNKNOWN", 100.0, 5.0).await;
        assert!(!none.can_trade);
        assert!(none.liquidity_usd.is_none());
    }

    #[tokio::test]
    async fn test_bulk_volume_preserves_order() {
        let a = MockMarketData::new("birdeye", 0.85)
            .with_volume("A", 1_000.0)
            .with_volume("B", 2_000.0)
            .with_volume("C", 3_000.0);
        let agg = aggregator(vec![Arc::new(a)]);
        let tokens = vec!["A".to_string(), "B".to_string(), "C".to_string()];

        let out = agg.bulk_volume(&tokens).await;
        let values: Vec<f64> = out.iter().map(|(_, s)| s.value).collect();
        assert_eq!(values, vec![1_000.0, 2_000.0, 3_000.0]);
    }
}
