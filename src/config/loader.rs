//! Configuration Loader
//!
//! Reads `config.toml` into typed sections. Every section has defaults, so a
//! partial (or empty) file is valid; `validate()` catches values the sniper
//! cannot run with.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use solana_sdk::commitment_config::CommitmentConfig;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::adapters::jito::JitoConfig;
use crate::application::orchestrator::OrchestratorConfig;
use crate::domain::risk_scorer::{RiskScorerConfig, TokenPolicy};
use crate::domain::signal_aggregator::SignalAggregatorConfig;
use crate::domain::swap::PriorityFee;
use crate::domain::trade_gate::TradeGateConfig;
use crate::domain::triggers::{ExitRule, TriggerConfig, TriggerSettings};
use crate::domain::RateLimitState;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub solana: SolanaSection,
    pub trading: TradingSection,
    pub filters: FiltersSection,
    pub security: SecuritySection,
    pub triggers: TriggersSection,
    pub signals: SignalsSection,
    pub jito: JitoSection,
    pub api_keys: ApiKeysSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolanaSection {
    pub rpc_url: String,
    /// Derived from `rpc_url` when empty
    pub ws_url: String,
    /// "processed", "confirmed" or "finalized"
    pub commitment: String,
    pub keypair_path: String,
}

impl Default for SolanaSection {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: String::new(),
            commitment: "confirmed".to_string(),
            keypair_path: "~/.config/solana/id.json".to_string(),
        }
    }
}

fn env_or(var: &str, fallback: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

impl SolanaSection {
    /// `SOLANA_RPC_URL` overrides the file
    pub fn rpc_url(&self) -> String {
        env_or("SOLANA_RPC_URL", &self.rpc_url)
    }

    /// `SOLANA_WS_URL`, then the file, then the RPC URL with a ws scheme
    pub fn ws_url(&self) -> String {
        let configured = env_or("SOLANA_WS_URL", &self.ws_url);
        if !configured.is_empty() {
            return configured;
        }
        let rpc = self.rpc_url();
        if let Some(rest) = rpc.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = rpc.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            rpc
        }
    }

    pub fn keypair_path(&self) -> String {
        env_or("SOLANA_KEYPAIR_PATH", &self.keypair_path)
    }

    pub fn commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        match self.commitment.to_lowercase().as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(ConfigError::ValidationError(format!(
                "commitment must be processed, confirmed or finalized, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingSection {
    /// Off = detect and score only
    pub auto_buy: bool,
    /// Simulate signing and submission
    pub paper_trading: bool,
    pub buy_amount_sol: f64,
    pub slippage_bps: u16,
    /// Exit swaps; 100 bps when unset
    pub sell_slippage_bps: Option<u16>,
    pub max_trades_per_hour: usize,
    pub cooldown_seconds: u64,
    pub buy_delay_seconds: u64,
    pub compute_unit_limit: u32,
    pub priority_fee_micro_lamports: u64,
    pub confirm_attempts: u32,
    pub confirm_delay_ms: u64,
    pub price_poll_interval_ms: u64,
    /// Grace after the confirmation budget before stop aborts tasks
    pub drain_timeout_ms: u64,
    /// USD value of one SOL for volume/impact math
    pub sol_price_usd: f64,
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            auto_buy: false,
            paper_trading: true,
            buy_amount_sol: 0.1,
            slippage_bps: 500,
            sell_slippage_bps: None,
            max_trades_per_hour: 5,
            cooldown_seconds: 60,
            buy_delay_seconds: 0,
            compute_unit_limit: 200_000,
            priority_fee_micro_lamports: 100_000,
            confirm_attempts: 30,
            confirm_delay_ms: 1_000,
            price_poll_interval_ms: 2_000,
            drain_timeout_ms: 10_000,
            sol_price_usd: 150.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiltersSection {
    pub min_volume_24h: f64,
    pub max_price_impact_pct: Option<f64>,
    pub max_volatility: Option<f64>,
    pub min_liquidity_sol: f64,
    pub max_top_holder_pct: f64,
    pub max_supply: f64,
    pub min_holders: u64,
    /// Applies only with `security.token_age_validation`
    pub min_token_age_hours: u64,
}

impl Default for FiltersSection {
    fn default() -> Self {
        Self {
            min_volume_24h: 5_000.0,
            max_price_impact_pct: Some(5.0),
            max_volatility: Some(0.3),
            min_liquidity_sol: 5.0,
            max_top_holder_pct: 20.0,
            max_supply: 1_000_000_000.0,
            min_holders: 100,
            min_token_age_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub max_risk_score: u32,
    pub require_verified: bool,
    pub require_renounced: bool,
    /// Query the reputation service at all
    pub use_reputation: bool,
    /// Reject tokens younger than `filters.min_token_age_hours`
    pub token_age_validation: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            max_risk_score: 50,
            require_verified: true,
            require_renounced: true,
            use_reputation: true,
            token_age_validation: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggersSection {
    pub enabled: bool,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub trailing_stop_enabled: bool,
    pub trailing_stop_pct: Decimal,
    pub max_hold_hours: u64,
    pub exit_order: Vec<String>,
}

impl Default for TriggersSection {
    fn default() -> Self {
        Self {
            enabled: true,
            take_profit_pct: dec!(30),
            stop_loss_pct: dec!(15),
            trailing_stop_enabled: true,
            trailing_stop_pct: dec!(10),
            max_hold_hours: 4,
            exit_order: ["trailing_stop", "max_hold", "take_profit", "stop_loss"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsSection {
    pub provider_timeout_secs: u64,
    pub min_volume_confidence: f64,
    pub no_data_volume: f64,
    pub low_confidence_volume: f64,
    pub error_fallback_volume: f64,
    pub bulk_concurrency: usize,
}

impl Default for SignalsSection {
    fn default() -> Self {
        let base = SignalAggregatorConfig::default();
        Self {
            provider_timeout_secs: base.provider_timeout.as_secs(),
            min_volume_confidence: base.min_volume_confidence,
            no_data_volume: base.no_data_volume,
            low_confidence_volume: base.low_confidence_volume,
            error_fallback_volume: base.error_fallback_volume,
            bulk_concurrency: base.bulk_concurrency,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JitoSection {
    pub enabled: bool,
    /// Region shorthand or full block engine URL
    pub region: String,
    pub tip_lamports: u64,
    pub api_token: Option<String>,
}

impl Default for JitoSection {
    fn default() -> Self {
        Self {
            enabled: false,
            region: "ny".to_string(),
            tip_lamports: 10_000,
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiKeysSection {
    pub birdeye: Option<String>,
    pub rugcheck: Option<String>,
}

impl ApiKeysSection {
    /// `BIRDEYE_API_KEY` overrides the file
    pub fn birdeye(&self) -> Option<String> {
        key_with_env("BIRDEYE_API_KEY", &self.birdeye)
    }

    pub fn rugcheck(&self) -> Option<String> {
        key_with_env("RUGCHECK_API_KEY", &self.rugcheck)
    }
}

fn key_with_env(var: &str, configured: &Option<String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .or_else(|| configured.clone())
        .filter(|k| !k.is_empty())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError(message)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.trading;
        if t.buy_amount_sol.is_nan() || t.buy_amount_sol <= 0.0 {
            return Err(invalid(format!("buy_amount_sol must be > 0, got {}", t.buy_amount_sol)));
        }
        if t.slippage_bps > 10_000 || t.sell_slippage_bps.is_some_and(|b| b > 10_000) {
            return Err(invalid("slippage_bps must be <= 10000".to_string()));
        }
        if t.max_trades_per_hour == 0 {
            return Err(invalid("max_trades_per_hour must be > 0".to_string()));
        }
        if t.confirm_attempts == 0 {
            return Err(invalid("confirm_attempts must be > 0".to_string()));
        }
        if t.price_poll_interval_ms == 0 {
            return Err(invalid("price_poll_interval_ms must be > 0".to_string()));
        }
        if t.sol_price_usd.is_nan() || t.sol_price_usd <= 0.0 {
            return Err(invalid(format!("sol_price_usd must be > 0, got {}", t.sol_price_usd)));
        }

        let tr = &self.triggers;
        if tr.take_profit_pct <= Decimal::ZERO {
            return Err(invalid(format!("take_profit_pct must be > 0, got {}", tr.take_profit_pct)));
        }
        if tr.stop_loss_pct <= Decimal::ZERO || tr.stop_loss_pct >= dec!(100) {
            return Err(invalid(format!(
                "stop_loss_pct must be in (0, 100), got {}",
                tr.stop_loss_pct
            )));
        }
        if tr.trailing_stop_enabled
            && (tr.trailing_stop_pct <= Decimal::ZERO || tr.trailing_stop_pct >= dec!(100))
        {
            return Err(invalid(format!(
                "trailing_stop_pct must be in (0, 100), got {}",
                tr.trailing_stop_pct
            )));
        }
        self.exit_order()?;

        let s = &self.signals;
        if !(0.0..=1.0).contains(&s.min_volume_confidence) {
            return Err(invalid(format!(
                "min_volume_confidence must be in [0, 1], got {}",
                s.min_volume_confidence
            )));
        }
        if s.provider_timeout_secs == 0 || s.bulk_concurrency == 0 {
            return Err(invalid(
                "provider_timeout_secs and bulk_concurrency must be > 0".to_string(),
            ));
        }

        if self.security.max_risk_score > 100 {
            return Err(invalid(format!(
                "max_risk_score must be <= 100, got {}",
                self.security.max_risk_score
            )));
        }
        if self.filters.max_top_holder_pct <= 0.0 || self.filters.max_top_holder_pct > 100.0 {
            return Err(invalid(format!(
                "max_top_holder_pct must be in (0, 100], got {}",
                self.filters.max_top_holder_pct
            )));
        }
        if self.jito.enabled && self.jito.tip_lamports == 0 {
            return Err(invalid("jito.tip_lamports must be > 0 when enabled".to_string()));
        }
        if self.solana.rpc_url().is_empty() {
            return Err(invalid("solana.rpc_url is empty".to_string()));
        }
        self.solana.commitment()?;
        Ok(())
    }

    pub fn exit_order(&self) -> Result<Vec<ExitRule>, ConfigError> {
        let order = self
            .triggers
            .exit_order
            .iter()
            .map(|s| ExitRule::from_str(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;
        if order.is_empty() {
            return Err(invalid("triggers.exit_order is empty".to_string()));
        }
        Ok(order)
    }

    pub fn buy_amount_lamports(&self) -> u64 {
        (self.trading.buy_amount_sol * LAMPORTS_PER_SOL).round() as u64
    }

    pub fn aggregator_config(&self) -> SignalAggregatorConfig {
        let s = &self.signals;
        SignalAggregatorConfig {
            provider_timeout: Duration::from_secs(s.provider_timeout_secs),
            no_data_volume: s.no_data_volume,
            low_confidence_volume: s.low_confidence_volume,
            error_fallback_volume: s.error_fallback_volume,
            min_volume_confidence: s.min_volume_confidence,
            bulk_concurrency: s.bulk_concurrency,
        }
    }

    pub fn risk_config(&self) -> RiskScorerConfig {
        RiskScorerConfig {
            min_liquidity_sol: self.filters.min_liquidity_sol,
            max_top_holder_pct: self.filters.max_top_holder_pct,
            max_risk_score: self.security.max_risk_score,
            policy: TokenPolicy {
                max_supply: self.filters.max_supply,
                min_holders: self.filters.min_holders,
                require_verified: self.security.require_verified,
                require_renounced: self.security.require_renounced,
                min_token_age_hours: self
                    .security
                    .token_age_validation
                    .then_some(self.filters.min_token_age_hours),
            },
        }
    }

    pub fn gate_config(&self) -> TradeGateConfig {
        TradeGateConfig {
            buy_amount_lamports: self.buy_amount_lamports(),
            slippage_bps: self.trading.slippage_bps,
            min_volume_24h: self.filters.min_volume_24h,
            max_volatility: self.filters.max_volatility,
            max_price_impact_pct: self.filters.max_price_impact_pct,
            sol_price_usd: self.trading.sol_price_usd,
            priority_fee: PriorityFee {
                compute_unit_limit: self.trading.compute_unit_limit,
                micro_lamports_per_cu: self.trading.priority_fee_micro_lamports,
            },
            ..TradeGateConfig::default()
        }
    }

    pub fn rate_limits(&self) -> RateLimitState {
        RateLimitState::new(self.trading.max_trades_per_hour, self.trading.cooldown_seconds)
    }

    pub fn trigger_settings(&self) -> Result<TriggerSettings, ConfigError> {
        let tr = &self.triggers;
        Ok(TriggerSettings {
            template: TriggerConfig {
                take_profit_pct: tr.take_profit_pct,
                stop_loss_pct: tr.stop_loss_pct,
                trailing_stop_pct: tr.trailing_stop_enabled.then_some(tr.trailing_stop_pct),
                max_hold_secs: tr.max_hold_hours * 3_600,
                enabled: tr.enabled,
            },
            exit_order: self.exit_order()?,
        })
    }

    /// `None` unless bundles are enabled
    pub fn jito_config(&self) -> Option<JitoConfig> {
        self.jito.enabled.then(|| {
            JitoConfig::for_region(&self.jito.region)
                .with_tip(self.jito.tip_lamports)
                .with_api_token(self.jito.api_token.clone())
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let t = &self.trading;
        OrchestratorConfig {
            auto_buy: t.auto_buy,
            paper_trading: t.paper_trading,
            buy_delay: Duration::from_secs(t.buy_delay_seconds),
            sell_slippage_bps: t.sell_slippage_bps.unwrap_or(100),
            confirm_attempts: t.confirm_attempts,
            confirm_delay: Duration::from_millis(t.confirm_delay_ms),
            price_poll_interval: Duration::from_millis(t.price_poll_interval_ms),
            drain_timeout: Duration::from_millis(t.drain_timeout_ms),
            jito_tip_lamports: self.jito.enabled.then_some(self.jito.tip_lamports),
            ..OrchestratorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const FULL: &str = r#"
[solana]
rpc_url = "https://rpc.example.com"
commitment = "processed"
keypair_path = "~/.config/solana/sniper.json"

[trading]
auto_buy = true
paper_trading = false
buy_amount_sol = 0.25
slippage_bps = 800
max_trades_per_hour = 3
cooldown_seconds = 120
buy_delay_seconds = 2
confirm_attempts = 20
confirm_delay_ms = 500
drain_timeout_ms = 3000

[filters]
min_volume_24h = 10000.0
max_volatility = 0.5
min_holders = 50
min_token_age_hours = 12

[security]
max_risk_score = 40
require_verified = false
token_age_validation = true

[triggers]
take_profit_pct = 50
stop_loss_pct = 20.5
trailing_stop_enabled = false
exit_order = ["stop_loss", "take_profit", "max_hold"]

[jito]
enabled = true
region = "ams"
tip_lamports = 50000
"#;

    #[test]
    fn test_load_full_config() {
        let file = write(FULL);
        let config = load_config(file.path()).unwrap();

        assert!(config.trading.auto_buy);
        assert_eq!(config.buy_amount_lamports(), 250_000_000);
        assert_eq!(config.trading.slippage_bps, 800);
        assert_eq!(config.filters.min_holders, 50);
        assert_eq!(config.security.max_risk_score, 40);
        assert_eq!(config.triggers.stop_loss_pct, dec!(20.5));
        assert_eq!(
            config.exit_order().unwrap(),
            vec![ExitRule::StopLoss, ExitRule::TakeProfit, ExitRule::MaxHold]
        );
        assert_eq!(config.solana.commitment().unwrap(), CommitmentConfig::processed());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write("");
        let config = load_config(file.path()).unwrap();

        assert!(!config.trading.auto_buy);
        assert!(config.trading.paper_trading);
        assert_eq!(config.buy_amount_lamports(), 100_000_000);
        assert_eq!(config.trading.slippage_bps, 500);
        assert_eq!(config.triggers.take_profit_pct, dec!(30));
        assert_eq!(config.triggers.stop_loss_pct, dec!(15));
        assert_eq!(config.filters.max_volatility, Some(0.3));
        assert_eq!(config.security.max_risk_score, 50);
        assert!(config.jito_config().is_none());
        assert_eq!(config.filters.min_token_age_hours, 24);
        assert_eq!(config.orchestrator_config().drain_timeout, Duration::from_secs(10));
        assert_eq!(config.risk_config().policy.min_token_age_hours, None);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_bad_toml() {
        let file = write("[trading\nauto_buy = true");
        assert!(matches!(load_config(file.path()), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for body in [
            "[trading]\nbuy_amount_sol = 0.0",
            "[trading]\nslippage_bps = 20000",
            "[trading]\nmax_trades_per_hour = 0",
            "[triggers]\nstop_loss_pct = 100",
            "[triggers]\nexit_order = [\"moon\"]",
            "[signals]\nmin_volume_confidence = 1.5",
            "[security]\nmax_risk_score = 101",
            "[jito]\nenabled = true\ntip_lamports = 0",
            "[solana]\ncommitment = \"recent\"",
        ] {
            let file = write(body);
            assert!(
                matches!(load_config(file.path()), Err(ConfigError::ValidationError(_))),
                "{}",
                body
            );
        }
    }

    #[test]
    fn test_domain_conversions() {
        let file = write(FULL);
        let config = load_config(file.path()).unwrap();

        let gate = config.gate_config();
        assert_eq!(gate.buy_amount_lamports, 250_000_000);
        assert_eq!(gate.slippage_bps, 800);
        assert_eq!(gate.max_volatility, Some(0.5));

        let risk = config.risk_config();
        assert_eq!(risk.max_risk_score, 40);
        assert!(!risk.policy.require_verified);
        assert!(risk.policy.require_renounced);
        assert_eq!(risk.policy.min_token_age_hours, Some(12));

        let triggers = config.trigger_settings().unwrap();
        assert_eq!(triggers.template.take_profit_pct, dec!(50));
        assert_eq!(triggers.template.trailing_stop_pct, None);
        assert_eq!(triggers.template.max_hold_secs, 4 * 3_600);

        let jito = config.jito_config().unwrap();
        assert!(jito.block_engine_url.contains("amsterdam"));
        assert_eq!(jito.tip_lamports, 50_000);

        let orchestrator = config.orchestrator_config();
        assert!(orchestrator.auto_buy);
        assert!(!orchestrator.paper_trading);
        assert_eq!(orchestrator.buy_delay, Duration::from_secs(2));
        assert_eq!(orchestrator.sell_slippage_bps, 100);
        assert_eq!(orchestrator.jito_tip_lamports, Some(50_000));
        assert_eq!(orchestrator.confirm_attempts, 20);
        assert_eq!(orchestrator.confirm_delay, Duration::from_millis(500));
        assert_eq!(orchestrator.drain_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_ws_url_derived_from_rpc() {
        let section = SolanaSection {
            rpc_url: "https://rpc.example.com/key".to_string(),
            ..SolanaSection::default()
        };
        if std::env::var("SOLANA_WS_URL").is_err() && std::env::var("SOLANA_RPC_URL").is_err() {
            assert_eq!(section.ws_url(), "wss://rpc.example.com/key");
        }
    }

    #[test]
    fn test_api_key_blank_is_none() {
        let keys = ApiKeysSection {
            birdeye: Some(String::new()),
            rugcheck: Some("rc-key".to_string()),
        };
        if std::env::var("BIRDEYE_API_KEY").is_err() {
            assert_eq!(keys.birdeye(), None);
        }
        if std::env::var("RUGCHECK_API_KEY").is_err() {
            assert_eq!(keys.rugcheck().as_deref(), Some("rc-key"));
        }
    }
}
