//! Trade Gate
//!
//! Ordered, short-circuiting buy approval. Cheap local checks run first:
//!
//! 1. Hourly rate limit
//! 2. Per-token cooldown
//! 3. Token/WSOL pair (buy amounts and liquidity are priced in SOL)
//! 4. Minimum 24h volume (confidence-aware)
//! 5. Volatility ceiling (optional)
//! 6. Price impact against pool liquidity (optional)
//! 7. Risk score and token policy
//!
//! An approved pool then has its swap keys resolved on-chain, the expected
//! output read from vault reserves, and the buy instructions built.
//! Every failure becomes a `Rejection`; nothing escapes the gate.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use thiserror::Error;
use tokio::sync::Mutex;

use super::known_programs::WSOL_MINT;
use super::layouts::{AccountLayoutDecoder, DecodeError};
use super::pool::{PoolInfo, PoolVariant, SwapPoolKeys};
use super::rate_limit::{RateLimitError, RateLimitState};
use super::risk_scorer::{RiskAssessment, RiskScorer};
use super::signal_aggregator::{SignalAggregator, VolumeAssessment};
use super::swap::{
    constant_product_out, min_amount_out, swap_transaction_instructions, PriorityFee,
    SwapBuildError, SwapRequest, DEFAULT_POOL_FEE_BPS,
};
use crate::ports::chain::{ChainTransport, TransportError};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Gate stage that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCheck {
    RateLimit,
    Cooldown,
    Pair,
    Volume,
    Volatility,
    Liquidity,
    Risk,
    PoolKeys,
    Build,
}

impl GateCheck {
    pub fn label(&self) -> &'static str {
        match self {
            GateCheck::RateLimit => "rate_limit",
            GateCheck::Cooldown => "cooldown",
            GateCheck::Pair => "pair",
            GateCheck::Volume => "volume",
            GateCheck::Volatility => "volatility",
            GateCheck::Liquidity => "liquidity",
            GateCheck::Risk => "risk",
            GateCheck::PoolKeys => "pool_keys",
            GateCheck::Build => "build",
        }
    }

    /// Rejections from the risk stage count as security skips
    pub fn is_security(&self) -> bool {
        matches!(self, GateCheck::Risk)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub check: GateCheck,
    pub reason: String,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.check.label(), self.reason)
    }
}

/// Everything needed to submit and then track a buy
#[derive(Debug, Clone)]
pub struct BuyPlan {
    pub pool: PoolInfo,
    pub keys: SwapPoolKeys,
    pub token_mint: Pubkey,
    pub payment_mint: Pubkey,
    pub amount_in: u64,
    pub expected_out: u64,
    pub min_amount_out: u64,
    /// Token price in the payment mint at decision time
    pub entry_price: Option<Decimal>,
    pub instructions: Vec<Instruction>,
    pub volume: VolumeAssessment,
    pub assessment: RiskAssessment,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum GateDecision {
    Approved(Box<BuyPlan>),
    Rejected(Rejection),
}

impl GateDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, GateDecision::Approved(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            GateDecision::Rejected(r) => Some(r),
            GateDecision::Approved(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum GateError {
    #[error("Pool account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("Pool has no on-chain address")]
    NoPoolAddress,

    #[error("Unsupported pool variant: {0}")]
    UnsupportedVariant(PoolVariant),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Instruction build failed: {0}")]
    Build(#[from] SwapBuildError),

    #[error("Pool has no usable reserves")]
    EmptyReserves,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeGateConfig {
    pub buy_amount_lamports: u64,
    pub slippage_bps: u16,
    pub min_volume_24h: f64,
    /// Reject above this volatility; `None` disables the check
    pub max_volatility: Option<f64>,
    /// Reject above this price impact percent; `None` disables the check
    pub max_price_impact_pct: Option<f64>,
    /// Converts the buy amount to USD for the impact estimate
    pub sol_price_usd: f64,
    pub pool_fee_bps: u64,
    pub priority_fee: PriorityFee,
}

impl Default for TradeGateConfig {
    fn default() -> Self {
        Self {
            buy_amount_lamports: 100_000_000,
            slippage_bps: 500,
            min_volume_24h: 5_000.0,
            max_volatility: None,
            max_price_impact_pct: Some(5.0),
            sol_price_usd: 150.0,
            pool_fee_bps: DEFAULT_POOL_FEE_BPS,
            priority_fee: PriorityFee::default(),
        }
    }
}

/// Token price in the counter mint from raw vault reserves
pub fn token_price(keys: &SwapPoolKeys, token_mint: &Pubkey, base_reserve: u64, quote_reserve: u64) -> Option<Decimal> {
    let base = Decimal::from_i128_with_scale(base_reserve as i128, keys.base_decimals() as u32);
    let quote = Decimal::from_i128_with_scale(quote_reserve as i128, keys.quote_decimals() as u32);
    if base.is_zero() || quote.is_zero() {
        return None;
    }
    if *token_mint == keys.base_mint() {
        quote.checked_div(base)
    } else if *token_mint == keys.quote_mint() {
        base.checked_div(quote)
    } else {
        None
    }
}

pub struct TradeGate {
    chain: Arc<dyn ChainTransport>,
    aggregator: SignalAggregator,
    scorer: RiskScorer,
    rate_limits: Arc<Mutex<RateLimitState>>,
    decoder: AccountLayoutDecoder,
    config: TradeGateConfig,
}

impl TradeGate {
    pub fn new(
        chain: Arc<dyn ChainTransport>,
        aggregator: SignalAggregator,
        scorer: RiskScorer,
        rate_limits: RateLimitState,
        config: TradeGateConfig,
    ) -> Self {
        Self {
            chain,
            aggregator,
            scorer,
            rate_limits: Arc::new(Mutex::new(rate_limits)),
            decoder: AccountLayoutDecoder::new(),
            config,
        }
    }

    pub fn config(&self) -> &TradeGateConfig {
        &self.config
    }

    pub fn rate_limits(&self) -> Arc<Mutex<RateLimitState>> {
        Arc::clone(&self.rate_limits)
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    /// Run every check for `pool` and, if all pass, plan the buy for `owner`
    pub async fn evaluate(&self, pool: &PoolInfo, owner: &Pubkey, now: u64) -> GateDecision {
        let token = pool.token_mint();
        let token_str = token.to_string();
        let mut warnings = Vec::new();

        if let Err(rejection) = self.check_local(&token_str, now).await {
            return GateDecision::Rejected(rejection);
        }

        if pool.payment_mint() != WSOL_MINT {
            return reject(
                GateCheck::Pair,
                format!(
                    "{}/{} is not a WSOL pair",
                    pool.base_mint, pool.quote_mint
                ),
            );
        }

        let volume = self.aggregator.volume_with_floor(&token_str).await;
        warnings.extend(volume.signal.warnings.iter().cloned());
        if volume.volume < self.config.min_volume_24h {
            return reject(
                GateCheck::Volume,
                format!(
                    "24h volume ${:.0} below ${:.0} ({}, confidence {:.2})",
                    volume.volume,
                    self.config.min_volume_24h,
                    volume.signal.method.as_str(),
                    volume.signal.confidence
                ),
            );
        }

        if let Some(max) = self.config.max_volatility {
            match self.aggregator.volatility(&token_str).await {
                Some(v) if v > max => {
                    return reject(
                        GateCheck::Volatility,
                        format!("volatility {:.3} above {:.3}", v, max),
                    );
                }
                Some(_) => {}
                None => warnings.push("volatility unavailable".to_string()),
            }
        }

        if let Some(max_impact) = self.config.max_price_impact_pct {
            let trade_usd =
                self.config.buy_amount_lamports as f64 / LAMPORTS_PER_SOL * self.config.sol_price_usd;
            let analysis = self
                .aggregator
                .liquidity_analysis(&token_str, trade_usd, max_impact)
                .await;
            if !analysis.can_trade {
                return reject(GateCheck::Liquidity, analysis.reason);
            }
        }

        let assessment = self.scorer.assess(pool).await;
        warnings.extend(assessment.warnings.iter().cloned());
        if !assessment.is_acceptable() {
            return reject(GateCheck::Risk, assessment.rejection_reason());
        }

        let keys = match self.resolve_keys(pool).await {
            Ok(k) => k,
            Err(e) => return reject(GateCheck::PoolKeys, e.to_string()),
        };
        if keys.vault_for(&WSOL_MINT).is_none() {
            return reject(
                GateCheck::Pair,
                format!("pool {} has no WSOL side on-chain", keys.pool_id()),
            );
        }

        let payment = pool.payment_mint();
        let planned = self
            .plan_swap(&keys, owner, &payment, &token, self.config.buy_amount_lamports, self.config.slippage_bps)
            .await;
        let (expected_out, min_out, instructions, (base_reserve, quote_reserve)) = match planned {
            Ok(p) => p,
            Err(e) => return reject(GateCheck::Build, e.to_string()),
        };

        tracing::info!(
            "Gate approved {}: in {} lamports, expected {} (min {})",
            token,
            self.config.buy_amount_lamports,
            expected_out,
            min_out
        );

        GateDecision::Approved(Box::new(BuyPlan {
            pool: pool.clone(),
            entry_price: token_price(&keys, &token, base_reserve, quote_reserve),
            keys,
            token_mint: token,
            payment_mint: payment,
            amount_in: self.config.buy_amount_lamports,
            expected_out,
            min_amount_out: min_out,
            instructions,
            volume,
            assessment,
            warnings,
        }))
    }

    /// Rate limit and cooldown only; also evicts expired entries
    pub async fn check_local(&self, token: &str, now: u64) -> Result<(), Rejection> {
        let mut limits = self.rate_limits.lock().await;
        limits.evict_expired(now);
        limits.check(token, now).map_err(|e| Rejection {
            check: match e {
                RateLimitError::HourlyLimit { .. } => GateCheck::RateLimit,
                RateLimitError::Cooldown { .. } => GateCheck::Cooldown,
            },
            reason: e.to_string(),
        })
    }

    pub async fn record_trade(&self, now: u64) {
        self.rate_limits.lock().await.record_trade(now);
    }

    pub async fn start_cooldown(&self, token: &str, now: u64) {
        self.rate_limits.lock().await.start_cooldown(token, now);
    }

    /// Fetch and decode the accounts needed to swap against `pool`
    pub async fn resolve_keys(&self, pool: &PoolInfo) -> Result<SwapPoolKeys, GateError> {
        let address = pool.pool_address.ok_or(GateError::NoPoolAddress)?;
        let data = self.fetch(&address).await?;

        match pool.variant {
            PoolVariant::AmmV4 => {
                let amm = self.decoder.decode_amm(&data)?;
                let market_id = amm
                    .market_id
                    .or(pool.market_id)
                    .ok_or(GateError::Decode(DecodeError::Inconsistent {
                        layout: "amm_v4",
                        reason: "market id unknown".to_string(),
                    }))?;
                let market = self.fetch(&market_id).await?;
                Ok(self.decoder.amm_v4_keys(address, &data, &market)?)
            }
            PoolVariant::CpSwap => Ok(self.decoder.cp_swap_keys(address, &data)?),
            PoolVariant::Unknown => Err(GateError::UnsupportedVariant(pool.variant)),
        }
    }

    /// Raw (base, quote) vault balances
    pub async fn reserves(&self, keys: &SwapPoolKeys) -> Result<(u64, u64), GateError> {
        let (base_vault, quote_vault) = (keys.base_vault(), keys.quote_vault());
        let (base, quote) = tokio::try_join!(
            self.chain.get_token_balance(&base_vault),
            self.chain.get_token_balance(&quote_vault),
        )?;
        Ok((base, quote))
    }

    /// Exit instructions selling `amount` of `token` back to the payment mint
    pub async fn plan_sell(
        &self,
        keys: &SwapPoolKeys,
        owner: &Pubkey,
        token: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Vec<Instruction>, GateError> {
        let payment = if *token == keys.base_mint() {
            keys.quote_mint()
        } else {
            keys.base_mint()
        };
        let (_, _, instructions, _) = self
            .plan_swap(keys, owner, token, &payment, amount, slippage_bps)
            .await?;
        Ok(instructions)
    }

    async fn plan_swap(
        &self,
        keys: &SwapPoolKeys,
        owner: &Pubkey,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_in: u64,
        slippage_bps: u16,
    ) -> Result<(u64, u64, Vec<Instruction>, (u64, u64)), GateError> {
        let (base_reserve, quote_reserve) = self.reserves(keys).await?;
        let (reserve_in, reserve_out) = if *input_mint == keys.base_mint() {
            (base_reserve, quote_reserve)
        } else {
            (quote_reserve, base_reserve)
        };

        let expected = constant_product_out(amount_in, reserve_in, reserve_out, self.config.pool_fee_bps);
        if expected == 0 {
            return Err(GateError::EmptyReserves);
        }
        let min_out = min_amount_out(expected, slippage_bps)?;

        let request = SwapRequest {
            owner: *owner,
            input_mint: *input_mint,
            output_mint: *output_mint,
            amount_in,
            min_amount_out: min_out,
        };
        let instructions = swap_transaction_instructions(keys, &request, &self.config.priority_fee)?;
        Ok((expected, min_out, instructions, (base_reserve, quote_reserve)))
    }

    async fn fetch(&self, address: &Pubkey) -> Result<Vec<u8>, GateError> {
        self.chain
            .get_account(address)
            .await?
            .ok_or(GateError::AccountNotFound(*address))
    }
}

fn reject(check: GateCheck, reason: String) -> GateDecision {
    tracing::info!("Gate rejected [{}]: {}", check.label(), reason);
    GateDecision::Rejected(Rejection { check, reason })
}
