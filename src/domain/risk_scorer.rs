//! Risk Scorer
//!
//! Composite 0-100 risk score for a newly detected token. Each check runs on
//! its own and contributes fixed points when it fails:
//!
//! - Mint authority still set: +30
//! - Freeze authority still set: +20
//! - SOL-side pool liquidity below the minimum: +25
//! - Reputation service: +50 when flagged rugged, otherwise up to +30 for a
//!   service score above the maximum
//! - Top holder above the maximum share: +25
//!
//! A check that cannot be completed passes with a warning. A rugged flag is
//! an unconditional fail regardless of the numeric score.
//!
//! Token policy filters (supply, holder count, verification, renounced mint
//! and the optional minimum token age) are reported separately as violations;
//! they do not add points.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::known_programs::WSOL_MINT;
use super::layouts::{AccountLayoutDecoder, MintInfo};
use super::pool::{PoolInfo, PoolVariant};
use crate::ports::chain::ChainTransport;
use crate::ports::reputation::{ReputationProvider, ReputationReport};

pub const MINT_AUTHORITY_POINTS: u32 = 30;
pub const FREEZE_AUTHORITY_POINTS: u32 = 20;
pub const LOW_LIQUIDITY_POINTS: u32 = 25;
pub const RUGGED_POINTS: u32 = 50;
/// Cap on points from a high service score when not rugged
pub const REPUTATION_SCORE_CAP: u32 = 30;
pub const HOLDER_CONCENTRATION_POINTS: u32 = 25;

pub const MAX_RISK_SCORE: u32 = 100;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Which check produced a line of the breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCheckKind {
    MintAuthority,
    FreezeAuthority,
    Liquidity,
    Reputation,
    HolderConcentration,
}

impl RiskCheckKind {
    pub fn label(&self) -> &'static str {
        match self {
            RiskCheckKind::MintAuthority => "mint authority",
            RiskCheckKind::FreezeAuthority => "freeze authority",
            RiskCheckKind::Liquidity => "liquidity",
            RiskCheckKind::Reputation => "reputation",
            RiskCheckKind::HolderConcentration => "holder concentration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed,
    /// Could not be evaluated; counts as a pass
    Unavailable,
}

/// One line of the per-check breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheck {
    pub kind: RiskCheckKind,
    pub outcome: CheckOutcome,
    /// Points added to the score
    pub points: u32,
    pub message: String,
}

impl RiskCheck {
    fn passed(kind: RiskCheckKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: CheckOutcome::Passed,
            points: 0,
            message: message.into(),
        }
    }

    fn failed(kind: RiskCheckKind, points: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: CheckOutcome::Failed,
            points,
            message: message.into(),
        }
    }

    fn unavailable(kind: RiskCheckKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: CheckOutcome::Unavailable,
            points: 0,
            message: message.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome != CheckOutcome::Failed
    }
}

/// Supplementary token filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPolicy {
    /// Maximum supply in whole tokens
    pub max_supply: f64,
    pub min_holders: u64,
    pub require_verified: bool,
    pub require_renounced: bool,
    /// Off when `None`; age comes from the reputation report
    pub min_token_age_hours: Option<u64>,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            max_supply: 1_000_000_000.0,
            min_holders: 100,
            require_verified: true,
            require_renounced: true,
            min_token_age_hours: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskScorerConfig {
    pub min_liquidity_sol: f64,
    pub max_top_holder_pct: f64,
    /// Scores at or above this are unsafe
    pub max_risk_score: u32,
    pub policy: TokenPolicy,
}

impl Default for RiskScorerConfig {
    fn default() -> Self {
        Self {
            min_liquidity_sol: 5.0,
            max_top_holder_pct: 20.0,
            max_risk_score: 50,
            policy: TokenPolicy::default(),
        }
    }
}

/// Result of scoring one token
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub mint: Pubkey,
    /// Always in [0, 100]
    pub score: u32,
    pub is_safe: bool,
    pub rugged: bool,
    pub checks: Vec<RiskCheck>,
    pub warnings: Vec<String>,
    /// Token policy filters that failed
    pub policy_violations: Vec<String>,
    pub liquidity_sol: Option<f64>,
    pub top_holder_pct: Option<f64>,
    pub report: Option<ReputationReport>,
}

impl RiskAssessment {
    /// Build an assessment from a finished breakdown
    pub fn from_checks(mint: Pubkey, checks: Vec<RiskCheck>, rugged: bool, max_risk_score: u32) -> Self {
        let raw: u32 = checks.iter().map(|c| c.points).sum();
        let score = raw.min(MAX_RISK_SCORE);
        let warnings = checks
            .iter()
            .filter(|c| c.outcome == CheckOutcome::Unavailable)
            .map(|c| format!("{} check unavailable: {}", c.kind.label(), c.message))
            .collect();

        Self {
            mint,
            score,
            is_safe: score < max_risk_score && !rugged,
            rugged,
            checks,
            warnings,
            policy_violations: Vec::new(),
            liquidity_sol: None,
            top_holder_pct: None,
            report: None,
        }
    }

    pub fn check(&self, kind: RiskCheckKind) -> Option<&RiskCheck> {
        self.checks.iter().find(|c| c.kind == kind)
    }

    /// Passes the scorer and every policy filter
    pub fn is_acceptable(&self) -> bool {
        self.is_safe && self.policy_violations.is_empty()
    }

    /// Human-readable reason list for a rejection
    pub fn rejection_reason(&self) -> String {
        let mut reasons: Vec<String> = self
            .checks
            .iter()
            .filter(|c| c.outcome == CheckOutcome::Failed)
            .map(|c| c.message.clone())
            .collect();
        if self.rugged && !reasons.iter().any(|r| r.contains("rugged")) {
            reasons.push("token flagged as rugged".to_string());
        }
        reasons.extend(self.policy_violations.iter().cloned());

        if reasons.is_empty() {
            format!("risk score {}", self.score)
        } else {
            format!("risk score {}: {}", self.score, reasons.join("; "))
        }
    }
}

/// Points from a reputation report
pub fn reputation_points(report: &ReputationReport, max_risk_score: u32) -> u32 {
    if report.rugged {
        return RUGGED_POINTS;
    }
    let over = report.score.saturating_sub(i64::from(max_risk_score));
    if over > 0 {
        u32::try_from(over)
            .unwrap_or(u32::MAX)
            .min(REPUTATION_SCORE_CAP)
    } else {
        0
    }
}

/// On-chain and reputation based token scoring
pub struct RiskScorer {
    chain: Arc<dyn ChainTransport>,
    reputation: Option<Arc<dyn ReputationProvider>>,
    decoder: AccountLayoutDecoder,
    config: RiskScorerConfig,
}

impl RiskScorer {
    pub fn new(
        chain: Arc<dyn ChainTransport>,
        reputation: Option<Arc<dyn ReputationProvider>>,
        config: RiskScorerConfig,
    ) -> Self {
        Self {
            chain,
            reputation,
            decoder: AccountLayoutDecoder::new(),
            config,
        }
    }

    pub fn config(&self) -> &RiskScorerConfig {
        &self.config
    }

    /// Score the traded token of `pool`
    pub async fn assess(&self, pool: &PoolInfo) -> RiskAssessment {
        let mint = pool.token_mint();
        let (mint_info, report) = tokio::join!(self.fetch_mint(&mint), self.fetch_report(&mint));
        let (liquidity_check, liquidity_sol) = self.check_liquidity(pool).await;
        let (holder_check, top_holder_pct) = self
            .check_holders(&mint, mint_info.as_ref().ok(), report.as_ref())
            .await;

        let (mint_check, freeze_check) = match &mint_info {
            Ok(info) => (mint_authority_check(info), freeze_authority_check(info)),
            Err(e) => (
                RiskCheck::unavailable(RiskCheckKind::MintAuthority, e.clone()),
                RiskCheck::unavailable(RiskCheckKind::FreezeAuthority, e.clone()),
            ),
        };

        let rugged = report.as_ref().map(|r| r.rugged).unwrap_or(false);
        let reputation_check = match &report {
            Some(r) => self.reputation_check(r),
            None => RiskCheck::unavailable(RiskCheckKind::Reputation, "no reputation report"),
        };

        let checks = vec![mint_check, freeze_check, liquidity_check, reputation_check, holder_check];
        let mut assessment =
            RiskAssessment::from_checks(mint, checks, rugged, self.config.max_risk_score);
        assessment.policy_violations =
            self.policy_violations(mint_info.as_ref().ok(), report.as_ref());
        if let Some(min_hours) = self.config.policy.min_token_age_hours {
            match report.as_ref().and_then(|r| r.age_hours(Utc::now())) {
                Some(age) if age < min_hours as f64 => assessment
                    .policy_violations
                    .push(format!("token too new: {:.1}h (min {}h)", age, min_hours)),
                Some(_) => {}
                None => assessment.warnings.push("token age unavailable".to_string()),
            }
        }
        assessment.liquidity_sol = liquidity_sol;
        assessment.top_holder_pct = top_holder_pct;
        assessment.report = report;

        if assessment.is_safe {
            tracing::info!("Token {} risk score {} (safe)", mint, assessment.score);
        } else {
            tracing::warn!("Token {} risk score {} (unsafe)", mint, assessment.score);
        }
        assessment
    }

    async fn fetch_mint(&self, mint: &Pubkey) -> Result<MintInfo, String> {
        match self.chain.get_account(mint).await {
            Ok(Some(data)) => self.decoder.decode_mint(&data).map_err(|e| e.to_string()),
            Ok(None) => Err("mint account not found".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn fetch_report(&self, mint: &Pubkey) -> Option<ReputationReport> {
        let provider = self.reputation.as_ref()?;
        match provider.get_report(&mint.to_string()).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("Reputation report unavailable for {}: {}", mint, e);
                None
            }
        }
    }

    fn reputation_check(&self, report: &ReputationReport) -> RiskCheck {
        let points = reputation_points(report, self.config.max_risk_score);
        if report.rugged {
            RiskCheck::failed(RiskCheckKind::Reputation, points, "token flagged as rugged")
        } else if points > 0 {
            RiskCheck::failed(
                RiskCheckKind::Reputation,
                points,
                format!(
                    "reputation score {} above {}",
                    report.score, self.config.max_risk_score
                ),
            )
        } else {
            RiskCheck::passed(
                RiskCheckKind::Reputation,
                format!("reputation score {}", report.score),
            )
        }
    }

    /// SOL held by the pool's WSOL vault
    async fn check_liquidity(&self, pool: &PoolInfo) -> (RiskCheck, Option<f64>) {
        let kind = RiskCheckKind::Liquidity;
        let vault = match self.sol_vault(pool).await {
            Ok(v) => v,
            Err(reason) => return (RiskCheck::unavailable(kind, reason), None),
        };

        match self.chain.get_token_balance(&vault).await {
            Ok(lamports) => {
                let sol = lamports as f64 / LAMPORTS_PER_SOL;
                let check = if sol < self.config.min_liquidity_sol {
                    RiskCheck::failed(
                        kind,
                        LOW_LIQUIDITY_POINTS,
                        format!(
                            "low liquidity: {:.2} SOL (min {} SOL)",
                            sol, self.config.min_liquidity_sol
                        ),
                    )
                } else {
                    RiskCheck::passed(kind, format!("liquidity {:.2} SOL", sol))
                };
                (check, Some(sol))
            }
            Err(e) => (RiskCheck::unavailable(kind, e.to_string()), None),
        }
    }

    async fn sol_vault(&self, pool: &PoolInfo) -> Result<Pubkey, String> {
        if !pool.is_sol_pair() {
            return Err("pair has no SOL side".to_string());
        }
        let from_info = if pool.base_mint == WSOL_MINT {
            pool.base_vault
        } else {
            pool.quote_vault
        };
        if let Some(vault) = from_info {
            return Ok(vault);
        }

        let address = pool.pool_address.ok_or("pool address unknown")?;
        let data = self
            .chain
            .get_account(&address)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("pool account not found")?;

        let (base_mint, base_vault, quote_vault) = match pool.variant {
            PoolVariant::AmmV4 => {
                let s = self.decoder.decode_amm(&data).map_err(|e| e.to_string())?;
                (s.base_mint, s.base_vault, s.quote_vault)
            }
            PoolVariant::CpSwap => {
                let s = self.decoder.decode_cp_swap(&data).map_err(|e| e.to_string())?;
                (s.token_0_mint, s.token_0_vault, s.token_1_vault)
            }
            PoolVariant::Unknown => return Err("unknown pool variant".to_string()),
        };
        Ok(if base_mint == WSOL_MINT { base_vault } else { quote_vault })
    }

    async fn check_holders(
        &self,
        mint: &Pubkey,
        mint_info: Option<&MintInfo>,
        report: Option<&ReputationReport>,
    ) -> (RiskCheck, Option<f64>) {
        let kind = RiskCheckKind::HolderConcentration;

        let pct = match report.and_then(|r| r.top_holder_pct()) {
            Some(p) => Some(p),
            None => match self.chain.get_largest_token_accounts(mint).await {
                Ok(amounts) => top_share(&amounts, mint_info.map(|m| m.supply)),
                Err(e) => {
                    tracing::debug!("Largest accounts unavailable for {}: {}", mint, e);
                    None
                }
            },
        };

        let Some(pct) = pct else {
            return (RiskCheck::unavailable(kind, "top holder data unavailable"), None);
        };
        let check = if pct > self.config.max_top_holder_pct {
            RiskCheck::failed(
                kind,
                HOLDER_CONCENTRATION_POINTS,
                format!(
                    "top holder has {:.1}% (max {:.1}%)",
                    pct, self.config.max_top_holder_pct
                ),
            )
        } else {
            RiskCheck::passed(kind, format!("top holder {:.1}%", pct))
        };
        (check, Some(pct))
    }

    fn policy_violations(
        &self,
        mint_info: Option<&MintInfo>,
        report: Option<&ReputationReport>,
    ) -> Vec<String> {
        let policy = &self.config.policy;
        let mut violations = Vec::new();

        if let Some(info) = mint_info {
            let supply = info.ui_supply();
            if supply > policy.max_supply {
                violations.push(format!(
                    "supply too high: {:.0} > {:.0}",
                    supply, policy.max_supply
                ));
            }
            if policy.require_renounced && info.mint_authority.is_some() {
                violations.push("mint authority not renounced".to_string());
            }
        }

        if let Some(report) = report {
            if let Some(holders) = report.holder_count {
                if holders < policy.min_holders {
                    violations.push(format!(
                        "only {} holders (min {})",
                        holders, policy.min_holders
                    ));
                }
            }
            if policy.require_verified && !report.verified {
                violations.push("token not verified".to_string());
            }
        }

        violations
    }
}

fn mint_authority_check(info: &MintInfo) -> RiskCheck {
    match info.mint_authority {
        Some(authority) => RiskCheck::failed(
            RiskCheckKind::MintAuthority,
            MINT_AUTHORITY_POINTS,
            format!("mint authority active: {}", authority),
        ),
        None => RiskCheck::passed(RiskCheckKind::MintAuthority, "mint authority revoked"),
    }
}

fn freeze_authority_check(info: &MintInfo) -> RiskCheck {
    match info.freeze_authority {
        Some(authority) => RiskCheck::failed(
            RiskCheckKind::FreezeAuthority,
            FREEZE_AUTHORITY_POINTS,
            format!("freeze authority active: {}", authority),
        ),
        None => RiskCheck::passed(RiskCheckKind::FreezeAuthority, "freeze authority revoked"),
    }
}

/// Largest holder's share in percent, against supply when known
fn top_share(amounts: &[u64], supply: Option<u64>) -> Option<f64> {
    let top = *amounts.first()?;
    let denominator = match supply {
        Some(s) if s > 0 => s as f64,
        _ => amounts.iter().map(|a| *a as f64).sum(),
    };
    if denominator <= 0.0 {
        return None;
    }
    Some(top as f64 / denominator * 100.0)
}
