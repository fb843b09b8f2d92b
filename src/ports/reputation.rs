//! Reputation Port
//!
//! External token-report service (rug flags, authority state, holders).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ReputationError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned status {0}")]
    Status(u16),

    #[error("Rate limited after {0} attempts")]
    RateLimited(u32),

    #[error("Report parsing error: {0}")]
    Parse(String),

    #[error("Token not found: {0}")]
    NotFound(String),
}

/// Coarse risk level reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationLevel {
    Good,
    Caution,
    Danger,
    Unknown,
}

impl ReputationLevel {
    /// Map the service's free-form level string
    pub fn parse(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "good" => ReputationLevel::Good,
            "caution" | "warn" | "warning" => ReputationLevel::Caution,
            "danger" | "high" => ReputationLevel::Danger,
            _ => ReputationLevel::Unknown,
        }
    }
}

/// Share of supply held by one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderShare {
    pub address: String,
    pub pct: f64,
}

/// One named risk item from the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedRisk {
    pub name: String,
    pub description: String,
    pub score: i64,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationReport {
    pub mint: String,
    /// Service score, higher is riskier
    pub score: i64,
    pub level: ReputationLevel,
    pub rugged: bool,
    pub verified: bool,
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
    /// Largest holders first
    pub top_holders: Vec<HolderShare>,
    pub holder_count: Option<u64>,
    pub total_liquidity_usd: Option<f64>,
    pub lp_locked_pct: Option<f64>,
    pub risks: Vec<ReportedRisk>,
    pub symbol: Option<String>,
    /// When the service first saw the mint
    pub created_at: Option<DateTime<Utc>>,
}

impl ReputationReport {
    /// Minimal report, used by tests and as a base for builders
    pub fn new(mint: impl Into<String>, score: i64) -> Self {
        Self {
            mint: mint.into(),
            score,
            level: ReputationLevel::Unknown,
            rugged: false,
            verified: false,
            mint_authority: None,
            freeze_authority: None,
            top_holders: Vec::new(),
            holder_count: None,
            total_liquidity_usd: None,
            lp_locked_pct: None,
            risks: Vec::new(),
            symbol: None,
            created_at: None,
        }
    }

    pub fn top_holder_pct(&self) -> Option<f64> {
        self.top_holders.first().map(|h| h.pct)
    }

    pub fn has_renounced_mint(&self) -> bool {
        self.mint_authority.is_none()
    }

    /// Hours since `created_at`, if known
    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        self.created_at
            .map(|created| (now - created).num_seconds() as f64 / 3_600.0)
    }
}

#[async_trait]
pub trait ReputationProvider: Send + Sync {
    async fn get_report(&self, mint: &str) -> Result<ReputationReport, ReputationError>;
}
