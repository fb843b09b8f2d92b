//! RugCheck report wire format

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ports::reputation::{HolderShare, ReportedRisk, ReputationLevel, ReputationReport};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawReport {
    pub mint: String,
    pub score: Option<i64>,
    pub risk_level: Option<String>,
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
    pub top_holders: Vec<RawHolder>,
    pub total_holders: Option<u64>,
    pub total_liquidity_usd: Option<f64>,
    pub lp_locked_pct: Option<f64>,
    pub risks: Vec<RawRisk>,
    pub verified: bool,
    pub rugged: bool,
    pub token_meta: Option<RawTokenMeta>,
    /// RFC 3339 timestamp
    pub detected_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawHolder {
    pub address: String,
    pub pct: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRisk {
    pub name: String,
    pub description: String,
    pub score: i64,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTokenMeta {
    pub symbol: String,
    pub name: String,
}

/// Unknown score counts as maximally risky
const MISSING_SCORE: i64 = 100;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl RawReport {
    pub fn into_report(self, requested_mint: &str) -> ReputationReport {
        let mint = if self.mint.is_empty() {
            requested_mint.to_string()
        } else {
            self.mint
        };

        let mut top_holders: Vec<HolderShare> = self
            .top_holders
            .into_iter()
            .map(|h| HolderShare {
                address: h.address,
                pct: h.pct,
            })
            .collect();
        top_holders.sort_by(|a, b| b.pct.total_cmp(&a.pct));

        ReputationReport {
            mint,
            score: self.score.unwrap_or(MISSING_SCORE),
            level: self
                .risk_level
                .as_deref()
                .map(ReputationLevel::parse)
                .unwrap_or(ReputationLevel::Unknown),
            rugged: self.rugged,
            verified: self.verified,
            mint_authority: non_empty(self.mint_authority),
            freeze_authority: non_empty(self.freeze_authority),
            top_holders,
            holder_count: self.total_holders,
            total_liquidity_usd: self.total_liquidity_usd,
            lp_locked_pct: self.lp_locked_pct,
            risks: self
                .risks
                .into_iter()
                .map(|r| ReportedRisk {
                    name: r.name,
                    description: r.description,
                    score: r.score,
                    level: r.level,
                })
                .collect(),
            symbol: self.token_meta.map(|m| m.symbol).filter(|s| !s.is_empty()),
            created_at: self
                .detected_at
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_report() {
        let json = r#"{
            "mint": "TokenMint111",
            "score": 420,
            "riskLevel": "warn",
            "mintAuthority": "",
            "freezeAuthority": "Freezer111",
            "topHolders": [
                {"address": "small", "pct": 3.5, "amount": 10},
                {"address": "whale", "pct": 41.2, "amount": 99}
            ],
            "totalHolders": 812,
            "totalLiquidityUsd": 15000.5,
            "lpLockedPct": 100.0,
            "risks": [{"name": "Freeze Authority still enabled", "description": "d", "score": 400, "level": "danger"}],
            "verified": false,
            "rugged": false,
            "tokenMeta": {"symbol": "PEPE2", "name": "Pepe Two"},
            "detectedAt": "2025-03-01T12:00:00Z"
        }"#;
        let raw: RawReport = serde_json::from_str(json).unwrap();
        let report = raw.into_report("ignored");

        assert_eq!(report.mint, "TokenMint111");
        assert_eq!(report.score, 420);
        assert_eq!(report.level, ReputationLevel::Caution);
        assert!(report.has_renounced_mint());
        assert_eq!(report.freeze_authority.as_deref(), Some("Freezer111"));
        assert_eq!(report.top_holder_pct(), Some(41.2));
        assert_eq!(report.holder_count, Some(812));
        assert_eq!(report.risks.len(), 1);
        assert_eq!(report.symbol.as_deref(), Some("PEPE2"));
        assert_eq!(
            report.created_at.map(|t| t.to_rfc3339()).as_deref(),
            Some("2025-03-01T12:00:00+00:00")
        );
    }

    #[test]
    fn test_sparse_report_defaults() {
        let raw: RawReport = serde_json::from_str("{}").unwrap();
        let report = raw.into_report("Requested111");
        assert_eq!(report.mint, "Requested111");
        assert_eq!(report.score, 100);
        assert_eq!(report.level, ReputationLevel::Unknown);
        assert!(!report.rugged);
        assert!(report.top_holders.is_empty());
        assert_eq!(report.created_at, None);
    }

    #[test]
    fn test_malformed_detection_time_ignored() {
        let raw: RawReport = serde_json::from_str(r#"{"detectedAt": "yesterday"}"#).unwrap();
        assert_eq!(raw.into_report("m").created_at, None);
    }
}
