//! Pool Extraction
//!
//! Turns a positively classified transaction into a `PoolInfo` by walking an
//! ordered chain of strategies. Each strategy returns `None` when its input is
//! absent or does not decode, and the next one is tried:
//!
//! 1. `ray_log` init payload, long layout
//! 2. `ray_log` init payload, short layout
//! 3. initialize2 instruction account list (needs the fetched transaction)
//! 4. base58 address scan over raw log text (pool address unknown)

use regex::Regex;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use super::known_programs::is_denylisted;
use super::layouts::{AccountLayoutDecoder, RayLogInit};
use super::log_classifier::RAY_LOG_MARKER;
use super::pool::{ExtractionSource, PoolInfo, PoolVariant};

/// Minimum accounts an initialize2 instruction carries
pub const INITIALIZE2_MIN_ACCOUNTS: usize = 18;

/// Account positions inside the initialize2 instruction
pub mod initialize2 {
    pub const AMM: usize = 3;
    pub const AMM_AUTHORITY: usize = 4;
    pub const OPEN_ORDERS: usize = 5;
    pub const LP_MINT: usize = 6;
    pub const COIN_MINT: usize = 7;
    pub const PC_MINT: usize = 8;
    pub const COIN_VAULT: usize = 9;
    pub const PC_VAULT: usize = 10;
    pub const TARGET_ORDERS: usize = 11;
    pub const MARKET: usize = 12;
    pub const MARKET_PROGRAM: usize = 13;
}

/// Base58 token of plausible pubkey length
const ADDRESS_PATTERN: &str = r"\b[1-9A-HJ-NP-Za-km-z]{32,44}\b";

/// Everything a strategy may look at for one transaction
#[derive(Debug, Clone)]
pub struct ExtractionContext<'a> {
    pub signature: &'a str,
    pub logs: &'a [String],
    pub variant: PoolVariant,
    pub init_log: Option<&'a [u8]>,
    pub instruction_accounts: Option<&'a [Pubkey]>,
    pub detected_at: u64,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(signature: &'a str, logs: &'a [String], variant: PoolVariant, detected_at: u64) -> Self {
        Self {
            signature,
            logs,
            variant,
            init_log: None,
            instruction_accounts: None,
            detected_at,
        }
    }

    pub fn with_init_log(mut self, init_log: Option<&'a [u8]>) -> Self {
        self.init_log = init_log;
        self
    }

    pub fn with_accounts(mut self, accounts: Option<&'a [Pubkey]>) -> Self {
        self.instruction_accounts = accounts;
        self
    }

    fn pool(&self, source: ExtractionSource, base_mint: Pubkey, quote_mint: Pubkey) -> PoolInfo {
        PoolInfo {
            signature: self.signature.to_string(),
            pool_address: None,
            base_mint,
            quote_mint,
            base_vault: None,
            quote_vault: None,
            lp_mint: None,
            open_orders: None,
            market_id: None,
            variant: self.variant,
            source,
            detected_at: self.detected_at,
        }
    }

    fn pool_from_ray_log(&self, source: ExtractionSource, init: RayLogInit) -> PoolInfo {
        PoolInfo {
            pool_address: Some(init.amm_id),
            lp_mint: init.lp_mint,
            market_id: init.market,
            ..self.pool(source, init.coin_mint, init.pc_mint)
        }
    }
}

/// One link in the fallback chain
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// True if this strategy reads the instruction account list
    fn requires_accounts(&self) -> bool {
        false
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<PoolInfo>;
}

/// `ray_log` init payload, long layout
#[derive(Debug, Default)]
pub struct RayLogV1Strategy {
    decoder: AccountLayoutDecoder,
}

impl ExtractionStrategy for RayLogV1Strategy {
    fn name(&self) -> &'static str {
        "ray_log_v1"
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<PoolInfo> {
        let data = ctx.init_log?;
        let init = self.decoder.decode_ray_log_v1(data).ok()?;
        Some(ctx.pool_from_ray_log(ExtractionSource::RayLogV1, init))
    }
}

/// `ray_log` init payload, short layout
#[derive(Debug, Default)]
pub struct RayLogV2Strategy {
    decoder: AccountLayoutDecoder,
}

impl ExtractionStrategy for RayLogV2Strategy {
    fn name(&self) -> &'static str {
        "ray_log_v2"
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<PoolInfo> {
        let data = ctx.init_log?;
        let init = self.decoder.decode_ray_log_v2(data).ok()?;
        Some(ctx.pool_from_ray_log(ExtractionSource::RayLogV2, init))
    }
}

/// AMM V4 initialize2 instruction accounts
#[derive(Debug, Default)]
pub struct Initialize2AccountsStrategy;

impl ExtractionStrategy for Initialize2AccountsStrategy {
    fn name(&self) -> &'static str {
        "initialize2_accounts"
    }

    fn requires_accounts(&self) -> bool {
        true
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<PoolInfo> {
        if ctx.variant != PoolVariant::AmmV4 {
            return None;
        }
        let accounts = ctx.instruction_accounts?;
        if accounts.len() < INITIALIZE2_MIN_ACCOUNTS {
            tracing::warn!(
                "Not enough accounts for initialize2: {} (need {})",
                accounts.len(),
                INITIALIZE2_MIN_ACCOUNTS
            );
            return None;
        }

        let base_mint = accounts[initialize2::COIN_MINT];
        let quote_mint = accounts[initialize2::PC_MINT];
        if base_mint == quote_mint {
            return None;
        }

        Some(PoolInfo {
            pool_address: Some(accounts[initialize2::AMM]),
            base_vault: Some(accounts[initialize2::COIN_VAULT]),
            quote_vault: Some(accounts[initialize2::PC_VAULT]),
            lp_mint: Some(accounts[initialize2::LP_MINT]),
            open_orders: Some(accounts[initialize2::OPEN_ORDERS]),
            market_id: Some(accounts[initialize2::MARKET]),
            ..ctx.pool(ExtractionSource::Initialize2Accounts, base_mint, quote_mint)
        })
    }
}

/// Last resort: pick the first two non-system addresses out of the log text
#[derive(Debug)]
pub struct AddressScanStrategy {
    pattern: Regex,
}

impl Default for AddressScanStrategy {
    fn default() -> Self {
        Self {
            pattern: Regex::new(ADDRESS_PATTERN).expect("address pattern is a valid regex"),
        }
    }
}

impl AddressScanStrategy {
    /// Candidate addresses in order of appearance, de-duplicated
    pub fn candidates(&self, logs: &[String]) -> Vec<Pubkey> {
        let mut found: Vec<Pubkey> = Vec::new();
        for line in logs.iter().filter(|l| !is_payload_line(l)) {
            for m in self.pattern.find_iter(line) {
                if is_denylisted(m.as_str()) {
                    continue;
                }
                if let Ok(key) = Pubkey::from_str(m.as_str()) {
                    if !found.contains(&key) {
                        found.push(key);
                    }
                }
            }
        }
        found
    }
}

impl ExtractionStrategy for AddressScanStrategy {
    fn name(&self) -> &'static str {
        "address_scan"
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<PoolInfo> {
        let candidates = self.candidates(ctx.logs);
        if candidates.len() < 2 {
            return None;
        }
        Some(ctx.pool(ExtractionSource::AddressScan, candidates[0], candidates[1]))
    }
}

/// Base64 payload lines can contain base58-looking runs
fn is_payload_line(line: &str) -> bool {
    line.contains(RAY_LOG_MARKER) || line.starts_with("Program data:")
}

/// Ordered fallback chain
pub struct PoolExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for PoolExtractor {
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(RayLogV1Strategy::default()),
            Box::new(RayLogV2Strategy::default()),
            Box::new(Initialize2AccountsStrategy),
            Box::new(AddressScanStrategy::default()),
        ])
    }
}

impl PoolExtractor {
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain; the first strategy that yields a pool wins
    pub fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<PoolInfo> {
        for strategy in &self.strategies {
            if let Some(pool) = strategy.extract(ctx) {
                tracing::debug!("Pool extracted via {} for {}", strategy.name(), ctx.signature);
                return Some(pool);
            }
        }
        tracing::debug!("No extraction strategy matched {}", ctx.signature);
        None
    }

    /// True when the chain would reach an account-reading strategy without a
    /// result and the accounts have not been supplied yet.
    pub fn needs_accounts(&self, ctx: &ExtractionContext<'_>) -> bool {
        for strategy in &self.strategies {
            if strategy.requires_accounts() {
                return ctx.instruction_accounts.is_none();
            }
            if strategy.extract(ctx).is_some() {
                return false;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::known_programs::WSOL_MINT;
    use crate::domain::layouts::fixtures::{ray_log_v1, ray_log_v2};

    fn ctx<'a>(logs: &'a [String]) -> ExtractionContext<'a> {
        ExtractionContext::new("sig1", logs, PoolVariant::AmmV4, 1_700_000_000)
    }

    #[test]
    fn test_ray_log_v1_wins_first() {
        let (market, amm, lp, coin) = (
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
        );
        let data = ray_log_v1(&market, &amm, &lp, &coin, &WSOL_MINT);
        let logs: Vec<String> = vec![];
        let pool = PoolExtractor::default()
            .extract(&ctx(&logs).with_init_log(Some(&data)))
            .unwrap();

        assert_eq!(pool.source, ExtractionSource::RayLogV1);
        assert_eq!(pool.pool_address, Some(amm));
        assert_eq!(pool.market_id, Some(market));
        assert_eq!(pool.token_mint(), coin);
        assert_eq!(pool.detected_at, 1_700_000_000);
    }

    #[test]
    fn test_short_payload_falls_to_v2() {
        let (amm, coin) = (Pubkey::new_unique(), Pubkey::new_unique());
        let data = ray_log_v2(&amm, &coin, &WSOL_MINT);
        let logs: Vec<String> = vec![];
        let pool = PoolExtractor::default()
            .extract(&ctx(&logs).with_init_log(Some(&data)))
            .unwrap();

        assert_eq!(pool.source, ExtractionSource::RayLogV2);
        assert_eq!(pool.pool_address, Some(amm));
    }

    #[test]
    fn test_initialize2_accounts() {
        let accounts: Vec<Pubkey> = (0..18).map(|_| Pubkey::new_unique()).collect();
        let logs: Vec<String> = vec![];
        let extractor = PoolExtractor::default();
        let base = ctx(&logs);

        assert!(extractor.needs_accounts(&base));

        let with_accounts = base.with_accounts(Some(&accounts));
        assert!(!extractor.needs_accounts(&with_accounts));
        let pool = extractor.extract(&with_accounts).unwrap();
        assert_eq!(pool.source, ExtractionSource::Initialize2Accounts);
        assert_eq!(pool.pool_address, Some(accounts[initialize2::AMM]));
        assert_eq!(pool.base_vault, Some(accounts[initialize2::COIN_VAULT]));
        assert_eq!(pool.quote_mint, accounts[initialize2::PC_MINT]);
    }

    #[test]
    fn test_too_few_accounts_skipped() {
        let accounts: Vec<Pubkey> = (0..10).map(|_| Pubkey::new_unique()).collect();
        let logs: Vec<String> = vec![];
        let c = ctx(&logs).with_accounts(Some(&accounts));
        assert!(Initialize2AccountsStrategy.extract(&c).is_none());
    }

    #[test]
    fn test_address_scan_skips_denylist() {
        let base = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let logs = vec![
            "Program 675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8 invoke [1]".to_string(),
            "Program 11111111111111111111111111111111 invoke [2]".to_string(),
            format!("Program log: mint {} pair So11111111111111111111111111111111111111112", base),
            format!("Program log: new token {}", token),
        ];

        let pool = PoolExtractor::default().extract(&ctx(&logs)).unwrap();
        assert_eq!(pool.source, ExtractionSource::AddressScan);
        assert_eq!(pool.base_mint, base);
        assert_eq!(pool.quote_mint, token);
        assert!(pool.pool_address.is_none());
    }

    #[test]
    fn test_address_scan_needs_two_candidates() {
        let logs = vec![
            format!("Program log: only {}", Pubkey::new_unique()),
            "Program TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA success".to_string(),
        ];
        let strategy = AddressScanStrategy::default();
        assert_eq!(strategy.candidates(&logs).len(), 1);
        assert!(strategy.extract(&ctx(&logs)).is_none());
    }

    #[test]
    fn test_default_chain_order() {
        assert_eq!(
            PoolExtractor::default().strategy_names(),
            vec!["ray_log_v1", "ray_log_v2", "initialize2_accounts", "address_scan"]
        );
    }
}
