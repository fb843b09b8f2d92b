//! Block engine endpoints, tip accounts and client settings

use std::time::Duration;

pub const MAINNET_AMSTERDAM: &str = "https://amsterdam.mainnet.block-engine.jito.wtf";
pub const MAINNET_FRANKFURT: &str = "https://frankfurt.mainnet.block-engine.jito.wtf";
pub const MAINNET_NY: &str = "https://ny.mainnet.block-engine.jito.wtf";
pub const MAINNET_TOKYO: &str = "https://tokyo.mainnet.block-engine.jito.wtf";

/// Validators rotate through these; any one of them accepts tips
pub const TIP_ACCOUNTS: &[&str] = &[
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4bVmkdzGZBJLYQ6QwBvp8dx",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

pub fn random_tip_account() -> &'static str {
    use rand::seq::SliceRandom;
    TIP_ACCOUNTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(TIP_ACCOUNTS[0])
}

#[derive(Debug, Clone)]
pub struct JitoConfig {
    pub block_engine_url: String,
    pub timeout: Duration,
    pub tip_lamports: u64,
    pub api_token: Option<String>,
}

impl Default for JitoConfig {
    fn default() -> Self {
        Self {
            block_engine_url: MAINNET_NY.to_string(),
            timeout: Duration::from_secs(30),
            tip_lamports: 10_000,
            api_token: None,
        }
    }
}

impl JitoConfig {
    /// Region shorthand (`ams`, `fra`, `ny`, `tyo`) or a full URL
    pub fn for_region(region: &str) -> Self {
        let url = match region.to_lowercase().as_str() {
            "amsterdam" | "ams" => MAINNET_AMSTERDAM.to_string(),
            "frankfurt" | "fra" => MAINNET_FRANKFURT.to_string(),
            "tokyo" | "tyo" => MAINNET_TOKYO.to_string(),
            "newyork" | "ny" | "" => MAINNET_NY.to_string(),
            other if other.starts_with("http") => region.to_string(),
            _ => MAINNET_NY.to_string(),
        };
        Self {
            block_engine_url: url,
            ..Default::default()
        }
    }

    pub fn with_tip(mut self, lamports: u64) -> Self {
        self.tip_lamports = lamports;
        self
    }

    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    #[test]
    fn test_regions() {
        assert!(JitoConfig::for_region("ams").block_engine_url.contains("amsterdam"));
        assert!(JitoConfig::for_region("Frankfurt").block_engine_url.contains("frankfurt"));
        assert_eq!(JitoConfig::for_region("").block_engine_url, MAINNET_NY);
        assert_eq!(
            JitoConfig::for_region("http://localhost:8899").block_engine_url,
            "http://localhost:8899"
        );
    }

    #[test]
    fn test_tip_accounts_are_valid_keys() {
        for account in TIP_ACCOUNTS {
            assert!(Pubkey::from_str(account).is_ok(), "{}", account);
        }
        assert!(TIP_ACCOUNTS.contains(&random_tip_account()));
    }

    #[test]
    fn test_empty_token_dropped() {
        let config = JitoConfig::default().with_api_token(Some(String::new()));
        assert!(config.api_token.is_none());
    }
}
