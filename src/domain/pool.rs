//! Pool Model
//!
//! `PoolInfo` is what detection produces for a pool-creation transaction.
//! `SwapPoolKeys` is the fully resolved account set needed to trade against
//! that pool, tagged by protocol variant.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::known_programs::{
    OPENBOOK_MARKET_PROGRAM, RAYDIUM_AMM_V4, RAYDIUM_AMM_V4_AUTHORITY, RAYDIUM_CP_SWAP,
    TOKEN_PROGRAM, WSOL_MINT,
};

/// Protocol variant of a detected pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolVariant {
    /// Raydium AMM V4 (OpenBook market backed)
    AmmV4,
    /// Raydium CP-Swap
    CpSwap,
    /// Recognized program, unsupported layout
    Unknown,
}

impl PoolVariant {
    pub fn label(&self) -> &'static str {
        match self {
            PoolVariant::AmmV4 => "amm_v4",
            PoolVariant::CpSwap => "cp_swap",
            PoolVariant::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PoolVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which extraction strategy produced a `PoolInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    RayLogV1,
    RayLogV2,
    Initialize2Accounts,
    AddressScan,
}

/// A newly created pool, as seen in one transaction
///
/// Built once per transaction signature and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Transaction that created the pool
    pub signature: String,
    /// AMM / pool state account. Unknown when only raw addresses were recoverable.
    pub pool_address: Option<Pubkey>,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Option<Pubkey>,
    pub quote_vault: Option<Pubkey>,
    pub lp_mint: Option<Pubkey>,
    pub open_orders: Option<Pubkey>,
    pub market_id: Option<Pubkey>,
    pub variant: PoolVariant,
    pub source: ExtractionSource,
    /// Unix seconds at detection
    pub detected_at: u64,
}

impl PoolInfo {
    /// True if either side of the pair is wrapped SOL
    pub fn is_sol_pair(&self) -> bool {
        self.base_mint == WSOL_MINT || self.quote_mint == WSOL_MINT
    }

    /// The mint being sniped: the non-WSOL side, or the quote side when
    /// neither is WSOL.
    pub fn token_mint(&self) -> Pubkey {
        if self.base_mint == WSOL_MINT {
            self.quote_mint
        } else if self.quote_mint == WSOL_MINT {
            self.base_mint
        } else {
            self.quote_mint
        }
    }

    /// The mint paid in to acquire `token_mint`
    pub fn payment_mint(&self) -> Pubkey {
        if self.token_mint() == self.base_mint {
            self.quote_mint
        } else {
            self.base_mint
        }
    }
}

/// OpenBook market accounts referenced by an AMM V4 swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketKeys {
    pub program_id: Pubkey,
    pub market_id: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub event_queue: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    /// Program-derived vault signer
    pub vault_signer: Pubkey,
}

/// Account set for swapping against a Raydium AMM V4 pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmV4Keys {
    pub amm_id: Pubkey,
    pub authority: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub lp_mint: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub market: MarketKeys,
}

/// Account set for swapping against a Raydium CP-Swap pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpSwapKeys {
    pub pool_id: Pubkey,
    pub authority: Pubkey,
    pub amm_config: Pubkey,
    pub observation: Pubkey,
    pub token_0_mint: Pubkey,
    pub token_1_mint: Pubkey,
    pub token_0_vault: Pubkey,
    pub token_1_vault: Pubkey,
    pub token_0_program: Pubkey,
    pub token_1_program: Pubkey,
    pub mint_0_decimals: u8,
    pub mint_1_decimals: u8,
}

/// Resolved swap keys, one payload per protocol variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapPoolKeys {
    AmmV4(AmmV4Keys),
    CpSwap(CpSwapKeys),
}

impl SwapPoolKeys {
    pub fn variant(&self) -> PoolVariant {
        match self {
            SwapPoolKeys::AmmV4(_) => PoolVariant::AmmV4,
            SwapPoolKeys::CpSwap(_) => PoolVariant::CpSwap,
        }
    }

    pub fn program_id(&self) -> Pubkey {
        match self {
            SwapPoolKeys::AmmV4(_) => RAYDIUM_AMM_V4,
            SwapPoolKeys::CpSwap(_) => RAYDIUM_CP_SWAP,
        }
    }

    pub fn pool_id(&self) -> Pubkey {
        match self {
            SwapPoolKeys::AmmV4(k) => k.amm_id,
            SwapPoolKeys::CpSwap(k) => k.pool_id,
        }
    }

    pub fn base_mint(&self) -> Pubkey {
        match self {
            SwapPoolKeys::AmmV4(k) => k.base_mint,
            SwapPoolKeys::CpSwap(k) => k.token_0_mint,
        }
    }

    pub fn quote_mint(&self) -> Pubkey {
        match self {
            SwapPoolKeys::AmmV4(k) => k.quote_mint,
            SwapPoolKeys::CpSwap(k) => k.token_1_mint,
        }
    }

    pub fn base_vault(&self) -> Pubkey {
        match self {
            SwapPoolKeys::AmmV4(k) => k.base_vault,
            SwapPoolKeys::CpSwap(k) => k.token_0_vault,
        }
    }

    pub fn quote_vault(&self) -> Pubkey {
        match self {
            SwapPoolKeys::AmmV4(k) => k.quote_vault,
            SwapPoolKeys::CpSwap(k) => k.token_1_vault,
        }
    }

    pub fn base_decimals(&self) -> u8 {
        match self {
            SwapPoolKeys::AmmV4(k) => k.base_decimals,
            SwapPoolKeys::CpSwap(k) => k.mint_0_decimals,
        }
    }

    pub fn quote_decimals(&self) -> u8 {
        match self {
            SwapPoolKeys::AmmV4(k) => k.quote_decimals,
            SwapPoolKeys::CpSwap(k) => k.mint_1_decimals,
        }
    }

    /// Vault holding `mint`, if it is one of the pair
    pub fn vault_for(&self, mint: &Pubkey) -> Option<Pubkey> {
        if *mint == self.base_mint() {
            Some(self.base_vault())
        } else if *mint == self.quote_mint() {
            Some(self.quote_vault())
        } else {
            None
        }
    }

    /// Token program owning `mint`; AMM V4 pairs are always SPL Token
    pub fn token_program_for(&self, mint: &Pubkey) -> Pubkey {
        match self {
            SwapPoolKeys::AmmV4(_) => TOKEN_PROGRAM,
            SwapPoolKeys::CpSwap(k) if *mint == k.token_1_mint => k.token_1_program,
            SwapPoolKeys::CpSwap(k) => k.token_0_program,
        }
    }

    /// Decimals of `mint`, if it is one of the pair
    pub fn decimals_for(&self, mint: &Pubkey) -> Option<u8> {
        if *mint == self.base_mint() {
            Some(self.base_decimals())
        } else if *mint == self.quote_mint() {
            Some(self.quote_decimals())
        } else {
            None
        }
    }
}

impl Default for MarketKeys {
    fn default() -> Self {
        Self {
            program_id: OPENBOOK_MARKET_PROGRAM,
            market_id: Pubkey::default(),
            bids: Pubkey::default(),
            asks: Pubkey::default(),
            event_queue: Pubkey::default(),
            base_vault: Pubkey::default(),
            quote_vault: Pubkey::default(),
            vault_signer: Pubkey::default(),
        }
    }
}

impl AmmV4Keys {
    pub fn authority() -> Pubkey {
        RAYDIUM_AMM_V4_AUTHORITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(base: Pubkey, quote: Pubkey) -> PoolInfo {
        PoolInfo {
            signature: "sig".to_string(),
            pool_address: Some(Pubkey::new_unique()),
            base_mint: base,
            quote_mint: quote,
            base_vault: None,
            quote_vault: None,
            lp_mint: None,
            open_orders: None,
            market_id: None,
            variant: PoolVariant::AmmV4,
            source: ExtractionSource::RayLogV1,
            detected_at: 0,
        }
    }

    #[test]
    fn test_token_mint_picks_non_wsol_side() {
        let token = Pubkey::new_unique();
        assert_eq!(pool(token, WSOL_MINT).token_mint(), token);
        assert_eq!(pool(WSOL_MINT, token).token_mint(), token);
        assert_eq!(pool(token, WSOL_MINT).payment_mint(), WSOL_MINT);
    }

    #[test]
    fn test_non_sol_pair_uses_quote() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let p = pool(a, b);
        assert!(!p.is_sol_pair());
        assert_eq!(p.token_mint(), b);
        assert_eq!(p.payment_mint(), a);
    }

    #[test]
    fn test_swap_keys_lookup() {
        let base = Pubkey::new_unique();
        let base_vault = Pubkey::new_unique();
        let keys = SwapPoolKeys::CpSwap(CpSwapKeys {
            pool_id: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            amm_config: Pubkey::new_unique(),
            observation: Pubkey::new_unique(),
            token_0_mint: base,
            token_1_mint: WSOL_MINT,
            token_0_vault: base_vault,
            token_1_vault: Pubkey::new_unique(),
            token_0_program: spl_token::id(),
            token_1_program: spl_token::id(),
            mint_0_decimals: 6,
            mint_1_decimals: 9,
        });

        assert_eq!(keys.variant(), PoolVariant::CpSwap);
        assert_eq!(keys.vault_for(&base), Some(base_vault));
        assert_eq!(keys.decimals_for(&WSOL_MINT), Some(9));
        assert_eq!(keys.vault_for(&Pubkey::new_unique()), None);
    }

    #[test]
    fn test_token_program_per_side() {
        let token_2022 = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let keys = SwapPoolKeys::CpSwap(CpSwapKeys {
            pool_id: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            amm_config: Pubkey::new_unique(),
            observation: Pubkey::new_unique(),
            token_0_mint: WSOL_MINT,
            token_1_mint: token,
            token_0_vault: Pubkey::new_unique(),
            token_1_vault: Pubkey::new_unique(),
            token_0_program: TOKEN_PROGRAM,
            token_1_program: token_2022,
            mint_0_decimals: 9,
            mint_1_decimals: 6,
        });

        assert_eq!(keys.token_program_for(&token), token_2022);
        assert_eq!(keys.token_program_for(&WSOL_MINT), TOKEN_PROGRAM);
    }
}
