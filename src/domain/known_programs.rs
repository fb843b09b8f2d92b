//! Known Program Addresses
//!
//! Raydium program ids, the OpenBook market program, and the well-known
//! system addresses that must never be mistaken for a freshly minted token.

use solana_sdk::pubkey::Pubkey;

use super::pool::PoolVariant;

/// Raydium liquidity pool V4 (OpenBook-backed AMM)
pub const RAYDIUM_AMM_V4: Pubkey = solana_sdk::pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");

/// Raydium CP-Swap (standard AMM, Token-2022 capable)
pub const RAYDIUM_CP_SWAP: Pubkey = solana_sdk::pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");

/// Raydium concentrated liquidity. Recognized, never traded.
pub const RAYDIUM_CLMM: Pubkey = solana_sdk::pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");

/// AMM V4 pool authority (shared by every V4 pool)
pub const RAYDIUM_AMM_V4_AUTHORITY: Pubkey =
    solana_sdk::pubkey!("5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1");

/// Serum / OpenBook v1 market program
pub const OPENBOOK_MARKET_PROGRAM: Pubkey =
    solana_sdk::pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");

/// Wrapped SOL mint
pub const WSOL_MINT: Pubkey = solana_sdk::pubkey!("So11111111111111111111111111111111111111112");

/// SPL token program
pub const TOKEN_PROGRAM: Pubkey = solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// SPL Token-2022 program
pub const TOKEN_2022_PROGRAM: Pubkey = solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Associated token account program
pub const ASSOCIATED_TOKEN_PROGRAM: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Addresses that show up in pool-creation logs but are never the new token.
pub const ADDRESS_SCAN_DENYLIST: &[&str] = &[
    "11111111111111111111111111111111",
    "11111111111111111111111111111112",
    "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
    "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C",
    "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK",
    "So11111111111111111111111111111111111111112",
    "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
    "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb",
    "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
    "ComputeBudget111111111111111111111111111111",
    "SysvarRent111111111111111111111111111111111",
    "SysvarC1ock11111111111111111111111111111111",
    "srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX",
    "5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1",
];

/// Map a program id to the pool variant it creates
pub fn variant_for_program(program_id: &Pubkey) -> PoolVariant {
    if *program_id == RAYDIUM_AMM_V4 {
        PoolVariant::AmmV4
    } else if *program_id == RAYDIUM_CP_SWAP {
        PoolVariant::CpSwap
    } else {
        PoolVariant::Unknown
    }
}

/// Program id owning pools of the given variant, if tradeable
pub fn program_for_variant(variant: PoolVariant) -> Option<Pubkey> {
    match variant {
        PoolVariant::AmmV4 => Some(RAYDIUM_AMM_V4),
        PoolVariant::CpSwap => Some(RAYDIUM_CP_SWAP),
        PoolVariant::Unknown => None,
    }
}

pub fn is_denylisted(address: &str) -> bool {
    ADDRESS_SCAN_DENYLIST.contains(&address)
}
