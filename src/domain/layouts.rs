//! Account Layout Decoder
//!
//! Fixed-offset decoding of the binary blobs a new pool leaves behind:
//! - Raydium AMM V4 state, current and legacy layouts
//! - Raydium CP-Swap pool state
//! - OpenBook (Serum v3) market state
//! - SPL mint accounts
//! - `ray_log` initialize payloads
//!
//! Every variant has an ordered list of layouts. Decoding tries them in
//! order and keeps the first one whose fields resolve to a plausible pool
//! (real addresses, distinct mints, sane decimals).

use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use super::known_programs::{OPENBOOK_MARKET_PROGRAM, RAYDIUM_CP_SWAP};
use super::pool::{AmmV4Keys, CpSwapKeys, MarketKeys, PoolVariant, SwapPoolKeys};

/// Largest decimals value a real SPL mint uses
pub const MAX_MINT_DECIMALS: u64 = 18;

/// Minimum bytes to read the current AMM V4 layout through `amm_owner`
pub const AMM_V4_MIN_LEN: usize = 680;
/// Full size of a current AMM V4 account
pub const AMM_V4_ACCOUNT_LEN: usize = 752;
/// Legacy AMM layout ends after the trailing mint block
pub const AMM_LEGACY_MIN_LEN: usize = 792;
/// OpenBook market state V3
pub const MARKET_V3_LEN: usize = 388;
/// CP-Swap pool state through the decimals block
pub const CP_SWAP_MIN_LEN: usize = 333;

/// ray_log init payload, layout V1 minimum length
pub const RAY_LOG_V1_MIN_LEN: usize = 395;
/// ray_log init payload, layout V2 minimum length
pub const RAY_LOG_V2_MIN_LEN: usize = 300;

const CP_SWAP_AUTH_SEED: &[u8] = b"vault_and_lp_mint_auth_seed";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{layout}: account data too short ({len} < {min} bytes)")]
    TooShort {
        layout: &'static str,
        len: usize,
        min: usize,
    },

    #[error("{layout}: inconsistent data: {reason}")]
    Inconsistent { layout: &'static str, reason: String },

    #[error("No known layout matched {variant} account of {len} bytes")]
    NoLayoutMatched { variant: PoolVariant, len: usize },

    #[error("Vault signer derivation failed: {0}")]
    VaultSigner(String),

    #[error("Invalid mint account: {0}")]
    InvalidMint(String),

    #[error("Variant {0} has no decodable layout")]
    UnsupportedVariant(PoolVariant),
}

/// AMM state layout version that decoded successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmmLayout {
    V4,
    Legacy,
}

/// Decoded AMM V4 state, normalized across layouts
#[derive(Debug, Clone, PartialEq)]
pub struct AmmState {
    pub layout: AmmLayout,
    pub status: u64,
    pub nonce: u64,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub target_orders: Pubkey,
    pub market_program: Pubkey,
    /// Absent from the legacy layout
    pub open_orders: Option<Pubkey>,
    /// Absent from the legacy layout
    pub market_id: Option<Pubkey>,
    pub pool_open_time: Option<u64>,
}

/// Decoded OpenBook market state V3
#[derive(Debug, Clone, PartialEq)]
pub struct MarketState {
    pub own_address: Pubkey,
    pub vault_signer_nonce: u64,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
}

/// Decoded CP-Swap pool state
#[derive(Debug, Clone, PartialEq)]
pub struct CpSwapState {
    pub amm_config: Pubkey,
    pub token_0_vault: Pubkey,
    pub token_1_vault: Pubkey,
    pub lp_mint: Pubkey,
    pub token_0_mint: Pubkey,
    pub token_1_mint: Pubkey,
    pub token_0_program: Pubkey,
    pub token_1_program: Pubkey,
    pub observation: Pubkey,
    pub status: u8,
    pub mint_0_decimals: u8,
    pub mint_1_decimals: u8,
}

/// Decoded SPL mint
#[derive(Debug, Clone, PartialEq)]
pub struct MintInfo {
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
}

impl MintInfo {
    /// Supply in whole tokens
    pub fn ui_supply(&self) -> f64 {
        self.supply as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// Pool identifiers embedded in a `ray_log` initialize entry
#[derive(Debug, Clone, PartialEq)]
pub struct RayLogInit {
    pub amm_id: Pubkey,
    pub coin_mint: Pubkey,
    pub pc_mint: Pubkey,
    pub lp_mint: Option<Pubkey>,
    pub market: Option<Pubkey>,
}

/// One entry in a variant's ordered layout list
struct AmmLayoutSpec {
    name: &'static str,
    min_len: usize,
    decode: fn(&[u8]) -> Result<AmmState, DecodeError>,
}

/// Current layout first; the legacy layout only if it fails
const AMM_LAYOUTS: &[AmmLayoutSpec] = &[
    AmmLayoutSpec {
        name: "amm_v4",
        min_len: AMM_V4_MIN_LEN,
        decode: decode_amm_v4_current,
    },
    AmmLayoutSpec {
        name: "amm_v4_legacy",
        min_len: AMM_LEGACY_MIN_LEN,
        decode: decode_amm_v4_legacy,
    },
];

/// Stateless decoder over the known account layouts
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountLayoutDecoder;

impl AccountLayoutDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode an AMM V4 account, trying each known layout in priority order
    pub fn decode_amm(&self, data: &[u8]) -> Result<AmmState, DecodeError> {
        for spec in AMM_LAYOUTS {
            if data.len() < spec.min_len {
                tracing::trace!("{}: skipped, {} bytes", spec.name, data.len());
                continue;
            }
            match (spec.decode)(data).and_then(|s| check_amm_consistency(spec.name, s)) {
                Ok(state) => return Ok(state),
                Err(e) => tracing::debug!("{} layout rejected: {}", spec.name, e),
            }
        }

        Err(DecodeError::NoLayoutMatched {
            variant: PoolVariant::AmmV4,
            len: data.len(),
        })
    }

    /// Decode an OpenBook market V3 account
    pub fn decode_market(&self, data: &[u8]) -> Result<MarketState, DecodeError> {
        ensure_len("market_v3", data, MARKET_V3_LEN)?;

        let state = MarketState {
            own_address: read_pubkey(data, 13),
            vault_signer_nonce: read_u64(data, 45),
            base_mint: read_pubkey(data, 53),
            quote_mint: read_pubkey(data, 85),
            base_vault: read_pubkey(data, 117),
            quote_vault: read_pubkey(data, 165),
            request_queue: read_pubkey(data, 221),
            event_queue: read_pubkey(data, 253),
            bids: read_pubkey(data, 285),
            asks: read_pubkey(data, 317),
            base_lot_size: read_u64(data, 349),
            quote_lot_size: read_u64(data, 357),
        };

        for (field, key) in [
            ("base_mint", state.base_mint),
            ("quote_mint", state.quote_mint),
            ("bids", state.bids),
            ("asks", state.asks),
            ("event_queue", state.event_queue),
        ] {
            if key == Pubkey::default() {
                return Err(DecodeError::Inconsistent {
                    layout: "market_v3",
                    reason: format!("{} is the default key", field),
                });
            }
        }

        Ok(state)
    }

    /// Decode a CP-Swap pool state account
    pub fn decode_cp_swap(&self, data: &[u8]) -> Result<CpSwapState, DecodeError> {
        ensure_len("cp_swap", data, CP_SWAP_MIN_LEN)?;

        let state = CpSwapState {
            amm_config: read_pubkey(data, 8),
            token_0_vault: read_pubkey(data, 72),
            token_1_vault: read_pubkey(data, 104),
            lp_mint: read_pubkey(data, 136),
            token_0_mint: read_pubkey(data, 168),
            token_1_mint: read_pubkey(data, 200),
            token_0_program: read_pubkey(data, 232),
            token_1_program: read_pubkey(data, 264),
            observation: read_pubkey(data, 296),
            status: data[329],
            mint_0_decimals: data[331],
            mint_1_decimals: data[332],
        };

        check_pair(
            "cp_swap",
            &state.token_0_mint,
            &state.token_1_mint,
            &state.token_0_vault,
            &state.token_1_vault,
        )?;
        check_decimals("cp_swap", state.mint_0_decimals as u64)?;
        check_decimals("cp_swap", state.mint_1_decimals as u64)?;

        Ok(state)
    }

    /// Decode an SPL mint (Token-2022 mints decode through their base layout)
    pub fn decode_mint(&self, data: &[u8]) -> Result<MintInfo, DecodeError> {
        let len = spl_token::state::Mint::LEN;
        ensure_len("spl_mint", data, len)?;

        let mint = spl_token::state::Mint::unpack(&data[..len])
            .map_err(|e| DecodeError::InvalidMint(e.to_string()))?;

        Ok(MintInfo {
            mint_authority: mint.mint_authority.into(),
            freeze_authority: mint.freeze_authority.into(),
            supply: mint.supply,
            decimals: mint.decimals,
            is_initialized: mint.is_initialized,
        })
    }

    /// Decode a `ray_log` init payload with the long (V1) layout
    pub fn decode_ray_log_v1(&self, data: &[u8]) -> Result<RayLogInit, DecodeError> {
        ensure_len("ray_log_v1", data, RAY_LOG_V1_MIN_LEN)?;

        let init = RayLogInit {
            market: Some(read_pubkey(data, 43)),
            amm_id: read_pubkey(data, 267),
            lp_mint: Some(read_pubkey(data, 299)),
            coin_mint: read_pubkey(data, 331),
            pc_mint: read_pubkey(data, 363),
        };
        check_ray_log("ray_log_v1", &init)?;
        Ok(init)
    }

    /// Decode a `ray_log` init payload with the short (V2) layout
    pub fn decode_ray_log_v2(&self, data: &[u8]) -> Result<RayLogInit, DecodeError> {
        ensure_len("ray_log_v2", data, RAY_LOG_V2_MIN_LEN)?;

        let init = RayLogInit {
            market: None,
            amm_id: read_pubkey(data, 203),
            lp_mint: None,
            coin_mint: read_pubkey(data, 235),
            pc_mint: read_pubkey(data, 267),
        };
        check_ray_log("ray_log_v2", &init)?;
        Ok(init)
    }

    /// Derive a market's vault signer from its id and stored nonce
    pub fn vault_signer(
        &self,
        market_id: &Pubkey,
        nonce: u64,
        market_program: &Pubkey,
    ) -> Result<Pubkey, DecodeError> {
        Pubkey::create_program_address(&[market_id.as_ref(), &nonce.to_le_bytes()], market_program)
            .map_err(|e| DecodeError::VaultSigner(e.to_string()))
    }

    /// Assemble AMM V4 swap keys from the pool and market accounts
    pub fn amm_v4_keys(
        &self,
        amm_id: Pubkey,
        amm_data: &[u8],
        market_data: &[u8],
    ) -> Result<SwapPoolKeys, DecodeError> {
        let amm = self.decode_amm(amm_data)?;
        let market = self.decode_market(market_data)?;

        let market_id = amm.market_id.unwrap_or(market.own_address);
        let open_orders = amm.open_orders.ok_or_else(|| DecodeError::Inconsistent {
            layout: "amm_v4_legacy",
            reason: "open orders account not present in layout".to_string(),
        })?;
        let market_program = if amm.market_program == Pubkey::default() {
            OPENBOOK_MARKET_PROGRAM
        } else {
            amm.market_program
        };
        let vault_signer =
            self.vault_signer(&market_id, market.vault_signer_nonce, &market_program)?;

        Ok(SwapPoolKeys::AmmV4(AmmV4Keys {
            amm_id,
            authority: AmmV4Keys::authority(),
            open_orders,
            target_orders: amm.target_orders,
            base_mint: amm.base_mint,
            quote_mint: amm.quote_mint,
            base_vault: amm.base_vault,
            quote_vault: amm.quote_vault,
            lp_mint: amm.lp_mint,
            base_decimals: amm.base_decimals,
            quote_decimals: amm.quote_decimals,
            market: MarketKeys {
                program_id: market_program,
                market_id,
                bids: market.bids,
                asks: market.asks,
                event_queue: market.event_queue,
                base_vault: market.base_vault,
                quote_vault: market.quote_vault,
                vault_signer,
            },
        }))
    }

    /// Assemble CP-Swap keys from the pool state account
    pub fn cp_swap_keys(&self, pool_id: Pubkey, data: &[u8]) -> Result<SwapPoolKeys, DecodeError> {
        let state = self.decode_cp_swap(data)?;
        let (authority, _) = Pubkey::find_program_address(&[CP_SWAP_AUTH_SEED], &RAYDIUM_CP_SWAP);

        Ok(SwapPoolKeys::CpSwap(CpSwapKeys {
            pool_id,
            authority,
            amm_config: state.amm_config,
            observation: state.observation,
            token_0_mint: state.token_0_mint,
            token_1_mint: state.token_1_mint,
            token_0_vault: state.token_0_vault,
            token_1_vault: state.token_1_vault,
            token_0_program: state.token_0_program,
            token_1_program: state.token_1_program,
            mint_0_decimals: state.mint_0_decimals,
            mint_1_decimals: state.mint_1_decimals,
        }))
    }
}

fn decode_amm_v4_current(data: &[u8]) -> Result<AmmState, DecodeError> {
    // 32 u64 fields, then swap accounting (u128, u128, u64, u128, u128, u64)
    const KEYS: usize = 32 * 8 + 16 + 16 + 8 + 16 + 16 + 8;

    Ok(AmmState {
        layout: AmmLayout::V4,
        status: read_u64(data, 0),
        nonce: read_u64(data, 8),
        base_decimals: narrow_decimals("amm_v4", read_u64(data, 32))?,
        quote_decimals: narrow_decimals("amm_v4", read_u64(data, 40))?,
        pool_open_time: Some(read_u64(data, 28 * 8)),
        base_vault: read_pubkey(data, KEYS),
        quote_vault: read_pubkey(data, KEYS + 32),
        base_mint: read_pubkey(data, KEYS + 64),
        quote_mint: read_pubkey(data, KEYS + 96),
        lp_mint: read_pubkey(data, KEYS + 128),
        open_orders: Some(read_pubkey(data, KEYS + 160)),
        market_id: Some(read_pubkey(data, KEYS + 192)),
        market_program: read_pubkey(data, KEYS + 224),
        target_orders: read_pubkey(data, KEYS + 256),
    })
}

fn decode_amm_v4_legacy(data: &[u8]) -> Result<AmmState, DecodeError> {
    // 18 u64 fields, amm_owner, lp reserve, decimals, lot sizes, then keys
    Ok(AmmState {
        layout: AmmLayout::Legacy,
        status: read_u64(data, 0),
        nonce: read_u64(data, 8),
        base_decimals: narrow_decimals("amm_v4_legacy", read_u64(data, 184))?,
        quote_decimals: narrow_decimals("amm_v4_legacy", read_u64(data, 192))?,
        pool_open_time: None,
        base_mint: read_pubkey(data, 216),
        quote_mint: read_pubkey(data, 248),
        lp_mint: read_pubkey(data, 280),
        base_vault: read_pubkey(data, 408),
        quote_vault: read_pubkey(data, 440),
        market_program: read_pubkey(data, 536),
        target_orders: read_pubkey(data, 568),
        open_orders: None,
        market_id: None,
    })
}

fn check_amm_consistency(layout: &'static str, state: AmmState) -> Result<AmmState, DecodeError> {
    check_pair(
        layout,
        &state.base_mint,
        &state.quote_mint,
        &state.base_vault,
        &state.quote_vault,
    )?;
    if state.lp_mint == Pubkey::default() {
        return Err(DecodeError::Inconsistent {
            layout,
            reason: "lp mint is the default key".to_string(),
        });
    }
    Ok(state)
}

fn check_pair(
    layout: &'static str,
    mint_a: &Pubkey,
    mint_b: &Pubkey,
    vault_a: &Pubkey,
    vault_b: &Pubkey,
) -> Result<(), DecodeError> {
    let default = Pubkey::default();
    let reason = if *mint_a == default || *mint_b == default {
        Some("mint is the default key")
    } else if mint_a == mint_b {
        Some("base and quote mints are identical")
    } else if *vault_a == default || *vault_b == default {
        Some("vault is the default key")
    } else if vault_a == vault_b {
        Some("base and quote vaults are identical")
    } else {
        None
    };

    match reason {
        Some(r) => Err(DecodeError::Inconsistent {
            layout,
            reason: r.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_ray_log(layout: &'static str, init: &RayLogInit) -> Result<(), DecodeError> {
    let default = Pubkey::default();
    if init.amm_id == default || init.coin_mint == default || init.pc_mint == default {
        return Err(DecodeError::Inconsistent {
            layout,
            reason: "embedded address is the default key".to_string(),
        });
    }
    if init.coin_mint == init.pc_mint {
        return Err(DecodeError::Inconsistent {
            layout,
            reason: "coin and pc mints are identical".to_string(),
        });
    }
    Ok(())
}

fn check_decimals(layout: &'static str, decimals: u64) -> Result<(), DecodeError> {
    if decimals > MAX_MINT_DECIMALS {
        return Err(DecodeError::Inconsistent {
            layout,
            reason: format!("decimals {} out of range", decimals),
        });
    }
    Ok(())
}

fn narrow_decimals(layout: &'static str, decimals: u64) -> Result<u8, DecodeError> {
    check_decimals(layout, decimals)?;
    Ok(decimals as u8)
}

fn ensure_len(layout: &'static str, data: &[u8], min: usize) -> Result<(), DecodeError> {
    if data.len() < min {
        return Err(DecodeError::TooShort {
            layout,
            len: data.len(),
            min,
        });
    }
    Ok(())
}

// Callers check length first
fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(buf)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Byte builders shared by decoder and extraction tests

    use super::*;

    pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
        buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn put_key(buf: &mut [u8], offset: usize, key: &Pubkey) {
        buf[offset..offset + 32].copy_from_slice(key.as_ref());
    }

    pub struct AmmFixture {
        pub base_mint: Pubkey,
        pub quote_mint: Pubkey,
        pub base_vault: Pubkey,
        pub quote_vault: Pubkey,
        pub lp_mint: Pubkey,
        pub open_orders: Pubkey,
        pub market_id: Pubkey,
        pub target_orders: Pubkey,
    }

    impl AmmFixture {
        pub fn new(base_mint: Pubkey, quote_mint: Pubkey) -> Self {
            Self {
                base_mint,
                quote_mint,
                base_vault: Pubkey::new_unique(),
                quote_vault: Pubkey::new_unique(),
                lp_mint: Pubkey::new_unique(),
                open_orders: Pubkey::new_unique(),
                market_id: Pubkey::new_unique(),
                target_orders: Pubkey::new_unique(),
            }
        }

        pub fn current_bytes(&self, base_decimals: u64, quote_decimals: u64) -> Vec<u8> {
            let mut buf = vec![0u8; AMM_V4_ACCOUNT_LEN];
            put_u64(&mut buf, 0, 6);
            put_u64(&mut buf, 8, 254);
            put_u64(&mut buf, 32, base_decimals);
            put_u64(&mut buf, 40, quote_decimals);
            let k = 336;
            put_key(&mut buf, k, &self.base_vault);
            put_key(&mut buf, k + 32, &self.quote_vault);
            put_key(&mut buf, k + 64, &self.base_mint);
            put_key(&mut buf, k + 96, &self.quote_mint);
            put_key(&mut buf, k + 128, &self.lp_mint);
            put_key(&mut buf, k + 160, &self.open_orders);
            put_key(&mut buf, k + 192, &self.market_id);
            put_key(&mut buf, k + 224, &OPENBOOK_MARKET_PROGRAM);
            put_key(&mut buf, k + 256, &self.target_orders);
            buf
        }

        pub fn legacy_bytes(&self) -> Vec<u8> {
            let mut buf = vec![0u8; AMM_LEGACY_MIN_LEN];
            put_u64(&mut buf, 184, 6);
            put_u64(&mut buf, 192, 9);
            put_key(&mut buf, 216, &self.base_mint);
            put_key(&mut buf, 248, &self.quote_mint);
            put_key(&mut buf, 280, &self.lp_mint);
            put_key(&mut buf, 408, &self.base_vault);
            put_key(&mut buf, 440, &self.quote_vault);
            put_key(&mut buf, 536, &OPENBOOK_MARKET_PROGRAM);
            put_key(&mut buf, 568, &self.target_orders);
            buf
        }
    }

    pub fn market_bytes(market_id: &Pubkey, base_mint: &Pubkey, quote_mint: &Pubkey, nonce: u64) -> Vec<u8> {
        let mut buf = vec![0u8; MARKET_V3_LEN];
        put_key(&mut buf, 13, market_id);
        put_u64(&mut buf, 45, nonce);
        put_key(&mut buf, 53, base_mint);
        put_key(&mut buf, 85, quote_mint);
        for offset in [117, 165, 221, 253, 285, 317] {
            put_key(&mut buf, offset, &Pubkey::new_unique());
        }
        buf
    }

    /// Find a nonce that yields a valid (off-curve) vault signer
    pub fn valid_nonce(market_id: &Pubkey) -> u64 {
        (0u64..256)
            .find(|n| {
                Pubkey::create_program_address(
                    &[market_id.as_ref(), &n.to_le_bytes()],
                    &OPENBOOK_MARKET_PROGRAM,
                )
                .is_ok()
            })
            .unwrap()
    }

    pub fn mint_bytes(mint_authority: Option<Pubkey>, freeze_authority: Option<Pubkey>, supply: u64, decimals: u8) -> Vec<u8> {
        use solana_sdk::program_option::COption;

        let mint = spl_token::state::Mint {
            mint_authority: mint_authority.map(COption::Some).unwrap_or(COption::None),
            supply,
            decimals,
            is_initialized: true,
            freeze_authority: freeze_authority.map(COption::Some).unwrap_or(COption::None),
        };
        let mut buf = vec![0u8; spl_token::state::Mint::LEN];
        spl_token::state::Mint::pack(mint, &mut buf).unwrap();
        buf
    }

    pub fn ray_log_v1(market: &Pubkey, amm: &Pubkey, lp: &Pubkey, coin: &Pubkey, pc: &Pubkey) -> Vec<u8> {
        let mut buf = vec![0u8; RAY_LOG_V1_MIN_LEN];
        put_key(&mut buf, 43, market);
        put_key(&mut buf, 267, amm);
        put_key(&mut buf, 299, lp);
        put_key(&mut buf, 331, coin);
        put_key(&mut buf, 363, pc);
        buf
    }

    pub fn ray_log_v2(amm: &Pubkey, coin: &Pubkey, pc: &Pubkey) -> Vec<u8> {
        let mut buf = vec![0u8; RAY_LOG_V2_MIN_LEN];
        put_key(&mut buf, 203, amm);
        put_key(&mut buf, 235, coin);
        put_key(&mut buf, 267, pc);
        buf
    }
}
