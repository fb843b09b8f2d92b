//! Swap Instruction Builders
//!
//! Builds Raydium swap instructions for either pool variant, plus the
//! surrounding instructions a wallet needs: compute budget, idempotent
//! associated-token-account creation, and wrapping/unwrapping native SOL.

use serde::{Deserialize, Serialize};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_instruction, system_program,
};
use thiserror::Error;

use super::known_programs::{
    ASSOCIATED_TOKEN_PROGRAM, RAYDIUM_AMM_V4, RAYDIUM_CP_SWAP, TOKEN_PROGRAM, WSOL_MINT,
};
use super::pool::{AmmV4Keys, CpSwapKeys, SwapPoolKeys};

/// AMM V4 `swapBaseIn` instruction tag
pub const AMM_V4_SWAP_BASE_IN: u8 = 9;

/// CP-Swap `swap_base_input` discriminator
pub const CP_SWAP_BASE_INPUT: [u8; 8] = [143, 190, 90, 218, 196, 30, 51, 222];

/// Associated token program `CreateIdempotent` tag
const ATA_CREATE_IDEMPOTENT: u8 = 1;

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Trade fee of a standard Raydium pool, in basis points
pub const DEFAULT_POOL_FEE_BPS: u64 = 25;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapBuildError {
    #[error("Swap amount must be positive")]
    ZeroAmount,

    #[error("Mint {0} is not part of the pool")]
    MintNotInPool(String),

    #[error("Slippage {0} bps out of range")]
    InvalidSlippage(u16),
}

/// Which way the wallet trades against the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    /// Pay the payment mint, receive the token
    Buy,
    /// Pay the token, receive the payment mint
    Sell,
}

/// Compute budget prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityFee {
    pub compute_unit_limit: u32,
    pub micro_lamports_per_cu: u64,
}

impl Default for PriorityFee {
    fn default() -> Self {
        Self {
            compute_unit_limit: 200_000,
            micro_lamports_per_cu: 100_000,
        }
    }
}

impl PriorityFee {
    pub fn instructions(&self) -> Vec<Instruction> {
        let mut ixs = Vec::with_capacity(2);
        if self.compute_unit_limit > 0 {
            ixs.push(ComputeBudgetInstruction::set_compute_unit_limit(
                self.compute_unit_limit,
            ));
        }
        if self.micro_lamports_per_cu > 0 {
            ixs.push(ComputeBudgetInstruction::set_compute_unit_price(
                self.micro_lamports_per_cu,
            ));
        }
        ixs
    }
}

/// One exact-input swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub owner: Pubkey,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount_in: u64,
    pub min_amount_out: u64,
}

/// `expected * (10000 - bps) / 10000`, rounded down
pub fn min_amount_out(expected: u64, slippage_bps: u16) -> Result<u64, SwapBuildError> {
    if slippage_bps as u64 > BPS_DENOMINATOR {
        return Err(SwapBuildError::InvalidSlippage(slippage_bps));
    }
    let kept = BPS_DENOMINATOR - slippage_bps as u64;
    Ok((expected as u128 * kept as u128 / BPS_DENOMINATOR as u128) as u64)
}

/// Constant-product output for `amount_in` after the pool fee
pub fn constant_product_out(amount_in: u64, reserve_in: u64, reserve_out: u64, fee_bps: u64) -> u64 {
    if amount_in == 0 || reserve_in == 0 || reserve_out == 0 {
        return 0;
    }
    let fee_bps = fee_bps.min(BPS_DENOMINATOR) as u128;
    let in_after_fee = amount_in as u128 * (BPS_DENOMINATOR as u128 - fee_bps) / BPS_DENOMINATOR as u128;
    let out = in_after_fee * reserve_out as u128 / (reserve_in as u128 + in_after_fee);
    out.min(u64::MAX as u128) as u64
}

pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM,
    )
    .0
}

/// Create `owner`'s associated account for `mint` unless it already exists
pub fn create_ata_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    let ata = associated_token_address(owner, mint, token_program);
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(*token_program, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT],
    }
}

/// Fund and sync the owner's WSOL account
pub fn wrap_sol_instructions(owner: &Pubkey, lamports: u64) -> Vec<Instruction> {
    let wsol_ata = associated_token_address(owner, &WSOL_MINT, &TOKEN_PROGRAM);
    let mut ixs = vec![
        create_ata_idempotent(owner, owner, &WSOL_MINT, &TOKEN_PROGRAM),
        system_instruction::transfer(owner, &wsol_ata, lamports),
    ];
    if let Ok(sync) = spl_token::instruction::sync_native(&TOKEN_PROGRAM, &wsol_ata) {
        ixs.push(sync);
    }
    ixs
}

/// Close the owner's WSOL account, returning lamports to the owner
pub fn unwrap_sol_instruction(owner: &Pubkey) -> Option<Instruction> {
    let wsol_ata = associated_token_address(owner, &WSOL_MINT, &TOKEN_PROGRAM);
    spl_token::instruction::close_account(&TOKEN_PROGRAM, &wsol_ata, owner, owner, &[]).ok()
}

/// Swap instruction for `request` against `keys`
pub fn build_swap_instruction(
    keys: &SwapPoolKeys,
    request: &SwapRequest,
) -> Result<Instruction, SwapBuildError> {
    if request.amount_in == 0 {
        return Err(SwapBuildError::ZeroAmount);
    }
    for mint in [&request.input_mint, &request.output_mint] {
        if keys.vault_for(mint).is_none() {
            return Err(SwapBuildError::MintNotInPool(mint.to_string()));
        }
    }

    Ok(match keys {
        SwapPoolKeys::AmmV4(k) => amm_v4_swap(k, request),
        SwapPoolKeys::CpSwap(k) => cp_swap_swap(k, request),
    })
}

fn amm_v4_swap(keys: &AmmV4Keys, request: &SwapRequest) -> Instruction {
    let source = associated_token_address(&request.owner, &request.input_mint, &TOKEN_PROGRAM);
    let destination = associated_token_address(&request.owner, &request.output_mint, &TOKEN_PROGRAM);

    let mut data = Vec::with_capacity(17);
    data.push(AMM_V4_SWAP_BASE_IN);
    data.extend_from_slice(&request.amount_in.to_le_bytes());
    data.extend_from_slice(&request.min_amount_out.to_le_bytes());

    let market = &keys.market;
    Instruction {
        program_id: RAYDIUM_AMM_V4,
        accounts: vec![
            AccountMeta::new_readonly(TOKEN_PROGRAM, false),
            AccountMeta::new(keys.amm_id, false),
            AccountMeta::new_readonly(keys.authority, false),
            AccountMeta::new(keys.open_orders, false),
            AccountMeta::new(keys.target_orders, false),
            AccountMeta::new(keys.base_vault, false),
            AccountMeta::new(keys.quote_vault, false),
            AccountMeta::new_readonly(market.program_id, false),
            AccountMeta::new(market.market_id, false),
            AccountMeta::new(market.bids, false),
            AccountMeta::new(market.asks, false),
            AccountMeta::new(market.event_queue, false),
            AccountMeta::new(market.base_vault, false),
            AccountMeta::new(market.quote_vault, false),
            AccountMeta::new_readonly(market.vault_signer, false),
            AccountMeta::new(source, false),
            AccountMeta::new(destination, false),
            AccountMeta::new_readonly(request.owner, true),
        ],
        data,
    }
}

fn cp_swap_swap(keys: &CpSwapKeys, request: &SwapRequest) -> Instruction {
    let side = |mint: &Pubkey| {
        if *mint == keys.token_0_mint {
            (keys.token_0_vault, keys.token_0_program)
        } else {
            (keys.token_1_vault, keys.token_1_program)
        }
    };
    let (input_vault, input_program) = side(&request.input_mint);
    let (output_vault, output_program) = side(&request.output_mint);
    let input_ata = associated_token_address(&request.owner, &request.input_mint, &input_program);
    let output_ata = associated_token_address(&request.owner, &request.output_mint, &output_program);

    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&CP_SWAP_BASE_INPUT);
    data.extend_from_slice(&request.amount_in.to_le_bytes());
    data.extend_from_slice(&request.min_amount_out.to_le_bytes());

    Instruction {
        program_id: RAYDIUM_CP_SWAP,
        accounts: vec![
            AccountMeta::new_readonly(request.owner, true),
            AccountMeta::new_readonly(keys.authority, false),
            AccountMeta::new_readonly(keys.amm_config, false),
            AccountMeta::new(keys.pool_id, false),
            AccountMeta::new(input_ata, false),
            AccountMeta::new(output_ata, false),
            AccountMeta::new(input_vault, false),
            AccountMeta::new(output_vault, false),
            AccountMeta::new_readonly(input_program, false),
            AccountMeta::new_readonly(output_program, false),
            AccountMeta::new_readonly(request.input_mint, false),
            AccountMeta::new_readonly(request.output_mint, false),
            AccountMeta::new(keys.observation, false),
        ],
        data,
    }
}

/// Token program owning `mint` within `keys`
pub fn token_program_for(keys: &SwapPoolKeys, mint: &Pubkey) -> Pubkey {
    match keys {
        SwapPoolKeys::AmmV4(_) => TOKEN_PROGRAM,
        SwapPoolKeys::CpSwap(k) if *mint == k.token_0_mint => k.token_0_program,
        SwapPoolKeys::CpSwap(k) => k.token_1_program,
    }
}

/// Full instruction list for one swap: compute budget, account setup,
/// SOL wrapping when the input is WSOL, the swap, and WSOL cleanup.
pub fn swap_transaction_instructions(
    keys: &SwapPoolKeys,
    request: &SwapRequest,
    priority: &PriorityFee,
) -> Result<Vec<Instruction>, SwapBuildError> {
    let swap = build_swap_instruction(keys, request)?;
    let owner = &request.owner;

    let mut ixs = priority.instructions();
    if request.input_mint == WSOL_MINT {
        ixs.extend(wrap_sol_instructions(owner, request.amount_in));
    }
    let output_program = token_program_for(keys, &request.output_mint);
    ixs.push(create_ata_idempotent(owner, owner, &request.output_mint, &output_program));
    ixs.push(swap);
    if request.input_mint == WSOL_MINT || request.output_mint == WSOL_MINT {
        ixs.extend(unwrap_sol_instruction(owner));
    }
    Ok(ixs)
}
