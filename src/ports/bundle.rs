//! Bundle Submission Port
//!
//! Priority inclusion of up to five signed transactions as one atomic bundle.

use async_trait::async_trait;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, transaction::Transaction};
use thiserror::Error;

/// Most transactions accepted in one bundle
pub const MAX_BUNDLE_TRANSACTIONS: usize = 5;

#[derive(Error, Debug, Clone)]
pub enum BundleError {
    #[error("Invalid bundle: {0}")]
    Invalid(String),

    #[error("Bundle submission failed: {0}")]
    Submission(String),

    #[error("Bundle status unavailable: {0}")]
    Status(String),
}

/// Where a submitted bundle stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Pending,
    Landed,
    Failed,
}

#[async_trait]
pub trait BundleSubmitter: Send + Sync {
    /// Tip transfer to append as the last instruction of the bundle
    fn tip_instruction(&self, payer: &Pubkey, tip_lamports: u64) -> Result<Instruction, BundleError>;

    /// Submit signed transactions; returns the bundle id
    async fn submit(&self, transactions: &[Transaction]) -> Result<String, BundleError>;

    async fn poll(&self, bundle_id: &str) -> Result<BundleState, BundleError>;
}
