//! Signing Port

use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::Transaction};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SignerError {
    #[error("Failed to sign transaction: {0}")]
    Signing(String),
}

/// Key holder. Key material handling stays behind this trait.
pub trait TransactionSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    fn sign_message(&self, message: &[u8]) -> Signature;

    /// Sign in place using the transaction's recent blockhash
    fn sign_transaction(&self, transaction: &mut Transaction) -> Result<(), SignerError>;
}
