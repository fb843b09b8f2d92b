//! Chain Transport Port
//!
//! RPC surface the sniper needs from a Solana node, plus the event types the
//! log-stream adapter pushes into the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction};
use thiserror::Error;

/// Transport failures. Recovered by retry or resubscribe, never fatal.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Request timed out")]
    Timeout,
}

/// One `logsSubscribe` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogNotification {
    pub signature: String,
    pub logs: Vec<String>,
    /// Transaction-level error reported by the node
    pub failed: bool,
}

/// Events emitted by the log stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Notification(LogNotification),
    ConnectionState { connected: bool, reconnect_count: u32 },
    Error { message: String },
}

/// Signature confirmation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Not yet seen or not yet at the requested commitment
    Pending,
    Confirmed,
    Failed(String),
}

#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// Raw account data, `None` if the account does not exist
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, TransportError>;

    /// Raw amount held by an SPL token account
    async fn get_token_balance(&self, account: &Pubkey) -> Result<u64, TransportError>;

    /// Raw amounts of the largest holders of `mint`, descending
    async fn get_largest_token_accounts(&self, mint: &Pubkey) -> Result<Vec<u64>, TransportError>;

    /// Lamport balance of a system account
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, TransportError>;

    /// Accounts of the first top-level instruction to `program_id` in a
    /// confirmed transaction
    async fn get_instruction_accounts(
        &self,
        signature: &str,
        program_id: &Pubkey,
    ) -> Result<Option<Vec<Pubkey>>, TransportError>;

    async fn get_latest_blockhash(&self) -> Result<Hash, TransportError>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, TransportError>;

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<ConfirmationStatus, TransportError>;
}
