use async_trait::async_trait;
use solana_client::{
    rpc_client::RpcClient,
    rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig},
};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::{option_serializer::OptionSerializer, UiTransactionEncoding};
use std::str::FromStr;
use std::sync::Arc;

use crate::ports::chain::{ChainTransport, ConfirmationStatus, TransportError};

/// Solana RPC client with async-compatible methods
#[derive(Clone)]
pub struct SolanaClient {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl SolanaClient {
    pub fn new(rpc_url: String) -> Self {
        Self::with_commitment(rpc_url, CommitmentConfig::confirmed())
    }

    pub fn with_commitment(rpc_url: String, commitment: CommitmentConfig) -> Self {
        let client = Arc::new(RpcClient::new_with_commitment(rpc_url, commitment));
        Self { client, commitment }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }

    /// Run a sync RPC call on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T, TransportError>
    where
        F: FnOnce(&RpcClient) -> Result<T, TransportError> + Send + 'static,
        T: Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| TransportError::Rpc(format!("Task join error: {}", e)))?
    }
}

fn rpc_err(e: impl std::fmt::Display) -> TransportError {
    TransportError::Rpc(e.to_string())
}

fn parse_amount(amount: &str) -> Result<u64, TransportError> {
    amount
        .parse::<u64>()
        .map_err(|e| TransportError::Rpc(format!("Parse error: {}", e)))
}

#[async_trait]
impl ChainTransport for SolanaClient {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, TransportError> {
        let address = *address;
        let commitment = self.commitment;
        self.blocking(move |client| {
            client
                .get_account_with_commitment(&address, commitment)
                .map(|response| response.value.map(|account| account.data))
                .map_err(rpc_err)
        })
        .await
    }

    async fn get_token_balance(&self, account: &Pubkey) -> Result<u64, TransportError> {
        let account = *account;
        self.blocking(move |client| {
            let balance = client.get_token_account_balance(&account).map_err(rpc_err)?;
            parse_amount(&balance.amount)
        })
        .await
    }

    async fn get_largest_token_accounts(&self, mint: &Pubkey) -> Result<Vec<u64>, TransportError> {
        let mint = *mint;
        self.blocking(move |client| {
            client
                .get_token_largest_accounts(&mint)
                .map_err(rpc_err)?
                .iter()
                .map(|holder| parse_amount(&holder.amount.amount))
                .collect()
        })
        .await
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, TransportError> {
        let address = *address;
        self.blocking(move |client| client.get_balance(&address).map_err(rpc_err))
            .await
    }

    async fn get_instruction_accounts(
        &self,
        signature: &str,
        program_id: &Pubkey,
    ) -> Result<Option<Vec<Pubkey>>, TransportError> {
        let signature = Signature::from_str(signature)
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?;
        let program_id = *program_id;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        self.blocking(move |client| {
            let confirmed = client
                .get_transaction_with_config(&signature, config)
                .map_err(rpc_err)?;
            let Some(transaction) = confirmed.transaction.transaction.decode() else {
                return Ok(None);
            };

            // Static keys, then lookup-table writable, then readonly
            let mut keys: Vec<Pubkey> = transaction.message.static_account_keys().to_vec();
            if let Some(meta) = &confirmed.transaction.meta {
                if let OptionSerializer::Some(loaded) = &meta.loaded_addresses {
                    for address in loaded.writable.iter().chain(loaded.readonly.iter()) {
                        keys.push(Pubkey::from_str(address).map_err(|e| {
                            TransportError::InvalidAddress(e.to_string())
                        })?);
                    }
                }
            }

            let accounts = transaction
                .message
                .instructions()
                .iter()
                .find(|ix| keys.get(ix.program_id_index as usize) == Some(&program_id))
                .map(|ix| {
                    ix.accounts
                        .iter()
                        .filter_map(|i| keys.get(*i as usize).copied())
                        .collect()
                });
            Ok(accounts)
        })
        .await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, TransportError> {
        self.blocking(|client| client.get_latest_blockhash().map_err(rpc_err))
            .await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, TransportError> {
        let tx = transaction.clone();
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(3),
            ..Default::default()
        };
        self.blocking(move |client| {
            client
                .send_transaction_with_config(&tx, config)
                .map_err(|e| TransportError::TransactionRejected(e.to_string()))
        })
        .await
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<ConfirmationStatus, TransportError> {
        let signature = *signature;
        let commitment = self.commitment;
        self.blocking(move |client| {
            let statuses = client.get_signature_statuses(&[signature]).map_err(rpc_err)?;
            Ok(match statuses.value.into_iter().next().flatten() {
                None => ConfirmationStatus::Pending,
                Some(status) => match &status.err {
                    Some(err) => ConfirmationStatus::Failed(err.to_string()),
                    None if status.satisfies_commitment(commitment) => {
                        ConfirmationStatus::Confirmed
                    }
                    None => ConfirmationStatus::Pending,
                },
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = SolanaClient::new("https://api.devnet.solana.com".to_string());
        assert_eq!(client.url(), "https://api.devnet.solana.com");
    }

    #[tokio::test]
    async fn test_invalid_signature_rejected() {
        let client = SolanaClient::new("http://127.0.0.1:1".to_string());
        let result = client
            .get_instruction_accounts("not-a-signature", &Pubkey::new_unique())
            .await;
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("42").unwrap(), 42);
        assert!(matches!(parse_amount("x"), Err(TransportError::Rpc(_))));
    }
}
