//! Jito block engine client
//!
//! Bundles are 1-5 signed transactions sent as base64 bincode. The tip
//! transfer must be part of the last transaction in the bundle.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, system_instruction, transaction::Transaction,
};
use tracing::{debug, info, warn};

use super::config::{random_tip_account, JitoConfig};
use super::error::JitoError;
use super::types::{BundleStatuses, JsonRpcRequest, JsonRpcResponse};
use crate::ports::bundle::{BundleError, BundleState, BundleSubmitter, MAX_BUNDLE_TRANSACTIONS};

const SUBMIT_RETRIES: u32 = 2;
const SUBMIT_RETRY_DELAY: Duration = Duration::from_millis(200);

pub fn encode_transaction(transaction: &Transaction) -> Result<String, JitoError> {
    let bytes =
        bincode::serialize(transaction).map_err(|e| JitoError::Serialization(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

#[derive(Debug, Clone)]
pub struct JitoClient {
    config: JitoConfig,
    http: Client,
}

impl JitoClient {
    pub fn new(config: JitoConfig) -> Result<Self, JitoError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| JitoError::Http(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &JitoConfig {
        &self.config
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: P,
    ) -> Result<R, JitoError> {
        let url = format!("{}/api/v1/bundles", self.config.block_engine_url);
        let mut request = self.http.post(&url).json(&JsonRpcRequest::new(method, params));
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(JitoError::RateLimited);
        }
        let body: JsonRpcResponse<R> = serde_json::from_str(&response.text().await?)?;
        if let Some(error) = body.error {
            return Err(JitoError::Api {
                code: error.code,
                message: error.message,
            });
        }
        body.result
            .ok_or_else(|| JitoError::Response(format!("{} returned no result", method)))
    }

    pub async fn send_bundle(&self, transactions: &[Transaction]) -> Result<String, JitoError> {
        validate_bundle_size(transactions.len())?;
        let encoded = transactions
            .iter()
            .map(encode_transaction)
            .collect::<Result<Vec<_>, _>>()?;

        let bundle_id: String = self.call("sendBundle", vec![encoded]).await?;
        info!("Bundle submitted: {} ({} txs)", bundle_id, transactions.len());
        Ok(bundle_id)
    }

    pub async fn bundle_state(&self, bundle_id: &str) -> Result<BundleState, JitoError> {
        let statuses: BundleStatuses = self
            .call("getBundleStatuses", vec![vec![bundle_id.to_string()]])
            .await?;
        let state = statuses
            .value
            .into_iter()
            .flatten()
            .find(|entry| entry.bundle_id == bundle_id)
            .map(|entry| entry.state())
            .unwrap_or(BundleState::Pending);
        debug!("Bundle {} state: {:?}", bundle_id, state);
        Ok(state)
    }
}

fn validate_bundle_size(len: usize) -> Result<(), JitoError> {
    if len == 0 {
        return Err(JitoError::InvalidBundle("bundle is empty".into()));
    }
    if len > MAX_BUNDLE_TRANSACTIONS {
        return Err(JitoError::InvalidBundle(format!(
            "{} transactions, at most {} allowed",
            len, MAX_BUNDLE_TRANSACTIONS
        )));
    }
    Ok(())
}

#[async_trait]
impl BundleSubmitter for JitoClient {
    fn tip_instruction(&self, payer: &Pubkey, tip_lamports: u64) -> Result<Instruction, BundleError> {
        if tip_lamports == 0 {
            return Err(BundleError::Invalid("tip must be non-zero".into()));
        }
        let tip_account = Pubkey::from_str(random_tip_account())
            .map_err(|e| BundleError::Invalid(format!("tip account: {}", e)))?;
        Ok(system_instruction::transfer(payer, &tip_account, tip_lamports))
    }

    async fn submit(&self, transactions: &[Transaction]) -> Result<String, BundleError> {
        let mut attempt = 0;
        loop {
            match self.send_bundle(transactions).await {
                Ok(id) => return Ok(id),
                Err(e) if e.is_retryable() && attempt < SUBMIT_RETRIES => {
                    attempt += 1;
                    warn!("Bundle submission failed ({}), retry {}/{}", e, attempt, SUBMIT_RETRIES);
                    tokio::time::sleep(SUBMIT_RETRY_DELAY * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn poll(&self, bundle_id: &str) -> Result<BundleState, BundleError> {
        Ok(self.bundle_state(bundle_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::jito::config::TIP_ACCOUNTS;
    use solana_sdk::{
        hash::Hash,
        signature::{Keypair, Signer},
        system_program,
    };

    fn client() -> JitoClient {
        JitoClient::new(JitoConfig::default()).unwrap()
    }

    #[test]
    fn test_tip_goes_to_known_account() {
        let payer = Pubkey::new_unique();
        let ix = client().tip_instruction(&payer, 25_000).unwrap();
        assert_eq!(ix.program_id, system_program::ID);
        assert_eq!(ix.accounts[0].pubkey, payer);
        let recipient = ix.accounts[1].pubkey.to_string();
        assert!(TIP_ACCOUNTS.contains(&recipient.as_str()));
    }

    #[test]
    fn test_zero_tip_rejected() {
        let result = client().tip_instruction(&Pubkey::new_unique(), 0);
        assert!(matches!(result, Err(BundleError::Invalid(_))));
    }

    #[test]
    fn test_bundle_size_limits() {
        assert!(validate_bundle_size(0).is_err());
        assert!(validate_bundle_size(1).is_ok());
        assert!(validate_bundle_size(MAX_BUNDLE_TRANSACTIONS).is_ok());
        assert!(validate_bundle_size(MAX_BUNDLE_TRANSACTIONS + 1).is_err());
    }

    #[tokio::test]
    async fn test_oversized_bundle_rejected_before_send() {
        let txs = vec![Transaction::default(); MAX_BUNDLE_TRANSACTIONS + 1];
        let result = client().submit(&txs).await;
        assert!(matches!(result, Err(BundleError::Invalid(_))));
    }

    #[test]
    fn test_encode_round_trips_through_bincode() {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        let tx = Transaction::new_signed_with_payer(&[ix], Some(&payer.pubkey()), &[&payer], Hash::new_unique());

        let encoded = encode_transaction(&tx).unwrap();
        let decoded: Transaction = bincode::deserialize(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded.signatures, tx.signatures);
    }
}
