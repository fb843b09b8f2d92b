use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::ports::signer::{SignerError, TransactionSigner};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Failed to load keypair from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("Invalid keypair bytes: {0}")]
    InvalidKeypair(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trading keypair. The sniper signs every buy and sell with this.
pub struct WalletManager {
    keypair: Keypair,
}

impl WalletManager {
    /// Load from a Solana CLI keypair file (JSON byte array). `~` and
    /// `$VARS` in the path are expanded.
    pub fn from_file(path: &str) -> Result<Self, WalletError> {
        let expanded = shellexpand::full(path)
            .map_err(|e| WalletError::Load {
                path: path.to_string(),
                reason: e.to_string(),
            })?
            .into_owned();

        let contents = fs::read_to_string(Path::new(&expanded)).map_err(|e| WalletError::Load {
            path: expanded.clone(),
            reason: e.to_string(),
        })?;

        let bytes: Vec<u8> = serde_json::from_str(&contents).map_err(|e| WalletError::Load {
            path: expanded.clone(),
            reason: format!("invalid JSON: {}", e),
        })?;

        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let keypair =
            Keypair::try_from(bytes).map_err(|e| WalletError::InvalidKeypair(e.to_string()))?;
        Ok(Self { keypair })
    }

    /// Load from a base58-encoded 64-byte secret key (Phantom export format)
    pub fn from_base58(encoded: &str) -> Result<Self, WalletError> {
        let bytes = bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|e| WalletError::InvalidKeypair(format!("invalid base58: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Throwaway key for paper trading
    pub fn new_random() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    pub fn public_key(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self {
            keypair: self.keypair.insecure_clone(),
        }
    }
}

impl TransactionSigner for WalletManager {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn sign_message(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }

    fn sign_transaction(&self, transaction: &mut Transaction) -> Result<(), SignerError> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| SignerError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{hash::Hash, system_instruction};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_keypair(wallet: &WalletManager) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&wallet.keypair().to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let wallet = WalletManager::new_random();
        let file = write_keypair(&wallet);

        let loaded = WalletManager::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.pubkey(), wallet.pubkey());
    }

    #[test]
    fn test_env_var_in_path_is_expanded() {
        let wallet = WalletManager::new_random();
        let file = write_keypair(&wallet);
        let dir = file.path().parent().unwrap().to_str().unwrap().to_string();
        let name = file.path().file_name().unwrap().to_str().unwrap().to_string();
        std::env::set_var("SNIPER_TEST_KEY_DIR", &dir);

        let loaded = WalletManager::from_file(&format!("$SNIPER_TEST_KEY_DIR/{}", name)).unwrap();
        assert_eq!(loaded.pubkey(), wallet.pubkey());
    }

    #[test]
    fn test_missing_file() {
        let result = WalletManager::from_file("/nonexistent/keypair.json");
        assert!(matches!(result, Err(WalletError::Load { .. })));
    }

    #[test]
    fn test_invalid_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not valid json").unwrap();
        file.flush().unwrap();

        let result = WalletManager::from_file(file.path().to_str().unwrap());
        assert!(matches!(result, Err(WalletError::Load { .. })));
    }

    #[test]
    fn test_load_from_base58() {
        let wallet = WalletManager::new_random();
        let encoded = bs58::encode(wallet.keypair().to_bytes()).into_string();

        let loaded = WalletManager::from_base58(&format!("{}\n", encoded)).unwrap();
        assert_eq!(loaded.pubkey(), wallet.pubkey());
        assert!(matches!(
            WalletManager::from_base58("0OIl"),
            Err(WalletError::InvalidKeypair(_))
        ));
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(WalletManager::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_sign_transaction() {
        let wallet = WalletManager::new_random();
        let ix = system_instruction::transfer(&wallet.pubkey(), &Pubkey::new_unique(), 1);
        let mut tx = Transaction::new_with_payer(&[ix], Some(&wallet.pubkey()));
        tx.message.recent_blockhash = Hash::new_unique();

        wallet.sign_transaction(&mut tx).unwrap();
        assert!(tx.is_signed());
        assert!(tx.verify().is_ok());
    }

    #[test]
    fn test_clone_keeps_key() {
        let wallet = WalletManager::new_random();
        assert_eq!(wallet.clone().public_key(), wallet.public_key());
        assert_eq!(wallet.sign_message(b"x").as_ref().len(), 64);
    }
}
