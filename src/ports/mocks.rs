//! In-memory port implementations with recorded calls and scripted responses

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, instruction::Instruction, pubkey::Pubkey, signature::Signature,
    system_instruction, transaction::Transaction,
};

use super::bundle::{BundleError, BundleState, BundleSubmitter, MAX_BUNDLE_TRANSACTIONS};
use super::chain::{ChainTransport, ConfirmationStatus, TransportError};
use super::market_data::{MarketDataError, MarketDataProvider, PricePoint, Timeframe};
use super::reputation::{ReputationError, ReputationProvider, ReputationReport};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock chain with settable accounts and balances
#[derive(Debug, Default, Clone)]
pub struct MockChain {
    accounts: Arc<Mutex<HashMap<Pubkey, Vec<u8>>>>,
    token_balances: Arc<Mutex<HashMap<Pubkey, u64>>>,
    largest: Arc<Mutex<HashMap<Pubkey, Vec<u64>>>>,
    instruction_accounts: Arc<Mutex<HashMap<String, Vec<Pubkey>>>>,
    sent: Arc<Mutex<Vec<Transaction>>>,
    /// Remaining sends that will be rejected
    failing_sends: Arc<Mutex<u32>>,
    status: Arc<Mutex<Option<ConfirmationStatus>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, address: Pubkey, data: Vec<u8>) -> Self {
        self.set_account(address, data);
        self
    }

    pub fn with_token_balance(self, account: Pubkey, amount: u64) -> Self {
        self.set_token_balance(account, amount);
        self
    }

    pub fn with_largest_accounts(self, mint: Pubkey, amounts: Vec<u64>) -> Self {
        guard(&self.largest).insert(mint, amounts);
        self
    }

    pub fn with_instruction_accounts(self, signature: &str, accounts: Vec<Pubkey>) -> Self {
        guard(&self.instruction_accounts).insert(signature.to_string(), accounts);
        self
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        guard(&self.accounts).insert(address, data);
    }

    pub fn set_token_balance(&self, account: Pubkey, amount: u64) {
        guard(&self.token_balances).insert(account, amount);
    }

    /// Reject the next `n` sends
    pub fn fail_next_sends(&self, n: u32) {
        *guard(&self.failing_sends) = n;
    }

    /// Every call returns an RPC error while set
    pub fn set_unavailable(&self, unavailable: bool) {
        *guard(&self.unavailable) = unavailable;
    }

    pub fn set_confirmation(&self, status: ConfirmationStatus) {
        *guard(&self.status) = Some(status);
    }

    pub fn sent_transactions(&self) -> Vec<Transaction> {
        guard(&self.sent).clone()
    }

    fn check_available(&self) -> Result<(), TransportError> {
        if *guard(&self.unavailable) {
            return Err(TransportError::Rpc("mock transport unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainTransport for MockChain {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, TransportError> {
        self.check_available()?;
        Ok(guard(&self.accounts).get(address).cloned())
    }

    async fn get_token_balance(&self, account: &Pubkey) -> Result<u64, TransportError> {
        self.check_available()?;
        guard(&self.token_balances)
            .get(account)
            .copied()
            .ok_or_else(|| TransportError::Rpc(format!("could not find account {}", account)))
    }

    async fn get_largest_token_accounts(&self, mint: &Pubkey) -> Result<Vec<u64>, TransportError> {
        self.check_available()?;
        Ok(guard(&self.largest).get(mint).cloned().unwrap_or_default())
    }

    async fn get_balance(&self, _address: &Pubkey) -> Result<u64, TransportError> {
        self.check_available()?;
        Ok(1_000_000_000)
    }

    async fn get_instruction_accounts(
        &self,
        signature: &str,
        _program_id: &Pubkey,
    ) -> Result<Option<Vec<Pubkey>>, TransportError> {
        self.check_available()?;
        Ok(guard(&self.instruction_accounts).get(signature).cloned())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, TransportError> {
        self.check_available()?;
        Ok(Hash::new_unique())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, TransportError> {
        self.check_available()?;
        {
            let mut failing = guard(&self.failing_sends);
            if *failing > 0 {
                *failing -= 1;
                return Err(TransportError::TransactionRejected(
                    "mock send failure".to_string(),
                ));
            }
        }
        guard(&self.sent).push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn get_signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<ConfirmationStatus, TransportError> {
        self.check_available()?;
        Ok(guard(&self.status)
            .clone()
            .unwrap_or(ConfirmationStatus::Confirmed))
    }
}

/// Scripted response of one mock provider for one token
#[derive(Debug, Clone, Default)]
pub struct ProviderScript {
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,
    pub price: Option<f64>,
    pub history: Vec<PricePoint>,
    pub fail: bool,
    pub delay_ms: u64,
}

/// Mock market data provider that records calls
#[derive(Debug, Clone)]
pub struct MockMarketData {
    name: String,
    confidence: f64,
    calls: Arc<Mutex<Vec<String>>>,
    scripts: Arc<Mutex<HashMap<String, ProviderScript>>>,
}

impl MockMarketData {
    pub fn new(name: &str, confidence: f64) -> Self {
        Self {
            name: name.to_string(),
            confidence,
            calls: Arc::new(Mutex::new(Vec::new())),
            scripts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_script(self, token: &str, script: ProviderScript) -> Self {
        guard(&self.scripts).insert(token.to_string(), script);
        self
    }

    pub fn with_volume(self, token: &str, volume: f64) -> Self {
        let script = ProviderScript {
            volume: Some(volume),
            ..self.script(token)
        };
        self.with_script(token, script)
    }

    pub fn with_liquidity(self, token: &str, liquidity: f64) -> Self {
        let script = ProviderScript {
            liquidity: Some(liquidity),
            ..self.script(token)
        };
        self.with_script(token, script)
    }

    pub fn with_price(self, token: &str, price: f64) -> Self {
        let script = ProviderScript {
            price: Some(price),
            ..self.script(token)
        };
        self.with_script(token, script)
    }

    pub fn failing(self, token: &str) -> Self {
        let script = ProviderScript {
            fail: true,
            ..self.script(token)
        };
        self.with_script(token, script)
    }

    pub fn get_calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }

    fn script(&self, token: &str) -> ProviderScript {
        guard(&self.scripts).get(token).cloned().unwrap_or_default()
    }

    async fn respond(&self, token: &str, call: &str) -> Result<ProviderScript, MarketDataError> {
        guard(&self.calls).push(format!("{}:{}", call, token));
        let script = self.script(token);
        if script.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(script.delay_ms)).await;
        }
        if script.fail {
            return Err(MarketDataError::Http("mock provider failure".to_string()));
        }
        Ok(script)
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_confidence(&self) -> f64 {
        self.confidence
    }

    async fn get_volume_24h(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(self.respond(token, "volume").await?.volume)
    }

    async fn get_liquidity(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(self.respond(token, "liquidity").await?.liquidity)
    }

    async fn get_price(&self, token: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(self.respond(token, "price").await?.price)
    }

    async fn get_price_history(
        &self,
        token: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let history = self.respond(token, "history").await?.history;
        let skip = history.len().saturating_sub(count);
        Ok(history.into_iter().skip(skip).collect())
    }
}

/// Mock reputation service
#[derive(Debug, Clone, Default)]
pub struct MockReputation {
    reports: Arc<Mutex<HashMap<String, ReputationReport>>>,
    calls: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MockReputation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(self, report: ReputationReport) -> Self {
        guard(&self.reports).insert(report.mint.clone(), report);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn get_calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }
}

#[async_trait]
impl ReputationProvider for MockReputation {
    async fn get_report(&self, mint: &str) -> Result<ReputationReport, ReputationError> {
        guard(&self.calls).push(mint.to_string());
        if self.fail {
            return Err(ReputationError::Http("mock reputation failure".to_string()));
        }
        guard(&self.reports)
            .get(mint)
            .cloned()
            .ok_or_else(|| ReputationError::NotFound(mint.to_string()))
    }
}

/// Mock bundle channel; every bundle lands unless told otherwise
#[derive(Debug, Clone, Default)]
pub struct MockBundles {
    submitted: Arc<Mutex<Vec<Vec<Transaction>>>>,
    outcome: Arc<Mutex<Option<BundleState>>>,
}

impl MockBundles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_outcome(&self, state: BundleState) {
        *guard(&self.outcome) = Some(state);
    }

    pub fn submitted(&self) -> Vec<Vec<Transaction>> {
        guard(&self.submitted).clone()
    }
}

#[async_trait]
impl BundleSubmitter for MockBundles {
    fn tip_instruction(&self, payer: &Pubkey, tip_lamports: u64) -> Result<Instruction, BundleError> {
        Ok(system_instruction::transfer(payer, &Pubkey::new_unique(), tip_lamports))
    }

    async fn submit(&self, transactions: &[Transaction]) -> Result<String, BundleError> {
        if transactions.is_empty() || transactions.len() > MAX_BUNDLE_TRANSACTIONS {
            return Err(BundleError::Invalid(format!(
                "{} transactions",
                transactions.len()
            )));
        }
        let mut submitted = guard(&self.submitted);
        submitted.push(transactions.to_vec());
        Ok(format!("bundle-{}", submitted.len()))
    }

    async fn poll(&self, _bundle_id: &str) -> Result<BundleState, BundleError> {
        Ok(guard(&self.outcome).unwrap_or(BundleState::Landed))
    }
}
