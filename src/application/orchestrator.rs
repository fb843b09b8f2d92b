//! Sniper Orchestrator
//!
//! Consumes the log stream in arrival order, turns pool-creation logs into
//! `PoolInfo`, and hands each detection to its own task: gate, buy, open
//! the position, then poll its price until an exit fires and the sell
//! confirms. Shared state (rate limits, positions) sits behind tokio mutexes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use solana_sdk::{
    hash::Hash, instruction::Instruction, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::stats::{Stats, StatsSnapshot};
use crate::domain::extraction::{ExtractionContext, PoolExtractor};
use crate::domain::known_programs::{RAYDIUM_AMM_V4, RAYDIUM_CP_SWAP};
use crate::domain::log_classifier::LogClassifier;
use crate::domain::pool::{PoolInfo, PoolVariant, SwapPoolKeys};
use crate::domain::swap::associated_token_address;
use crate::domain::trade_gate::{token_price, BuyPlan, GateDecision, GateError, TradeGate};
use crate::domain::triggers::{ExitSignal, PositionTriggerEngine, TriggerError};
use crate::ports::bundle::{BundleError, BundleState, BundleSubmitter};
use crate::ports::chain::{
    ChainTransport, ConfirmationStatus, LogNotification, StreamEvent, TransportError,
};
use crate::ports::signer::{SignerError, TransactionSigner};

/// Build, send or confirm failures. Never stop the main loop.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Signing error: {0}")]
    Signing(#[from] SignerError),

    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Position error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Transaction {signature} not confirmed after {attempts} attempts")]
    NotConfirmed { signature: String, attempts: u32 },

    #[error("Transaction failed on-chain: {0}")]
    TransactionFailed(String),

    #[error("No entry price for {0}")]
    NoEntryPrice(Pubkey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Detect and score only when false
    pub auto_buy: bool,
    /// Simulate submission; positions open at the observed price
    pub paper_trading: bool,
    pub buy_delay: Duration,
    pub sell_slippage_bps: u16,
    pub confirm_attempts: u32,
    pub confirm_delay: Duration,
    pub price_poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Most recent signatures remembered for dedup
    pub seen_signatures_capacity: usize,
    /// Grace on top of the confirmation budget before stop aborts tasks
    pub drain_timeout: Duration,
    /// Submit through the bundle channel with this tip when set
    pub jito_tip_lamports: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_buy: false,
            paper_trading: true,
            buy_delay: Duration::ZERO,
            sell_slippage_bps: 100,
            confirm_attempts: 30,
            confirm_delay: Duration::from_secs(1),
            price_poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(30),
            seen_signatures_capacity: 10_000,
            drain_timeout: Duration::from_secs(10),
            jito_tip_lamports: None,
        }
    }
}

/// Status snapshot of the orchestrator
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub paper_trading: bool,
    pub auto_buy: bool,
    pub open_positions: usize,
    pub trades_last_hour: usize,
    pub active_tasks: usize,
    pub stats: StatsSnapshot,
}

/// What was handed to the network for one swap
#[derive(Debug, Clone)]
enum Submission {
    Transaction(Signature),
    Bundle { id: String, signature: Signature },
}

impl Submission {
    fn signature(&self) -> Signature {
        match self {
            Submission::Transaction(sig) => *sig,
            Submission::Bundle { signature, .. } => *signature,
        }
    }
}

/// Bounded FIFO set of processed signatures
#[derive(Debug)]
struct SeenSignatures {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl SeenSignatures {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// False if already present
    fn insert(&mut self, signature: &str) -> bool {
        if self.set.contains(signature) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(signature.to_string());
        self.set.insert(signature.to_string());
        true
    }
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn program_for(variant: PoolVariant) -> Option<Pubkey> {
    match variant {
        PoolVariant::AmmV4 => Some(RAYDIUM_AMM_V4),
        PoolVariant::CpSwap => Some(RAYDIUM_CP_SWAP),
        PoolVariant::Unknown => None,
    }
}

/// Event loop over the log stream plus the per-token tasks it spawns
pub struct Orchestrator {
    config: OrchestratorConfig,
    chain: Arc<dyn ChainTransport>,
    signer: Arc<dyn TransactionSigner>,
    bundles: Option<Arc<dyn BundleSubmitter>>,
    classifier: Arc<LogClassifier>,
    extractor: Arc<PoolExtractor>,
    gate: Arc<TradeGate>,
    engine: Arc<Mutex<PositionTriggerEngine>>,
    stats: Arc<Stats>,
    /// Serializes the re-check and submission of buys
    buy_lock: Arc<Mutex<()>>,
    /// Tokens currently between detection and an open position
    in_flight: Arc<Mutex<HashSet<Pubkey>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    is_running: Arc<RwLock<bool>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Clone for Orchestrator {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            chain: Arc::clone(&self.chain),
            signer: Arc::clone(&self.signer),
            bundles: self.bundles.clone(),
            classifier: Arc::clone(&self.classifier),
            extractor: Arc::clone(&self.extractor),
            gate: Arc::clone(&self.gate),
            engine: Arc::clone(&self.engine),
            stats: Arc::clone(&self.stats),
            buy_lock: Arc::clone(&self.buy_lock),
            in_flight: Arc::clone(&self.in_flight),
            tasks: Arc::clone(&self.tasks),
            is_running: Arc::clone(&self.is_running),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        chain: Arc<dyn ChainTransport>,
        signer: Arc<dyn TransactionSigner>,
        gate: TradeGate,
        engine: PositionTriggerEngine,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            chain,
            signer,
            bundles: None,
            classifier: Arc::new(LogClassifier::default()),
            extractor: Arc::new(PoolExtractor::default()),
            gate: Arc::new(gate),
            engine: Arc::new(Mutex::new(engine)),
            stats: Arc::new(Stats::new()),
            buy_lock: Arc::new(Mutex::new(())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tasks: Arc::new(Mutex::new(Vec::new())),
            is_running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Route live submissions through a bundle channel
    pub fn with_bundles(mut self, bundles: Arc<dyn BundleSubmitter>) -> Self {
        self.bundles = Some(bundles);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn positions(&self) -> Arc<Mutex<PositionTriggerEngine>> {
        Arc::clone(&self.engine)
    }

    /// Receiver that flips to `true` on stop; hand it to the log stream
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Consume stream events until stopped or the stream closes
    pub async fn run(&self, mut events: mpsc::Receiver<StreamEvent>) -> Result<(), OrchestratorError> {
        *self.is_running.write().await = true;
        let mut shutdown = self.shutdown.subscribe();
        let mut seen = SeenSignatures::new(self.config.seen_signatures_capacity);
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.tick().await;

        tracing::info!(
            "Starting sniper - Paper mode: {}, Auto-buy: {}, Programs: {}",
            self.config.paper_trading,
            self.config.auto_buy,
            self.classifier.program_ids().len()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, &mut seen).await,
                    None => {
                        tracing::warn!("Log stream closed");
                        break;
                    }
                },
                _ = heartbeat.tick() => self.heartbeat().await,
            }
        }

        self.shutdown.send_replace(true);
        self.drain_tasks().await;
        *self.is_running.write().await = false;
        tracing::info!("Sniper stopped: {}", self.stats.snapshot());
        Ok(())
    }

    /// Signal the run loop, the log stream and every poller to stop
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        tracing::info!("Stop signal sent to orchestrator");
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let trades_last_hour = {
            let limits = self.gate.rate_limits();
            let limits = limits.lock().await;
            limits.trades_in_window(unix_now())
        };
        let active_tasks = self
            .tasks
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_finished())
            .count();

        OrchestratorStatus {
            is_running: *self.is_running.read().await,
            paper_trading: self.config.paper_trading,
            auto_buy: self.config.auto_buy,
            open_positions: self.engine.lock().await.len(),
            trades_last_hour,
            active_tasks,
            stats: self.stats.snapshot(),
        }
    }

    async fn handle_event(&self, event: StreamEvent, seen: &mut SeenSignatures) {
        match event {
            StreamEvent::Notification(notification) => {
                self.stats.transaction_seen();
                if notification.failed {
                    return;
                }
                if !seen.insert(&notification.signature) {
                    tracing::debug!("Already processed {}", notification.signature);
                    return;
                }
                if let Some(pool) = self.detect(&notification).await {
                    self.spawn_pool_task(pool).await;
                }
            }
            StreamEvent::ConnectionState {
                connected,
                reconnect_count,
            } => {
                if connected {
                    tracing::info!("Log stream connected (reconnects: {})", reconnect_count);
                } else {
                    tracing::warn!("Log stream disconnected (reconnects: {})", reconnect_count);
                }
            }
            StreamEvent::Error { message } => tracing::warn!("Log stream error: {}", message),
        }
    }

    /// Classify and extract one transaction. Failures count, never raise.
    pub async fn detect(&self, notification: &LogNotification) -> Option<PoolInfo> {
        let classification = self.classifier.classify(&notification.logs);
        if !classification.is_pool_creation {
            return None;
        }

        let ctx = ExtractionContext::new(
            &notification.signature,
            &notification.logs,
            classification.variant,
            unix_now(),
        )
        .with_init_log(classification.init_log.as_deref());

        let accounts = if self.extractor.needs_accounts(&ctx) {
            self.fetch_accounts(&notification.signature, classification.variant)
                .await
        } else {
            None
        };
        let ctx = ctx.with_accounts(accounts.as_deref());

        match self.extractor.extract(&ctx) {
            Some(pool) => {
                self.stats.pool_detected();
                tracing::info!(
                    "New {} pool: {} token {} (via {:?}, tx {})",
                    pool.variant,
                    pool.pool_address
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                    pool.token_mint(),
                    pool.source,
                    pool.signature
                );
                Some(pool)
            }
            None => {
                self.stats.decode_failed();
                tracing::debug!("Pool creation in {} but nothing decoded", notification.signature);
                None
            }
        }
    }

    async fn fetch_accounts(&self, signature: &str, variant: PoolVariant) -> Option<Vec<Pubkey>> {
        let program = program_for(variant)?;
        match self.chain.get_instruction_accounts(signature, &program).await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::warn!("Could not load accounts for {}: {}", signature, e);
                None
            }
        }
    }

    async fn spawn_pool_task(&self, pool: PoolInfo) {
        let this = self.clone();
        let handle = tokio::spawn(async move { this.handle_pool(pool).await });
        self.track(handle).await;
    }

    async fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Gate one detection and, if approved and enabled, buy it
    pub async fn handle_pool(&self, pool: PoolInfo) {
        let token = pool.token_mint();
        if !self.claim(token).await {
            self.stats.duplicate_skipped();
            tracing::debug!("Duplicate detection for {} ignored", token);
            return;
        }

        if let Err(e) = self.evaluate_and_buy(&pool).await {
            tracing::error!("Buy failed for {}: {}", token, e);
        }
        self.in_flight.lock().await.remove(&token);
    }

    /// Reserve `token` unless it is already in flight or held
    async fn claim(&self, token: Pubkey) -> bool {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.contains(&token) || self.engine.lock().await.contains(&token) {
            return false;
        }
        in_flight.insert(token);
        true
    }

    async fn evaluate_and_buy(&self, pool: &PoolInfo) -> Result<(), OrchestratorError> {
        if !self.config.buy_delay.is_zero() {
            tokio::time::sleep(self.config.buy_delay).await;
        }

        let owner = self.signer.pubkey();
        let plan = match self.gate.evaluate(pool, &owner, unix_now()).await {
            GateDecision::Approved(plan) => plan,
            GateDecision::Rejected(rejection) => {
                if rejection.check.is_security() {
                    self.stats.skipped_security();
                } else {
                    self.stats.skipped_gate();
                }
                tracing::info!("Skipped {}: {}", pool.token_mint(), rejection);
                return Ok(());
            }
        };

        for warning in &plan.warnings {
            tracing::warn!("{}: {}", plan.token_mint, warning);
        }
        if !self.config.auto_buy {
            tracing::info!(
                "Monitor only: {} passed (risk {}, expected {} tokens)",
                plan.token_mint,
                plan.assessment.score,
                plan.expected_out
            );
            return Ok(());
        }

        let _lock = self.buy_lock.lock().await;
        if *self.shutdown.borrow() {
            tracing::info!("Stopping; {} not bought", plan.token_mint);
            return Ok(());
        }
        let token_str = plan.token_mint.to_string();
        if let Err(rejection) = self.gate.check_local(&token_str, unix_now()).await {
            self.stats.skipped_gate();
            tracing::info!("Skipped {} at submission: {}", plan.token_mint, rejection);
            return Ok(());
        }

        let amount = self.execute_buy(&plan).await?;
        let entry_price = plan
            .entry_price
            .ok_or(OrchestratorError::NoEntryPrice(plan.token_mint))?;
        let pool_address = plan.pool.pool_address.unwrap_or_else(|| plan.keys.pool_id());

        self.engine
            .lock()
            .await
            .open(plan.token_mint, pool_address, entry_price, amount, unix_now())?;
        self.stats.pool_bought();

        let this = self.clone();
        let keys = plan.keys.clone();
        let token = plan.token_mint;
        let handle = tokio::spawn(async move { this.poll_position(token, keys).await });
        self.track(handle).await;
        Ok(())
    }

    /// Submit and confirm the buy; returns the token amount held
    async fn execute_buy(&self, plan: &BuyPlan) -> Result<u64, OrchestratorError> {
        if self.config.paper_trading {
            self.gate.record_trade(unix_now()).await;
            tracing::info!(
                "PAPER BUY: {} lamports -> {} {} (min {})",
                plan.amount_in,
                plan.expected_out,
                plan.token_mint,
                plan.min_amount_out
            );
            return Ok(plan.expected_out);
        }

        let submission = self.submit(&plan.instructions).await?;
        self.gate.record_trade(unix_now()).await;
        tracing::info!("Buy submitted for {}: {}", plan.token_mint, submission.signature());

        self.confirm(&submission).await?;
        tracing::info!("Buy confirmed for {}: {}", plan.token_mint, submission.signature());
        Ok(self.filled_amount(plan).await)
    }

    /// Tokens received by the buy, read from the owner's token account.
    /// Falls back to the slippage floor when the balance cannot be read.
    async fn filled_amount(&self, plan: &BuyPlan) -> u64 {
        let program = plan.keys.token_program_for(&plan.token_mint);
        let account = associated_token_address(&self.signer.pubkey(), &plan.token_mint, &program);
        match self.chain.get_token_balance(&account).await {
            Ok(amount) if amount > 0 => {
                if amount < plan.expected_out {
                    tracing::info!(
                        "Filled {} {} (quoted {})",
                        amount,
                        plan.token_mint,
                        plan.expected_out
                    );
                }
                amount
            }
            Ok(_) => {
                tracing::warn!("Token account {} empty after buy; using min out", account);
                plan.min_amount_out
            }
            Err(e) => {
                tracing::warn!("Fill of {} unreadable ({}); using min out", plan.token_mint, e);
                plan.min_amount_out
            }
        }
    }

    fn signed(&self, instructions: &[Instruction], blockhash: Hash) -> Result<Transaction, OrchestratorError> {
        let payer = self.signer.pubkey();
        let mut transaction = Transaction::new_with_payer(instructions, Some(&payer));
        transaction.message.recent_blockhash = blockhash;
        self.signer.sign_transaction(&mut transaction)?;
        Ok(transaction)
    }

    async fn submit(&self, instructions: &[Instruction]) -> Result<Submission, OrchestratorError> {
        let blockhash = self.chain.get_latest_blockhash().await?;
        let transaction = self.signed(instructions, blockhash)?;
        let signature = transaction.signatures.first().copied().unwrap_or_default();

        if let (Some(bundles), Some(tip)) = (&self.bundles, self.config.jito_tip_lamports) {
            let tip_ix = bundles.tip_instruction(&self.signer.pubkey(), tip)?;
            let tip_tx = self.signed(&[tip_ix], blockhash)?;
            let id = bundles.submit(&[transaction, tip_tx]).await?;
            return Ok(Submission::Bundle { id, signature });
        }

        let signature = self.chain.send_transaction(&transaction).await?;
        Ok(Submission::Transaction(signature))
    }

    async fn confirm(&self, submission: &Submission) -> Result<(), OrchestratorError> {
        for attempt in 0..self.config.confirm_attempts {
            let done = match submission {
                Submission::Transaction(signature) => {
                    match self.chain.get_signature_status(signature).await {
                        Ok(ConfirmationStatus::Confirmed) => true,
                        Ok(ConfirmationStatus::Failed(e)) => {
                            return Err(OrchestratorError::TransactionFailed(e))
                        }
                        Ok(ConfirmationStatus::Pending) => false,
                        Err(e) => {
                            tracing::debug!("Status check {} failed: {}", attempt + 1, e);
                            false
                        }
                    }
                }
                Submission::Bundle { id, .. } => match bundles_poll(&self.bundles, id).await {
                    Ok(BundleState::Landed) => true,
                    Ok(BundleState::Failed) => {
                        return Err(OrchestratorError::TransactionFailed(format!(
                            "bundle {} failed",
                            id
                        )))
                    }
                    Ok(BundleState::Pending) => false,
                    Err(e) => {
                        tracing::debug!("Bundle poll {} failed: {}", attempt + 1, e);
                        false
                    }
                },
            };
            if done {
                return Ok(());
            }
            if attempt + 1 < self.config.confirm_attempts {
                tokio::time::sleep(self.config.confirm_delay).await;
            }
        }

        Err(OrchestratorError::NotConfirmed {
            signature: submission.signature().to_string(),
            attempts: self.config.confirm_attempts,
        })
    }

    /// Price loop for one position; ends when it is sold or on shutdown
    async fn poll_position(&self, token: Pubkey, keys: SwapPoolKeys) {
        let mut shutdown = self.shutdown.subscribe();
        tracing::info!("Tracking {} every {:?}", token, self.config.price_poll_interval);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(self.config.price_poll_interval) => {}
            }

            let price = match self.gate.reserves(&keys).await {
                Ok((base, quote)) => token_price(&keys, &token, base, quote),
                Err(e) => {
                    tracing::debug!("Price read failed for {}: {}", token, e);
                    None
                }
            };
            let Some(price) = price else { continue };

            let signal = match self.engine.lock().await.on_price(&token, price, unix_now()) {
                Ok(signal) => signal,
                Err(TriggerError::PositionNotFound(_)) => break,
                Err(e) => {
                    tracing::warn!("Trigger update failed for {}: {}", token, e);
                    continue;
                }
            };

            if let Some(signal) = signal {
                if self.close_position(&keys, &signal).await {
                    break;
                }
            }
        }
        tracing::debug!("Stopped tracking {}", token);
    }

    /// Execute an exit. On failure the trigger is re-armed; true once sold.
    async fn close_position(&self, keys: &SwapPoolKeys, signal: &ExitSignal) -> bool {
        let token = signal.token_mint;
        let amount = match self.engine.lock().await.get(&token) {
            Some(position) => position.token_amount,
            None => return true,
        };

        match self.execute_sell(keys, &token, amount).await {
            Ok(()) => {
                let closed = self.engine.lock().await.confirm_close(&token);
                self.gate.start_cooldown(&token.to_string(), unix_now()).await;
                self.stats.sell_confirmed();
                match closed {
                    Ok(position) => tracing::info!(
                        "Sold {} via {}: pnl {:.2}% (entry {}, exit {})",
                        token,
                        signal.rule.as_str(),
                        signal.pnl_pct,
                        position.entry_price,
                        signal.price
                    ),
                    Err(e) => tracing::warn!("Sold {} but close failed: {}", token, e),
                }
                true
            }
            Err(e) => {
                self.stats.sell_failed();
                tracing::error!("Sell failed for {}: {}", token, e);
                if let Err(e) = self.engine.lock().await.abort_close(&token) {
                    tracing::warn!("Could not re-arm {}: {}", token, e);
                }
                false
            }
        }
    }

    async fn execute_sell(&self, keys: &SwapPoolKeys, token: &Pubkey, amount: u64) -> Result<(), OrchestratorError> {
        if self.config.paper_trading {
            tracing::info!("PAPER SELL: {} {}", amount, token);
            return Ok(());
        }

        let owner = self.signer.pubkey();
        let instructions = self
            .gate
            .plan_sell(keys, &owner, token, amount, self.config.sell_slippage_bps)
            .await?;
        let submission = self.submit(&instructions).await?;
        tracing::info!("Sell submitted for {}: {}", token, submission.signature());
        self.confirm(&submission).await
    }

    async fn heartbeat(&self) {
        let evicted = self.gate.rate_limits().lock().await.evict_expired(unix_now());
        let open = self.engine.lock().await.len();
        tracing::info!(
            "Heartbeat: {} | open positions: {} | evicted cooldowns: {}",
            self.stats.snapshot(),
            open,
            evicted
        );
    }

    /// Longest a submitted swap can spend being confirmed
    fn confirm_budget(&self) -> Duration {
        self.config
            .confirm_delay
            .saturating_mul(self.config.confirm_attempts)
    }

    /// Idle pollers exit on the shutdown signal. Buys and sells already
    /// submitted get the full confirmation budget plus `drain_timeout`
    /// before anything is aborted.
    async fn drain_tasks(&self) {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let pending = handles.len();
        let deadline = self.confirm_budget().saturating_add(self.config.drain_timeout);

        if tokio::time::timeout(deadline, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!("Aborting tasks still running after {:?}", deadline);
            for abort in aborts {
                abort.abort();
            }
        } else {
            tracing::info!("{} tasks finished", pending);
        }
    }
}

async fn bundles_poll(
    bundles: &Option<Arc<dyn BundleSubmitter>>,
    id: &str,
) -> Result<BundleState, BundleError> {
    match bundles {
        Some(b) => b.poll(id).await,
        None => Err(BundleError::Status("no bundle channel".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::solana::WalletManager;
    use crate::domain::layouts::fixtures::ray_log_v1;
    use crate::domain::rate_limit::RateLimitState;
    use crate::domain::risk_scorer::{RiskScorer, RiskScorerConfig};
    use crate::domain::signal_aggregator::{SignalAggregator, SignalAggregatorConfig};
    use crate::domain::trade_gate::fixtures::{v4_pool, PoolEnv};
    use crate::domain::trade_gate::TradeGateConfig;
    use crate::domain::triggers::TriggerSettings;
    use crate::domain::extraction::initialize2;
    use crate::domain::known_programs::{TOKEN_PROGRAM, WSOL_MINT};
    use crate::domain::pool::ExtractionSource;
    use crate::ports::market_data::MarketDataProvider;
    use crate::ports::mocks::{MockBundles, MockMarketData};
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    const TOKEN_RESERVE: u64 = 1_000_000_000_000;
    const SOL_RESERVE: u64 = 50_000_000_000;

    fn fast_config(auto_buy: bool, paper: bool) -> OrchestratorConfig {
        OrchestratorConfig {
            auto_buy,
            paper_trading: paper,
            confirm_attempts: 3,
            confirm_delay: Duration::from_millis(5),
            price_poll_interval: Duration::from_millis(10),
            drain_timeout: Duration::from_millis(200),
            ..OrchestratorConfig::default()
        }
    }

    fn orchestrator(env: &PoolEnv, config: OrchestratorConfig, volume: f64, rate: RateLimitState) -> Orchestrator {
        let token = env.token.to_string();
        let a = MockMarketData::new("birdeye", 0.85)
            .with_volume(&token, volume)
            .with_liquidity(&token, 100_000.0);
        let b = MockMarketData::new("dexscreener", 0.8)
            .with_volume(&token, volume)
            .with_liquidity(&token, 100_000.0);
        let providers: Vec<Arc<dyn MarketDataProvider>> = vec![Arc::new(a), Arc::new(b)];
        let chain: Arc<dyn ChainTransport> = Arc::new(env.chain.clone());

        let gate = TradeGate::new(
            Arc::clone(&chain),
            SignalAggregator::new(providers, SignalAggregatorConfig::default()),
            RiskScorer::new(Arc::clone(&chain), None, RiskScorerConfig::default()),
            rate,
            TradeGateConfig::default(),
        );
        Orchestrator::new(
            config,
            chain,
            Arc::new(WalletManager::new_random()),
            gate,
            PositionTriggerEngine::new(TriggerSettings::default()),
        )
    }

    fn creation_logs(env: &PoolEnv) -> Vec<String> {
        let amm = env.pool.pool_address.unwrap();
        let data = ray_log_v1(&env.amm.market_id, &amm, &env.amm.lp_mint, &env.token, &WSOL_MINT);
        vec![
            format!("Program {} invoke [1]", RAYDIUM_AMM_V4),
            "Program log: initialize2: InitializeInstruction2 { nonce: 254 }".to_string(),
            format!("Program log: ray_log: {}", STANDARD.encode(data)),
            format!("Program {} success", RAYDIUM_AMM_V4),
        ]
    }

    fn notification(signature: &str, logs: Vec<String>) -> StreamEvent {
        StreamEvent::Notification(LogNotification {
            signature: signature.to_string(),
            logs,
            failed: false,
        })
    }

    async fn wait_for<F: Fn(&StatsSnapshot) -> bool>(orch: &Orchestrator, cond: F) -> StatsSnapshot {
        for _ in 0..300 {
            let snap = orch.stats();
            if cond(&snap) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        orch.stats()
    }

    #[test]
    fn test_seen_signatures_bounded() {
        let mut seen = SeenSignatures::new(2);
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.insert("b"));
        assert!(seen.insert("c"));
        // "a" was evicted
        assert!(seen.insert("a"));
        assert_eq!(seen.order.len(), 2);
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(!config.auto_buy);
        assert!(config.paper_trading);
        assert_eq!(config.sell_slippage_bps, 100);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.jito_tip_lamports, None);
    }

    #[tokio::test]
    async fn test_confirm_budget() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, OrchestratorConfig::default(), 100_000.0, RateLimitState::default());
        assert_eq!(orch.confirm_budget(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_detect_decodes_ray_log() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(false, true), 100_000.0, RateLimitState::default());
        let n = LogNotification {
            signature: "sig-detect".to_string(),
            logs: creation_logs(&env),
            failed: false,
        };

        let pool = orch.detect(&n).await.unwrap();
        assert_eq!(pool.pool_address, env.pool.pool_address);
        assert_eq!(pool.token_mint(), env.token);
        assert_eq!(orch.stats().pools_detected, 1);
    }

    #[tokio::test]
    async fn test_detect_falls_back_to_instruction_accounts() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let mut accounts: Vec<Pubkey> = (0..18).map(|_| Pubkey::new_unique()).collect();
        accounts[initialize2::AMM] = env.pool.pool_address.unwrap();
        accounts[initialize2::COIN_MINT] = env.token;
        accounts[initialize2::PC_MINT] = WSOL_MINT;
        // Mock state is shared across clones
        env.chain.clone().with_instruction_accounts("sig-short", accounts);
        let orch = orchestrator(&env, fast_config(false, true), 100_000.0, RateLimitState::default());

        // Init payload too short for either ray_log layout
        let n = LogNotification {
            signature: "sig-short".to_string(),
            logs: vec![
                format!("Program {} invoke [1]", RAYDIUM_AMM_V4),
                format!("Program log: ray_log: {}", STANDARD.encode([0u8; 200])),
                format!("Program {} success", RAYDIUM_AMM_V4),
            ],
            failed: false,
        };

        let pool = orch.detect(&n).await.unwrap();
        assert_eq!(pool.source, ExtractionSource::Initialize2Accounts);
        assert_eq!(pool.pool_address, env.pool.pool_address);
        assert_eq!(pool.token_mint(), env.token);
    }

    #[tokio::test]
    async fn test_swap_logs_not_detected() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(false, true), 100_000.0, RateLimitState::default());
        let n = LogNotification {
            signature: "sig-swap".to_string(),
            logs: vec![
                format!("Program {} invoke [1]", RAYDIUM_AMM_V4),
                "Program log: ray_log: AwAAAAAAAAA=".to_string(),
                format!("Program {} success", RAYDIUM_AMM_V4),
            ],
            failed: false,
        };

        assert!(orch.detect(&n).await.is_none());
        let stats = orch.stats();
        assert_eq!(stats.pools_detected, 0);
        assert_eq!(stats.decode_failures, 0);
    }

    #[tokio::test]
    async fn test_monitor_only_never_buys() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(false, false), 100_000.0, RateLimitState::default());

        orch.handle_pool(env.pool.clone()).await;

        assert!(env.chain.sent_transactions().is_empty());
        assert!(orch.positions().lock().await.is_empty());
        assert_eq!(orch.stats().pools_bought, 0);
    }

    #[tokio::test]
    async fn test_low_volume_counts_as_gate_skip() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(true, true), 100.0, RateLimitState::default());

        orch.handle_pool(env.pool.clone()).await;

        let stats = orch.stats();
        assert_eq!(stats.pools_skipped_gate, 1);
        assert_eq!(stats.pools_skipped_security, 0);
        assert_eq!(stats.pools_bought, 0);
    }

    #[tokio::test]
    async fn test_live_buy_sends_and_opens_position() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(true, false), 100_000.0, RateLimitState::default());

        orch.handle_pool(env.pool.clone()).await;

        assert_eq!(env.chain.sent_transactions().len(), 1);
        assert_eq!(orch.stats().pools_bought, 1);
        let engine = orch.positions();
        let engine = engine.lock().await;
        let position = engine.get(&env.token).unwrap();
        assert_eq!(position.pool_address, env.pool.pool_address.unwrap());
        assert!(position.token_amount > 0);
        drop(engine);
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_live_buy_records_filled_amount() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(true, false), 100_000.0, RateLimitState::default());
        let account = associated_token_address(&orch.signer.pubkey(), &env.token, &TOKEN_PROGRAM);
        // Quote for 0.1 SOL is about 1.98e9 tokens with a 1.88e9 floor
        env.chain.set_token_balance(account, 1_500_000_000);

        orch.handle_pool(env.pool.clone()).await;

        let engine = orch.positions();
        let engine = engine.lock().await;
        assert_eq!(engine.get(&env.token).unwrap().token_amount, 1_500_000_000);
        drop(engine);
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_failed_confirmation_opens_nothing() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        env.chain
            .set_confirmation(ConfirmationStatus::Failed("InstructionError".to_string()));
        let orch = orchestrator(&env, fast_config(true, false), 100_000.0, RateLimitState::default());

        orch.handle_pool(env.pool.clone()).await;

        assert_eq!(env.chain.sent_transactions().len(), 1);
        assert!(orch.positions().lock().await.is_empty());
        assert_eq!(orch.stats().pools_bought, 0);
        // The submission still counts against the hourly window
        assert_eq!(orch.status().await.trades_last_hour, 1);
    }

    #[tokio::test]
    async fn test_bundle_path_adds_tip_transaction() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let bundles = MockBundles::new();
        let config = OrchestratorConfig {
            jito_tip_lamports: Some(10_000),
            ..fast_config(true, false)
        };
        let orch = orchestrator(&env, config, 100_000.0, RateLimitState::default())
            .with_bundles(Arc::new(bundles.clone()));

        orch.handle_pool(env.pool.clone()).await;

        let submitted = bundles.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].len(), 2);
        assert!(env.chain.sent_transactions().is_empty());
        assert_eq!(orch.stats().pools_bought, 1);
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_failed_bundle_opens_no_position() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let bundles = MockBundles::new();
        bundles.set_outcome(BundleState::Failed);
        let config = OrchestratorConfig {
            jito_tip_lamports: Some(10_000),
            ..fast_config(true, false)
        };
        let orch = orchestrator(&env, config, 100_000.0, RateLimitState::default())
            .with_bundles(Arc::new(bundles.clone()));

        orch.handle_pool(env.pool.clone()).await;

        assert_eq!(bundles.submitted().len(), 1);
        assert_eq!(orch.stats().pools_bought, 0);
        assert!(orch.positions().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_token_ignored_while_held() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(true, true), 100_000.0, RateLimitState::new(10, 60));

        orch.handle_pool(env.pool.clone()).await;
        orch.handle_pool(env.pool.clone()).await;

        let stats = orch.stats();
        assert_eq!(stats.pools_bought, 1);
        assert_eq!(stats.duplicates_skipped, 1);
        assert_eq!(orch.positions().lock().await.len(), 1);
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_take_profit_sells_and_starts_cooldown() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(true, true), 100_000.0, RateLimitState::new(10, 600));

        orch.handle_pool(env.pool.clone()).await;
        assert_eq!(orch.positions().lock().await.len(), 1);

        // 70 SOL against the same token reserve: +40%
        env.chain.set_token_balance(env.amm.quote_vault, 70_000_000_000);
        let stats = wait_for(&orch, |s| s.sells_confirmed == 1).await;

        assert_eq!(stats.sells_confirmed, 1);
        assert!(orch.positions().lock().await.is_empty());
        let limits = orch.gate.rate_limits();
        assert!(limits.lock().await.cooldown_expiry(&env.token.to_string()).is_some());

        // Re-detection during cooldown is rejected by the gate
        orch.handle_pool(env.pool.clone()).await;
        assert_eq!(orch.stats().pools_skipped_gate, 1);
    }

    #[tokio::test]
    async fn test_failed_sell_rearms_trigger() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(true, false), 100_000.0, RateLimitState::default());

        orch.handle_pool(env.pool.clone()).await;
        env.chain.fail_next_sends(1_000);
        env.chain.set_token_balance(env.amm.quote_vault, 30_000_000_000);

        let stats = wait_for(&orch, |s| s.sells_failed >= 1).await;
        assert!(stats.sells_failed >= 1);
        assert_eq!(stats.sells_confirmed, 0);
        assert!(orch.positions().lock().await.contains(&env.token));
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_run_processes_stream_and_dedupes() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(false, true), 100_000.0, RateLimitState::default());
        let (tx, rx) = mpsc::channel(16);

        tx.send(notification("sig-1", creation_logs(&env))).await.unwrap();
        tx.send(notification("sig-1", creation_logs(&env))).await.unwrap();
        tx.send(StreamEvent::ConnectionState { connected: true, reconnect_count: 0 })
            .await
            .unwrap();
        tx.send(notification("sig-2", vec!["Program log: unrelated".to_string()]))
            .await
            .unwrap();
        drop(tx);

        orch.run(rx).await.unwrap();

        let stats = orch.stats();
        assert_eq!(stats.transactions_seen, 3);
        assert_eq!(stats.pools_detected, 1);
        assert!(!orch.status().await.is_running);
    }

    #[tokio::test]
    async fn test_stop_waits_for_buy_confirmation() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        env.chain.set_confirmation(ConfirmationStatus::Pending);
        let config = OrchestratorConfig {
            confirm_attempts: 40,
            confirm_delay: Duration::from_millis(10),
            drain_timeout: Duration::from_millis(20),
            ..fast_config(true, false)
        };
        let orch = orchestrator(&env, config, 100_000.0, RateLimitState::default());
        let (tx, rx) = mpsc::channel(4);
        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run(rx).await });

        tx.send(notification("sig-slow", creation_logs(&env))).await.unwrap();
        for _ in 0..200 {
            if !env.chain.sent_transactions().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(env.chain.sent_transactions().len(), 1);

        orch.stop().await;
        // Lands after the grace period, inside the confirmation budget
        tokio::time::sleep(Duration::from_millis(100)).await;
        env.chain.set_confirmation(ConfirmationStatus::Confirmed);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(orch.stats().pools_bought, 1);
        assert!(orch.positions().lock().await.contains(&env.token));
    }

    #[tokio::test]
    async fn test_no_buy_submitted_after_stop() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(true, false), 100_000.0, RateLimitState::default());

        orch.stop().await;
        orch.handle_pool(env.pool.clone()).await;

        assert!(env.chain.sent_transactions().is_empty());
        assert_eq!(orch.stats().pools_bought, 0);
        assert_eq!(orch.status().await.trades_last_hour, 0);
    }

    #[tokio::test]
    async fn test_stop_ends_run_loop() {
        let env = v4_pool(TOKEN_RESERVE, SOL_RESERVE);
        let orch = orchestrator(&env, fast_config(false, true), 100_000.0, RateLimitState::default());
        let (_tx, rx) = mpsc::channel::<StreamEvent>(4);
        let mut signal = orch.shutdown_signal();

        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run(rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        orch.stop().await;

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(*signal.borrow_and_update());
    }
}
