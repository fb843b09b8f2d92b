//! Raydium Sniper
//!
//! Streams Raydium program logs, gates each new pool, and trades it.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use raydium_sniper::adapters::cli::{parse_log_file, CliApp, Command, DecodeCmd, OutputFormat, RunCmd, StatusCmd};
use raydium_sniper::adapters::jito::JitoClient;
use raydium_sniper::adapters::market_data::{BirdeyeClient, DexScreenerClient};
use raydium_sniper::adapters::rugcheck::RugCheckClient;
use raydium_sniper::adapters::solana::{LogStream, LogStreamConfig, SolanaClient, WalletManager};
use raydium_sniper::application::Orchestrator;
use raydium_sniper::config::{load_config, Config};
use raydium_sniper::domain::{
    ExtractionContext, LogClassifier, PoolExtractor, PositionTriggerEngine, RiskScorer,
    SignalAggregator, TradeGate,
};
use raydium_sniper::ports::{ChainTransport, MarketDataProvider, ReputationProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets (API keys, RPC URLs) come from .env, not config.toml
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug)?;

    match app.command {
        Command::Run(cmd) => run_command(cmd).await,
        Command::Status(cmd) => status_command(cmd).await,
        Command::Decode(cmd) => decode_command(cmd),
    }
}

fn init_logging(verbose: bool, debug: bool) -> Result<()> {
    let default = if debug {
        "debug"
    } else if verbose {
        "info,raydium_sniper=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    Ok(())
}

async fn run_command(cmd: RunCmd) -> Result<()> {
    let mut config = load_config(&cmd.config)
        .with_context(|| format!("Failed to load configuration from {}", cmd.config.display()))?;

    if cmd.paper {
        config.trading.paper_trading = true;
    }
    if cmd.auto_buy {
        config.trading.auto_buy = true;
    }
    if let Some(url) = &cmd.rpc_url {
        config.solana.rpc_url = url.clone();
    }
    if let Some(path) = &cmd.keypair {
        config.solana.keypair_path = path.display().to_string();
    }
    let paper = config.trading.paper_trading;
    if config.trading.auto_buy && !paper && !cmd.i_accept_losses {
        bail!("Live auto-buy sends real transactions. Re-run with --i-accept-losses to continue.");
    }

    let commitment = config.solana.commitment()?;
    let rpc_url = cmd.rpc_url.clone().unwrap_or_else(|| config.solana.rpc_url());
    let solana = Arc::new(SolanaClient::with_commitment(rpc_url, commitment));
    let chain: Arc<dyn ChainTransport> = solana;

    let keypair_path = config.solana.keypair_path();
    let wallet = match load_wallet_with_context(&keypair_path, paper) {
        Ok(w) => w,
        Err(e) if paper => {
            tracing::warn!("{:#}", e);
            tracing::warn!("Using a random wallet for paper trading");
            WalletManager::new_random()
        }
        Err(e) => return Err(e),
    };
    tracing::info!("Wallet: {}", wallet.public_key());

    let gate = build_gate(&config, Arc::clone(&chain))?;
    let engine = PositionTriggerEngine::new(config.trigger_settings()?);
    let mut orchestrator = Orchestrator::new(
        config.orchestrator_config(),
        Arc::clone(&chain),
        Arc::new(wallet),
        gate,
        engine,
    );
    if let Some(jito) = config.jito_config() {
        tracing::info!("Submitting through Jito at {}", jito.block_engine_url);
        let client = JitoClient::new(jito).context("Failed to create Jito client")?;
        orchestrator = orchestrator.with_bundles(Arc::new(client));
    }

    let mut stream_config =
        LogStreamConfig::new(config.solana.ws_url(), LogClassifier::default().program_ids());
    stream_config.commitment = commitment;
    let (stream, events) = LogStream::new(stream_config);
    let shutdown = orchestrator.shutdown_signal();
    let stream_task = tokio::spawn(async move { stream.run(shutdown).await });

    let orch = orchestrator.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        orch.stop().await;
    });

    if paper {
        tracing::warn!("PAPER TRADING MODE - no real transactions");
    }
    if !config.trading.auto_buy {
        tracing::warn!("Auto-buy disabled - detections are logged only");
    }

    orchestrator.run(events).await?;

    match stream_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Log stream ended: {}", e),
        Err(e) => tracing::warn!("Log stream task failed: {}", e),
    }
    let status = orchestrator.status().await;
    tracing::info!("Final stats: {}", status.stats);
    Ok(())
}

fn build_gate(config: &Config, chain: Arc<dyn ChainTransport>) -> Result<TradeGate> {
    let birdeye = BirdeyeClient::new(config.api_keys.birdeye()).context("Failed to create Birdeye client")?;
    let dexscreener = DexScreenerClient::new().context("Failed to create DexScreener client")?;
    let providers: Vec<Arc<dyn MarketDataProvider>> = vec![Arc::new(birdeye), Arc::new(dexscreener)];

    let reputation: Option<Arc<dyn ReputationProvider>> = if config.security.use_reputation {
        let client = RugCheckClient::new(config.api_keys.rugcheck()).context("Failed to create RugCheck client")?;
        Some(Arc::new(client))
    } else {
        None
    };

    Ok(TradeGate::new(
        Arc::clone(&chain),
        SignalAggregator::new(providers, config.aggregator_config()),
        RiskScorer::new(chain, reputation, config.risk_config()),
        config.rate_limits(),
        config.gate_config(),
    ))
}

async fn status_command(cmd: StatusCmd) -> Result<()> {
    let config = load_config(&cmd.config)?;
    let keypair_path = config.solana.keypair_path();

    let (wallet, balance) = if cmd.offline {
        (None, None)
    } else {
        let wallet = load_wallet_with_context(&keypair_path, false)?;
        let solana = SolanaClient::with_commitment(config.solana.rpc_url(), config.solana.commitment()?);
        let pubkey = raydium_sniper::ports::TransactionSigner::pubkey(&wallet);
        let balance = solana.get_balance(&pubkey).await.context("Failed to get balance")?;
        (Some(wallet.public_key()), Some(balance))
    };

    let t = &config.trading;
    let tr = &config.triggers;
    match cmd.format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "rpc_url": config.solana.rpc_url(),
                "ws_url": config.solana.ws_url(),
                "wallet": wallet,
                "balance_lamports": balance,
                "auto_buy": t.auto_buy,
                "paper_trading": t.paper_trading,
                "buy_amount_sol": t.buy_amount_sol,
                "slippage_bps": t.slippage_bps,
                "max_trades_per_hour": t.max_trades_per_hour,
                "cooldown_seconds": t.cooldown_seconds,
                "take_profit_pct": tr.take_profit_pct.to_string(),
                "stop_loss_pct": tr.stop_loss_pct.to_string(),
                "trailing_stop_pct": tr.trailing_stop_enabled.then(|| tr.trailing_stop_pct.to_string()),
                "max_hold_hours": tr.max_hold_hours,
                "max_risk_score": config.security.max_risk_score,
                "jito": config.jito.enabled,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("RPC:        {}", config.solana.rpc_url());
            println!("WebSocket:  {}", config.solana.ws_url());
            if let (Some(w), Some(b)) = (&wallet, balance) {
                println!("Wallet:     {}", w);
                println!("Balance:    {} lamports ({:.4} SOL)", b, b as f64 / 1e9);
            }
            println!(
                "Mode:       {}{}",
                if t.paper_trading { "paper" } else { "LIVE" },
                if t.auto_buy { ", auto-buy" } else { ", monitor only" }
            );
            println!("Buy:        {} SOL @ {} bps slippage", t.buy_amount_sol, t.slippage_bps);
            println!("Limits:     {} trades/hour, {}s cooldown", t.max_trades_per_hour, t.cooldown_seconds);
            println!(
                "Exits:      TP {}% / SL {}% / trailing {} / max hold {}h",
                tr.take_profit_pct,
                tr.stop_loss_pct,
                if tr.trailing_stop_enabled { format!("{}%", tr.trailing_stop_pct) } else { "off".to_string() },
                tr.max_hold_hours
            );
            println!("Risk:       max score {}", config.security.max_risk_score);
            println!("Jito:       {}", if config.jito.enabled { config.jito.region.as_str() } else { "off" });
        }
    }
    Ok(())
}

fn decode_command(cmd: DecodeCmd) -> Result<()> {
    let content = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;
    let logs = parse_log_file(&content);

    let classification = LogClassifier::default().classify(&logs);
    if !classification.is_pool_creation {
        println!("Not a pool creation ({} log lines)", logs.len());
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let ctx = ExtractionContext::new(&cmd.signature, &logs, classification.variant, now)
        .with_init_log(classification.init_log.as_deref());
    let Some(pool) = PoolExtractor::default().extract(&ctx) else {
        bail!("Pool creation detected ({}) but no strategy could decode it", classification.variant);
    };

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pool)?),
        OutputFormat::Text => {
            println!("Variant:    {}", pool.variant);
            println!("Source:     {:?}", pool.source);
            println!(
                "Pool:       {}",
                pool.pool_address.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
            );
            println!("Base mint:  {}", pool.base_mint);
            println!("Quote mint: {}", pool.quote_mint);
            println!("Token:      {}", pool.token_mint());
            if let Some(market) = pool.market_id {
                println!("Market:     {}", market);
            }
            if let Some(lp) = pool.lp_mint {
                println!("LP mint:    {}", lp);
            }
        }
    }
    Ok(())
}

/// Load wallet with helpful error messages. `SOLANA_PRIVATE_KEY` (base58)
/// takes precedence over the keypair file.
fn load_wallet_with_context(keypair_path: &str, is_paper_mode: bool) -> Result<WalletManager> {
    if let Ok(encoded) = std::env::var("SOLANA_PRIVATE_KEY") {
        return WalletManager::from_base58(&encoded).context("Failed to load wallet from SOLANA_PRIVATE_KEY");
    }

    let expanded = shellexpand::full(keypair_path)
        .map(|p| p.to_string())
        .unwrap_or_else(|_| keypair_path.to_string());

    if !Path::new(&expanded).exists() {
        let mode_hint = if is_paper_mode {
            "In paper mode, a random wallet will be used instead."
        } else {
            "A wallet is required for live trading and status checks."
        };
        bail!(
            "Wallet file not found: {}\n\n{}\n\nTo create a new wallet, run:\n  solana-keygen new --outfile {}",
            expanded,
            mode_hint,
            expanded
        );
    }

    WalletManager::from_file(&expanded).with_context(|| {
        format!(
            "Failed to load wallet from '{}'. Expected a JSON array of 64 bytes (solana-keygen format)",
            expanded
        )
    })
}
