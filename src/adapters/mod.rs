//! Adapters Layer - External System Implementations
//!
//! Implementations of the port traits:
//! - Solana: RPC transport, WebSocket log stream, keypair signer
//! - Market Data: Birdeye and DexScreener feeds
//! - RugCheck: token reputation reports
//! - Jito: bundle submission
//! - CLI: command-line surface

pub mod cli;
pub mod jito;
pub mod market_data;
pub mod rugcheck;
pub mod solana;

pub use cli::CliApp;
pub use jito::JitoClient;
pub use market_data::{BirdeyeClient, DexScreenerClient};
pub use rugcheck::RugCheckClient;
pub use solana::{LogStream, SolanaClient, WalletManager};
