//! Raydium Sniper - new-pool detection and trading library
//!
//! Watches Raydium program logs for pool creation, decides within a tight
//! budget whether the new token is liquid and safe enough to buy, and manages
//! each resulting position through automated exits.
//!
//! # Modules
//!
//! - `domain`: Log classification, layout decoding, signal aggregation, risk scoring, gating, triggers
//! - `ports`: Trait seams for chain, signer, market data, reputation and bundles
//! - `adapters`: Solana RPC/WebSocket, Birdeye, DexScreener, RugCheck, Jito, CLI
//! - `config`: TOML configuration loading and validation
//! - `application`: The orchestrator event loop and its stats

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
