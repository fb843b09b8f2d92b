//! Ports Layer - Trait definitions for external collaborators
//!
//! This module defines the interfaces (ports) that adapters must implement:
//! - Chain transport (RPC reads, transaction send, confirmation)
//! - Transaction signing
//! - Market data feeds (volume, liquidity, price history)
//! - Token reputation reports
//! - Bundle submission

pub mod bundle;
pub mod chain;
pub mod market_data;
pub mod mocks;
pub mod reputation;
pub mod signer;

pub use bundle::{BundleError, BundleState, BundleSubmitter, MAX_BUNDLE_TRANSACTIONS};
pub use chain::{ChainTransport, ConfirmationStatus, LogNotification, StreamEvent, TransportError};
pub use market_data::{MarketDataError, MarketDataProvider, Metric, PricePoint, Timeframe};
pub use reputation::{
    HolderShare, ReportedRisk, ReputationError, ReputationLevel, ReputationProvider,
    ReputationReport,
};
pub use signer::{SignerError, TransactionSigner};
