//! Jito Bundle Adapter
//!
//! Submits buy transactions as block-engine bundles with a validator tip.

mod client;
mod config;
mod error;
mod types;

pub use client::{encode_transaction, JitoClient};
pub use config::{random_tip_account, JitoConfig, TIP_ACCOUNTS};
pub use error::JitoError;
pub use types::{BundleStatusEntry, BundleStatuses};
