//! Configuration Module
//!
//! Loads and validates the sniper's TOML configuration and maps it onto the
//! domain and application settings.

pub mod loader;

pub use loader::{
    load_config, ApiKeysSection, Config, ConfigError, FiltersSection, JitoSection,
    SecuritySection, SignalsSection, SolanaSection, TradingSection, TriggersSection,
};
