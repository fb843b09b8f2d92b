//! Market Data Adapters
//!
//! Independent volume/liquidity/price feeds consumed by the signal aggregator:
//! - `BirdeyeClient`: token overview and hourly price history (API key, 1 req/s)
//! - `DexScreenerClient`: per-pair volume, liquidity and USD price (10 req/s)

mod birdeye;
mod dexscreener;
mod throttle;

pub use birdeye::{BirdeyeClient, TokenOverview, BIRDEYE_API};
pub use dexscreener::{DexScreenerClient, Pair, DEXSCREENER_API};
pub use throttle::Throttle;
