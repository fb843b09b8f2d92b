//! Trade Rate Limiter
//!
//! Rolling one-hour window of executed buys plus a per-mint cooldown set
//! after a confirmed sell. All timestamps are unix seconds passed in by the
//! caller, so the state is deterministic under test.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Rolling window length in seconds
pub const RATE_WINDOW_SECS: u64 = 3_600;

/// Default maximum buys per window
pub const DEFAULT_MAX_TRADES_PER_HOUR: usize = 5;

/// Default cooldown after a confirmed sell, in seconds
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit reached: {count} trades in the last hour (max {max})")]
    HourlyLimit { count: usize, max: usize },

    #[error("Token {mint} in cooldown for another {remaining_secs}s")]
    Cooldown { mint: String, remaining_secs: u64 },
}

/// Snapshot for heartbeat reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub trades_in_window: usize,
    pub max_trades_per_hour: usize,
    pub active_cooldowns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitState {
    max_trades_per_hour: usize,
    cooldown_secs: u64,
    /// Buy timestamps, oldest first
    trades: VecDeque<u64>,
    /// Mint -> cooldown expiry
    cooldowns: HashMap<String, u64>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRADES_PER_HOUR, DEFAULT_COOLDOWN_SECS)
    }
}

impl RateLimitState {
    pub fn new(max_trades_per_hour: usize, cooldown_secs: u64) -> Self {
        Self {
            max_trades_per_hour,
            cooldown_secs,
            trades: VecDeque::with_capacity(max_trades_per_hour),
            cooldowns: HashMap::new(),
        }
    }

    pub fn max_trades_per_hour(&self) -> usize {
        self.max_trades_per_hour
    }

    /// Trades with `now - t < RATE_WINDOW_SECS`
    pub fn trades_in_window(&self, now: u64) -> usize {
        self.trades
            .iter()
            .filter(|t| now.saturating_sub(**t) < RATE_WINDOW_SECS)
            .count()
    }

    pub fn check_rate(&self, now: u64) -> Result<(), RateLimitError> {
        let count = self.trades_in_window(now);
        if count >= self.max_trades_per_hour {
            return Err(RateLimitError::HourlyLimit {
                count,
                max: self.max_trades_per_hour,
            });
        }
        Ok(())
    }

    pub fn check_cooldown(&self, mint: &str, now: u64) -> Result<(), RateLimitError> {
        match self.cooldowns.get(mint) {
            Some(&expiry) if expiry > now => Err(RateLimitError::Cooldown {
                mint: mint.to_string(),
                remaining_secs: expiry - now,
            }),
            _ => Ok(()),
        }
    }

    /// Rate limit first, then cooldown
    pub fn check(&self, mint: &str, now: u64) -> Result<(), RateLimitError> {
        self.check_rate(now)?;
        self.check_cooldown(mint, now)
    }

    /// Count a submitted buy
    pub fn record_trade(&mut self, now: u64) {
        self.trades.push_back(now);
        self.prune(now);
    }

    /// Start the cooldown for `mint` after a confirmed sell
    pub fn start_cooldown(&mut self, mint: &str, now: u64) {
        let expiry = now.saturating_add(self.cooldown_secs);
        self.cooldowns.insert(mint.to_string(), expiry);
        tracing::debug!("Cooldown for {} until {}", mint, expiry);
    }

    pub fn cooldown_expiry(&self, mint: &str) -> Option<u64> {
        self.cooldowns.get(mint).copied()
    }

    /// Drop trades outside the window and expired cooldowns.
    /// Returns the number of cooldown entries removed.
    pub fn evict_expired(&mut self, now: u64) -> usize {
        self.prune(now);
        let before = self.cooldowns.len();
        self.cooldowns.retain(|_, expiry| *expiry > now);
        before - self.cooldowns.len()
    }

    pub fn snapshot(&self, now: u64) -> RateLimitSnapshot {
        RateLimitSnapshot {
            trades_in_window: self.trades_in_window(now),
            max_trades_per_hour: self.max_trades_per_hour,
            active_cooldowns: self.cooldowns.values().filter(|e| **e > now).count(),
        }
    }

    fn prune(&mut self, now: u64) {
        while let Some(&oldest) = self.trades.front() {
            if now.saturating_sub(oldest) >= RATE_WINDOW_SECS {
                self.trades.pop_front();
            } else {
                break;
            }
        }
    }
}
