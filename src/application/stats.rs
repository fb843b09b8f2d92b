//! Running pipeline counters
//!
//! Owned by the orchestrator and shared with its tasks by `Arc`. Counters are
//! monotonically increasing; `snapshot` copies them for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Stats {
    transactions_seen: AtomicU64,
    pools_detected: AtomicU64,
    duplicates_skipped: AtomicU64,
    decode_failures: AtomicU64,
    pools_bought: AtomicU64,
    pools_skipped_security: AtomicU64,
    pools_skipped_gate: AtomicU64,
    sells_confirmed: AtomicU64,
    sells_failed: AtomicU64,
}

/// Point-in-time copy of `Stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub transactions_seen: u64,
    pub pools_detected: u64,
    pub duplicates_skipped: u64,
    pub decode_failures: u64,
    pub pools_bought: u64,
    pub pools_skipped_security: u64,
    pub pools_skipped_gate: u64,
    pub sells_confirmed: u64,
    pub sells_failed: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_seen(&self) {
        bump(&self.transactions_seen);
    }

    pub fn pool_detected(&self) {
        bump(&self.pools_detected);
    }

    pub fn duplicate_skipped(&self) {
        bump(&self.duplicates_skipped);
    }

    pub fn decode_failed(&self) {
        bump(&self.decode_failures);
    }

    pub fn pool_bought(&self) {
        bump(&self.pools_bought);
    }

    pub fn skipped_security(&self) {
        bump(&self.pools_skipped_security);
    }

    pub fn skipped_gate(&self) {
        bump(&self.pools_skipped_gate);
    }

    pub fn sell_confirmed(&self) {
        bump(&self.sells_confirmed);
    }

    pub fn sell_failed(&self) {
        bump(&self.sells_failed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            transactions_seen: load(&self.transactions_seen),
            pools_detected: load(&self.pools_detected),
            duplicates_skipped: load(&self.duplicates_skipped),
            decode_failures: load(&self.decode_failures),
            pools_bought: load(&self.pools_bought),
            pools_skipped_security: load(&self.pools_skipped_security),
            pools_skipped_gate: load(&self.pools_skipped_gate),
            sells_confirmed: load(&self.sells_confirmed),
            sells_failed: load(&self.sells_failed),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "seen={} detected={} dup={} decode_fail={} bought={} skip_security={} skip_gate={} sold={} sell_fail={}",
            self.transactions_seen,
            self.pools_detected,
            self.duplicates_skipped,
            self.decode_failures,
            self.pools_bought,
            self.pools_skipped_security,
            self.pools_skipped_gate,
            self.sells_confirmed,
            self.sells_failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_independent() {
        let stats = Stats::new();
        stats.transaction_seen();
        stats.transaction_seen();
        stats.pool_detected();
        stats.skipped_security();

        let snap = stats.snapshot();
        assert_eq!(snap.transactions_seen, 2);
        assert_eq!(snap.pools_detected, 1);
        assert_eq!(snap.pools_skipped_security, 1);
        assert_eq!(snap.pools_skipped_gate, 0);
        assert_eq!(snap.pools_bought, 0);
    }

    #[test]
    fn test_display_line() {
        let stats = Stats::new();
        stats.pool_bought();
        let line = stats.snapshot().to_string();
        assert!(line.contains("bought=1"));
        assert!(line.starts_with("seen=0"));
    }
}
