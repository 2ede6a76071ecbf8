//! Per-cycle summary.

use chrono::{DateTime, Utc};

/// Counters for one poll cycle, logged at the end of the cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    /// Rows returned by the listings source.
    pub listings_fetched: usize,
    /// Identifiers observed for the first time.
    pub discovered: usize,
    pub admitted: usize,
    pub rejected: usize,
    /// Watching → Tracked transitions.
    pub promoted: usize,
    pub evicted: usize,
    /// Tracked assets that reached signal evaluation.
    pub evaluated: usize,
    /// Tracked assets skipped for lack of candles.
    pub no_data: usize,
    /// Tracked assets rejected by the liquidity gate.
    pub gated: usize,
    pub first_moves: usize,
    pub confirms: usize,
    pub notify_failures: usize,
    pub audit_rows: usize,
}

impl CycleReport {
    pub fn new(cycle_number: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            cycle_number,
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }

    pub fn alerts_sent(&self) -> usize {
        self.first_moves + self.confirms
    }
}
