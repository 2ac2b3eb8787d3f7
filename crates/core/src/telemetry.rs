//! Hit/miss telemetry.
//!
//! Counters live for the lifetime of the engine and only go back to zero on an
//! explicit reset.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Process-wide hit/miss counters.
#[derive(Debug, Default)]
pub struct Telemetry {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Read-only view of the counters plus per-partition entry counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses) * 100`, two decimals, 0 when nothing was observed.
    pub rate_percent: f64,
    pub per_partition_entry_counts: BTreeMap<String, u64>,
}

/// Hit rate as a percentage rounded to two decimal places.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    let rate = hits as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Zero both counters.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Build a snapshot from the current counters and the given entry counts.
    pub fn snapshot(&self, entry_counts: impl IntoIterator<Item = (String, u64)>) -> TelemetrySnapshot {
        let hits = self.hits();
        let misses = self.misses();
        TelemetrySnapshot {
            hits,
            misses,
            rate_percent: hit_rate(hits, misses),
            per_partition_entry_counts: entry_counts.into_iter().collect(),
        }
    }
}
