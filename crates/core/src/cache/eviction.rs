//! Eviction: entry-count trimming, expiry sweeps and clearing.
//!
//! Trimming is FIFO by insertion order, not LRU: the oldest-inserted entries go
//! first regardless of how recently they were read. Passes over several
//! partitions take each partition's lock in turn and release it before moving on.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::store::PartitionStore;
use crate::Error;

/// Which partitions a clear applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    Partition(String),
    All,
}

/// Per-partition outcome of an eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EvictionReport {
    /// (partition, deleted entries), only for partitions that lost entries.
    pub evicted: Vec<(String, u64)>,
    /// (partition, error) for partitions the pass could not process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<(String, String)>,
}

impl EvictionReport {
    pub fn total(&self) -> u64 {
        self.evicted.iter().map(|(_, n)| n).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, partition: &str, result: Result<u64, Error>, pass: &'static str) {
        match result {
            Ok(0) => {}
            Ok(deleted) => self.evicted.push((partition.to_string(), deleted)),
            Err(e) => {
                tracing::warn!(partition, pass, error = %e, "eviction pass skipped partition");
                self.failed.push((partition.to_string(), e.to_string()));
            }
        }
    }
}

impl PartitionStore {
    /// Remove oldest-inserted entries until the partition is within its bound.
    ///
    /// Unbounded partitions are left untouched. Returns the number of deleted entries.
    pub async fn trim(&self, partition: &str) -> Result<u64, Error> {
        let (config, lock) = self.slot(partition)?;
        if !config.is_bounded() {
            return Ok(0);
        }
        let _guard = lock.lock().await;
        let deleted = self.db().trim_entries(partition, config.max_entries).await?;
        if deleted > 0 {
            tracing::debug!(partition, deleted, max_entries = config.max_entries, "trimmed partition");
        }
        Ok(deleted)
    }

    /// Trim every configured partition, one at a time.
    ///
    /// A partition that fails is logged and listed in `failed`; the pass
    /// continues with the next one.
    pub async fn trim_all(&self) -> Result<EvictionReport, Error> {
        let mut report = EvictionReport::default();
        for name in self.names() {
            report.record(name, self.trim(name).await, "trim");
        }
        Ok(report)
    }

    /// Delete entries that outlived their max-age.
    pub async fn purge_expired(&self, partition: &str) -> Result<u64, Error> {
        let (config, lock) = self.slot(partition)?;
        let _guard = lock.lock().await;
        self.db()
            .purge_expired_entries(partition, config.max_age.as_secs(), Utc::now())
            .await
    }

    /// Run the expiry sweep over every configured partition, continuing past failures.
    pub async fn purge_expired_all(&self) -> Result<EvictionReport, Error> {
        let mut report = EvictionReport::default();
        for name in self.names() {
            report.record(name, self.purge_expired(name).await, "expire");
        }
        Ok(report)
    }

    /// Delete entries unconditionally.
    ///
    /// Clearing an empty partition is a no-op. An unknown partition name is a
    /// `Error::Config`. Clearing all partitions continues past a failing one.
    pub async fn clear(&self, scope: &ClearScope) -> Result<EvictionReport, Error> {
        let mut report = EvictionReport::default();
        match scope {
            ClearScope::Partition(name) => {
                let deleted = self.clear_partition(name).await?;
                report.record(name, Ok(deleted), "clear");
            }
            ClearScope::All => {
                for name in self.names() {
                    report.record(name, self.clear_partition(name).await, "clear");
                }
            }
        }
        tracing::info!(?scope, cleared = report.total(), failed = report.failed.len(), "cleared cache");
        Ok(report)
    }

    async fn clear_partition(&self, name: &str) -> Result<u64, Error> {
        let (_, lock) = self.slot(name)?;
        let _guard = lock.lock().await;
        self.db().delete_partition_entries(name).await
    }

    /// Delete every stored partition that the current configuration does not name.
    ///
    /// Returns the deleted partition names.
    pub async fn drop_unconfigured(&self) -> Result<Vec<String>, Error> {
        let stored = self.db().stored_partition_names().await?;
        let mut dropped = Vec::new();
        for name in stored.into_iter().filter(|name| !self.contains(name)) {
            let deleted = self.db().drop_partition(&name).await?;
            tracing::info!(partition = %name, entries = deleted, "deleted stale partition");
            dropped.push(name);
        }
        Ok(dropped)
    }
}
