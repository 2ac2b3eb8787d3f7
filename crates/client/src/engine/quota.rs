//! Periodic quota monitor.
//!
//! Each tick runs the expiry sweep, then compares storage usage with the quota.
//! Above [`QUOTA_PRESSURE_RATIO`] of the quota every partition is trimmed. Without
//! a storage estimator the monitor falls back to entry-count enforcement alone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use intercache_core::{Error, EvictionReport, PartitionStore};

/// Fraction of the quota above which a full trim pass is forced.
pub const QUOTA_PRESSURE_RATIO: f64 = 0.8;

/// Storage usage against quota, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StorageEstimate {
    pub usage: u64,
    pub quota: u64,
}

impl StorageEstimate {
    pub fn under_pressure(&self) -> bool {
        self.quota > 0 && self.usage as f64 > self.quota as f64 * QUOTA_PRESSURE_RATIO
    }
}

/// Optional capability reporting how much storage is in use.
#[async_trait]
pub trait StorageEstimator: Send + Sync {
    async fn estimate(&self) -> Result<StorageEstimate, Error>;
}

/// Estimates usage from the size of stored entries against a fixed quota.
pub struct SqliteEstimator {
    store: PartitionStore,
    quota: u64,
}

impl SqliteEstimator {
    pub fn new(store: PartitionStore, quota: u64) -> Self {
        Self { store, quota }
    }
}

#[async_trait]
impl StorageEstimator for SqliteEstimator {
    async fn estimate(&self) -> Result<StorageEstimate, Error> {
        let usage = self.store.usage_bytes().await?;
        Ok(StorageEstimate { usage, quota: self.quota })
    }
}

/// What one monitor tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SweepReport {
    pub expired: EvictionReport,
    pub trimmed: EvictionReport,
    /// Estimate taken before trimming, if an estimator is available.
    pub estimate: Option<StorageEstimate>,
    pub pressure: bool,
}

#[derive(Clone)]
pub struct QuotaMonitor {
    store: PartitionStore,
    estimator: Option<Arc<dyn StorageEstimator>>,
    interval: Duration,
}

impl QuotaMonitor {
    pub fn new(store: PartitionStore, estimator: Option<Arc<dyn StorageEstimator>>, interval: Duration) -> Self {
        Self { store, estimator, interval }
    }

    /// Run one sweep: expiry, then quota enforcement.
    pub async fn check(&self) -> Result<SweepReport, Error> {
        let mut report = SweepReport { expired: self.store.purge_expired_all().await?, ..Default::default() };

        let Some(estimator) = self.estimator.as_ref() else {
            report.trimmed = self.store.trim_all().await?;
            return Ok(report);
        };

        let estimate = match estimator.estimate().await {
            Ok(estimate) => estimate,
            Err(e) => {
                let err = Error::QuotaExceeded(format!("storage estimate unavailable: {e}"));
                tracing::warn!(error = %err, "falling back to entry-count enforcement");
                report.trimmed = self.store.trim_all().await?;
                return Ok(report);
            }
        };
        report.estimate = Some(estimate);

        if estimate.under_pressure() {
            report.pressure = true;
            report.trimmed = self.store.trim_all().await?;
            tracing::info!(
                usage = estimate.usage,
                quota = estimate.quota,
                trimmed = report.trimmed.total(),
                "storage under quota pressure, trimmed all partitions"
            );

            match estimator.estimate().await {
                Ok(after) if after.under_pressure() => {
                    let err =
                        Error::QuotaExceeded(format!("{} of {} bytes still in use after trim", after.usage, after.quota));
                    tracing::warn!(error = %err, "trim did not relieve quota pressure");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "storage estimate after trim failed"),
            }
        }

        Ok(report)
    }

    /// Run [`QuotaMonitor::check`] on a fixed interval until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                match self.check().await {
                    Ok(report) => tracing::debug!(
                        expired = report.expired.total(),
                        trimmed = report.trimmed.total(),
                        pressure = report.pressure,
                        "quota sweep"
                    ),
                    Err(e) => tracing::warn!(error = %e, "quota sweep failed"),
                }
            }
        })
    }
}
