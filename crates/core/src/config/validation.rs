//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn is_absolute_http_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// Rules naming unknown partitions are not rejected here; the engine skips
    /// them individually when it is built.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `network_timeout_ms` is less than 100ms or exceeds `timeout_ms`
    /// - `user_agent` or `version` is empty
    /// - the partition table is empty or has duplicate names
    /// - `static_partition` is not in the partition table
    /// - `offline_url` or a precache entry is not an absolute http(s) URL
    /// - the precache manifest plus `offline_url` exceeds a bounded static partition
    /// - `quota_check_interval_secs` is 0
    ///
    /// Returns `ConfigError::Missing` if the partition table is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.network_timeout_ms < 100 {
            return Err(invalid("network_timeout_ms", "must be at least 100ms"));
        }
        if self.network_timeout_ms > self.timeout_ms {
            return Err(invalid("network_timeout_ms", "must not exceed timeout_ms"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(invalid("version", "must not be empty"));
        }

        if self.partitions.is_empty() {
            return Err(ConfigError::Missing {
                field: "partitions".into(),
                hint: "Declare at least one [[partitions]] table".into(),
            });
        }
        let mut seen = HashSet::new();
        for partition in &self.partitions {
            if partition.name.trim().is_empty() {
                return Err(invalid("partitions", "partition name must not be empty"));
            }
            if !seen.insert(partition.name.as_str()) {
                return Err(invalid("partitions", format!("duplicate partition name: {}", partition.name)));
            }
        }

        if self.partition(&self.static_partition).is_none() {
            return Err(invalid(
                "static_partition",
                format!("{} is not a configured partition", self.static_partition),
            ));
        }

        if let Some(offline_url) = &self.offline_url
            && !is_absolute_http_url(offline_url)
        {
            return Err(invalid("offline_url", format!("not an absolute http(s) URL: {offline_url}")));
        }

        if let Some(entry) = self.precache.iter().find(|u| !is_absolute_http_url(u)) {
            return Err(invalid("precache", format!("not an absolute http(s) URL: {entry}")));
        }

        if let Some(partition) = self.partition(&self.static_partition)
            && partition.max_entries > 0
        {
            let manifest: HashSet<&str> =
                self.precache.iter().chain(self.offline_url.iter()).map(String::as_str).collect();
            if manifest.len() > partition.max_entries {
                return Err(invalid(
                    "precache",
                    format!(
                        "{} precached documents exceed max_entries {} of partition {}",
                        manifest.len(),
                        partition.max_entries,
                        partition.name
                    ),
                ));
            }
        }

        if self.quota_check_interval_secs == 0 {
            return Err(invalid("quota_check_interval_secs", "must be at least 1 second"));
        }

        if self.quota_bytes == Some(0) {
            tracing::warn!("quota_bytes is 0; every quota check will report pressure");
        }

        Ok(())
    }
}
