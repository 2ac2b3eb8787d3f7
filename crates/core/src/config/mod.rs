//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (INTERCACHE_*)
//! 2. TOML config file (if INTERCACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The partition table is the single source of truth for partition behavior
//! and is read once at startup.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::rules::{RuleSpec, Strategy, default_rules};

mod validation;

pub use validation::ConfigError;

/// One row of the partition configuration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PartitionConfig {
    pub name: String,
    /// Default strategy reported for the partition.
    pub strategy: Strategy,
    /// Entries older than this are stale and removed by the expiry sweep. 0 = never.
    pub max_age_secs: u64,
    /// Entry-count ceiling. 0 = unbounded.
    pub max_entries: usize,
}

impl PartitionConfig {
    pub fn new(name: impl Into<String>, strategy: Strategy, max_age_secs: u64, max_entries: usize) -> Self {
        Self { name: name.into(), strategy, max_age_secs, max_entries }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (INTERCACHE_*)
/// 2. TOML config file (if INTERCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration version identifier, returned by `GET_VERSION`.
    ///
    /// Set via INTERCACHE_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Path to SQLite cache database.
    ///
    /// Set via INTERCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network fetches.
    ///
    /// Set via INTERCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to accept per response.
    ///
    /// Set via INTERCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Overall HTTP request timeout in milliseconds.
    ///
    /// Set via INTERCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Bounded attempt for network-first fetches, unless a rule overrides it.
    ///
    /// Set via INTERCACHE_NETWORK_TIMEOUT_MS environment variable.
    #[serde(default = "default_network_timeout_ms")]
    pub network_timeout_ms: u64,

    /// Partition configuration table.
    #[serde(default = "default_partitions")]
    pub partitions: Vec<PartitionConfig>,

    /// Startup rules, matched in order.
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleSpec>,

    /// Precache manifest, loaded into `static_partition` at install time.
    #[serde(default)]
    pub precache: Vec<String>,

    /// Partition receiving the precache manifest.
    ///
    /// Set via INTERCACHE_STATIC_PARTITION environment variable.
    #[serde(default = "default_static_partition")]
    pub static_partition: String,

    /// Document served to navigation requests when both network and store fail.
    ///
    /// Set via INTERCACHE_OFFLINE_URL environment variable.
    #[serde(default)]
    pub offline_url: Option<String>,

    /// Storage quota in bytes. Without it the quota monitor only enforces entry counts.
    ///
    /// Set via INTERCACHE_QUOTA_BYTES environment variable.
    #[serde(default)]
    pub quota_bytes: Option<u64>,

    /// Period of the quota monitor in seconds.
    ///
    /// Set via INTERCACHE_QUOTA_CHECK_INTERVAL_SECS environment variable.
    #[serde(default = "default_quota_check_interval_secs")]
    pub quota_check_interval_secs: u64,
}

fn default_version() -> String {
    "v1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./intercache.sqlite")
}

fn default_user_agent() -> String {
    "intercache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_network_timeout_ms() -> u64 {
    3_000
}

fn default_static_partition() -> String {
    "static".into()
}

fn default_quota_check_interval_secs() -> u64 {
    300
}

const DAY: u64 = 24 * 60 * 60;

fn default_partitions() -> Vec<PartitionConfig> {
    vec![
        PartitionConfig::new("static", Strategy::StaleWhileRevalidate, 30 * DAY, 100),
        PartitionConfig::new("pages", Strategy::NetworkFirst, DAY, 50),
        PartitionConfig::new("api", Strategy::NetworkFirst, 5 * 60, 100),
        PartitionConfig::new("images", Strategy::CacheFirst, 30 * DAY, 60),
        PartitionConfig::new("fonts", Strategy::CacheFirst, 365 * DAY, 30),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            network_timeout_ms: default_network_timeout_ms(),
            partitions: default_partitions(),
            rules: default_rules(),
            precache: Vec::new(),
            static_partition: default_static_partition(),
            offline_url: None,
            quota_bytes: None,
            quota_check_interval_secs: default_quota_check_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Default network-first attempt budget.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn quota_check_interval(&self) -> Duration {
        Duration::from_secs(self.quota_check_interval_secs)
    }

    /// Look up a partition row by name.
    pub fn partition(&self, name: &str) -> Option<&PartitionConfig> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `INTERCACHE_`
    /// 2. TOML file from `INTERCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("INTERCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("INTERCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string layered over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the TOML cannot be parsed or validation fails.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.version, "v1");
        assert_eq!(config.db_path, PathBuf::from("./intercache.sqlite"));
        assert_eq!(config.user_agent, "intercache/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.network_timeout_ms, 3_000);
        assert_eq!(config.partitions.len(), 5);
        assert_eq!(config.rules.len(), 5);
        assert!(config.precache.is_empty());
        assert_eq!(config.static_partition, "static");
        assert!(config.offline_url.is_none());
        assert!(config.quota_bytes.is_none());
    }

    #[test]
    fn test_timeout_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.network_timeout(), Duration::from_millis(3_000));
        assert_eq!(config.quota_check_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partition_lookup() {
        let config = AppConfig::default();
        let images = config.partition("images").unwrap();
        assert_eq!(images.strategy, Strategy::CacheFirst);
        assert_eq!(images.max_entries, 60);
        assert!(config.partition("videos").is_none());
    }

    #[test]
    fn test_from_toml_overrides_table() {
        let config = AppConfig::from_toml_str(
            r#"
            version = "v2"
            precache = ["https://example.com/", "https://example.com/app.css"]
            offline_url = "https://example.com/offline.html"

            [[partitions]]
            name = "static"
            strategy = "cache-first"
            max_age_secs = 60
            max_entries = 10

            [[partitions]]
            name = "api"
            strategy = "network-first"
            max_age_secs = 30
            max_entries = 0

            [[rules]]
            pattern = "/api/"
            strategy = "network-first"
            partition = "api"
            timeoutMs = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.version, "v2");
        assert_eq!(config.partitions.len(), 2);
        assert_eq!(config.partition("api").unwrap().max_entries, 0);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].timeout_ms, Some(500));
        assert_eq!(config.precache.len(), 2);
    }
}
