//! Request-matching rules.
//!
//! A rule binds a URL pattern to a target partition and a caching strategy.
//! Rules are matched linearly in registration order and the first match wins,
//! so narrow patterns (image extensions) must be registered before broad ones
//! (an `api.` substring) or they never trigger.

mod registry;

pub use registry::{CacheRule, Resolved, RuleRegistry};

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Read/write/fallback policy applied to a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from store when present, otherwise fetch and store.
    #[serde(alias = "cacheFirst")]
    CacheFirst,
    /// Fetch with a bounded attempt, fall back to the store on failure.
    #[serde(alias = "networkFirst")]
    NetworkFirst,
    /// Serve from store immediately and refresh in the background.
    #[serde(alias = "staleWhileRevalidate")]
    StaleWhileRevalidate,
    /// Always fetch, never touch the store.
    #[serde(alias = "networkOnly")]
    NetworkOnly,
    /// Serve from store or fail, never fetch.
    #[serde(alias = "cacheOnly")]
    CacheOnly,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
            Strategy::NetworkOnly => "network-only",
            Strategy::CacheOnly => "cache-only",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cache-first" | "cacheFirst" => Ok(Strategy::CacheFirst),
            "network-first" | "networkFirst" => Ok(Strategy::NetworkFirst),
            "stale-while-revalidate" | "staleWhileRevalidate" => Ok(Strategy::StaleWhileRevalidate),
            "network-only" | "networkOnly" => Ok(Strategy::NetworkOnly),
            "cache-only" | "cacheOnly" => Ok(Strategy::CacheOnly),
            other => Err(Error::InvalidInput(format!("unknown strategy: {other}"))),
        }
    }
}

/// Serializable rule definition, as found in configuration files and
/// `ADD_CACHE_RULE` control messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Regular expression matched against the normalized request URL.
    pub pattern: String,
    pub strategy: Strategy,
    /// Target partition name.
    pub partition: String,
    /// Max-age override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    /// Network-first timeout budget in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl RuleSpec {
    pub fn new(pattern: impl Into<String>, strategy: Strategy, partition: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), strategy, partition: partition.into(), max_age: None, timeout_ms: None }
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Built-in rules, most specific first.
pub fn default_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new(r"(?i)\.(?:png|jpe?g|gif|webp|avif|svg|ico)(?:\?.*)?$", Strategy::CacheFirst, "images"),
        RuleSpec::new(r"(?i)\.(?:woff2?|ttf|otf|eot)(?:\?.*)?$", Strategy::CacheFirst, "fonts"),
        RuleSpec::new(r"(?i)\.(?:css|m?js)(?:\?.*)?$", Strategy::StaleWhileRevalidate, "static"),
        RuleSpec::new(r"/api/|://api\.", Strategy::NetworkFirst, "api")
            .with_max_age(300)
            .with_timeout_ms(3_000),
        RuleSpec::new(r"(?i)(?:\.html?|/)(?:\?.*)?$", Strategy::NetworkFirst, "pages"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serde_kebab_case() {
        let json = serde_json::to_string(&Strategy::StaleWhileRevalidate).unwrap();
        assert_eq!(json, r#""stale-while-revalidate""#);

        let parsed: Strategy = serde_json::from_str(r#""networkFirst""#).unwrap();
        assert_eq!(parsed, Strategy::NetworkFirst);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("cache-only".parse::<Strategy>().unwrap(), Strategy::CacheOnly);
        assert!("cache-sometimes".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_rule_spec_wire_format() {
        let spec: RuleSpec =
            serde_json::from_str(r#"{"pattern":"\\.mp4$","strategy":"cache-first","partition":"images","maxAge":60}"#)
                .unwrap();
        assert_eq!(spec.partition, "images");
        assert_eq!(spec.max_age, Some(60));
        assert_eq!(spec.timeout_ms, None);
    }

    #[test]
    fn test_default_rules_order() {
        let rules = default_rules();
        let partitions: Vec<_> = rules.iter().map(|r| r.partition.as_str()).collect();
        assert_eq!(partitions, vec!["images", "fonts", "static", "api", "pages"]);
    }
}
