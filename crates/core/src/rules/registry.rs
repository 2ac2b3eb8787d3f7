//! Ordered rule list with first-match-wins resolution.

use std::time::Duration;

use regex::Regex;

use super::{RuleSpec, Strategy};
use crate::Error;

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct CacheRule {
    pattern: Regex,
    pub partition: String,
    pub strategy: Strategy,
    pub max_age: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl CacheRule {
    /// Compile a rule definition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the pattern is not a valid regular expression
    /// or the partition name is empty.
    pub fn compile(spec: &RuleSpec) -> Result<Self, Error> {
        if spec.partition.trim().is_empty() {
            return Err(Error::InvalidInput("rule partition cannot be empty".into()));
        }
        let pattern = Regex::new(&spec.pattern)
            .map_err(|e| Error::InvalidInput(format!("invalid rule pattern {:?}: {e}", spec.pattern)))?;

        Ok(Self {
            pattern,
            partition: spec.partition.clone(),
            strategy: spec.strategy,
            max_age: spec.max_age.map(Duration::from_secs),
            timeout: spec.timeout_ms.map(Duration::from_millis),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }
}

/// Outcome of rule resolution for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Position of the matching rule in registration order.
    pub index: usize,
    pub partition: String,
    pub strategy: Strategy,
    pub max_age: Option<Duration>,
    pub timeout: Option<Duration>,
}

/// Ordered list of rules. Rules are appended and never removed.
#[derive(Debug, Default, Clone)]
pub struct RuleRegistry {
    rules: Vec<CacheRule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to the end of the list.
    pub fn add(&mut self, rule: CacheRule) {
        self.rules.push(rule);
    }

    /// Return the first rule matching `url`, or `None` when the request should bypass the cache.
    pub fn resolve(&self, url: &str) -> Option<Resolved> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(url))
            .map(|(index, rule)| Resolved {
                index,
                partition: rule.partition.clone(),
                strategy: rule.strategy,
                max_age: rule.max_age,
                timeout: rule.timeout,
            })
    }

    pub fn rules(&self) -> &[CacheRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_rules;

    fn rule(pattern: &str, strategy: Strategy, partition: &str) -> CacheRule {
        CacheRule::compile(&RuleSpec::new(pattern, strategy, partition)).unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = RuleRegistry::new();
        registry.add(rule(r"api\.", Strategy::NetworkFirst, "api"));
        registry.add(rule(r"\.png$", Strategy::CacheFirst, "images"));

        let resolved = registry.resolve("https://api.example.com/logo.png").unwrap();
        assert_eq!(resolved.partition, "api");
        assert_eq!(resolved.index, 0);
    }

    #[test]
    fn test_registration_order_changes_result() {
        let mut narrow_first = RuleRegistry::new();
        narrow_first.add(rule(r"\.png$", Strategy::CacheFirst, "images"));
        narrow_first.add(rule(r"api\.", Strategy::NetworkFirst, "api"));

        let resolved = narrow_first.resolve("https://api.example.com/logo.png").unwrap();
        assert_eq!(resolved.partition, "images");
        assert_eq!(resolved.strategy, Strategy::CacheFirst);

        let other = narrow_first.resolve("https://api.example.com/users").unwrap();
        assert_eq!(other.partition, "api");
    }

    #[test]
    fn test_no_match() {
        let mut registry = RuleRegistry::new();
        registry.add(rule(r"\.png$", Strategy::CacheFirst, "images"));
        assert!(registry.resolve("https://example.com/data.bin").is_none());
        assert!(RuleRegistry::new().resolve("https://example.com/").is_none());
    }

    #[test]
    fn test_overrides_carried_through() {
        let spec = RuleSpec::new(r"/api/", Strategy::NetworkFirst, "api")
            .with_max_age(60)
            .with_timeout_ms(1500);
        let mut registry = RuleRegistry::new();
        registry.add(CacheRule::compile(&spec).unwrap());

        let resolved = registry.resolve("https://example.com/api/items").unwrap();
        assert_eq!(resolved.max_age, Some(Duration::from_secs(60)));
        assert_eq!(resolved.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = CacheRule::compile(&RuleSpec::new("(unclosed", Strategy::CacheFirst, "images"));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_default_rules_classify() {
        let mut registry = RuleRegistry::new();
        for spec in default_rules() {
            registry.add(CacheRule::compile(&spec).unwrap());
        }

        let cases = [
            ("https://example.com/img/hero.JPG", "images"),
            ("https://example.com/fonts/inter.woff2", "fonts"),
            ("https://example.com/app.js?v=3", "static"),
            ("https://example.com/styles/site.css", "static"),
            ("https://example.com/api/posts", "api"),
            ("https://api.example.com/v1/me", "api"),
            ("https://example.com/blog/post.html", "pages"),
            ("https://example.com/", "pages"),
        ];
        for (url, partition) in cases {
            assert_eq!(registry.resolve(url).unwrap().partition, partition, "{url}");
        }
        assert!(registry.resolve("https://example.com/feed.xml").is_none());
    }
}
