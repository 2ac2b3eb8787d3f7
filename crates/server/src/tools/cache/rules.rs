//! cache_add_rule tool implementation.
//!
//! Sends an `ADD_CACHE_RULE` control message to the active engine. Injected
//! rules are appended after every existing rule and behave like startup rules.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{ServerState, json_result};
use intercache_client::{ControlMessage, ControlReply};
use intercache_core::{Error, RuleSpec};

/// Parameters for the cache_add_rule tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheAddRuleParams {
    /// Rule to append: `{pattern, strategy, partition, maxAge?, timeoutMs?}`.
    pub rule: RuleSpec,
}

/// Output from the cache_add_rule tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheAddRuleOutput {
    /// Position of the new rule in match order.
    pub index: usize,
    /// Version of the engine that accepted the rule.
    pub version: String,
}

/// Implementation of the cache_add_rule tool.
pub async fn add_rule_impl(state: &ServerState, params: CacheAddRuleParams) -> Result<CallToolResult, McpError> {
    let engine = state.active().await?;
    let reply = engine
        .control()
        .send(ControlMessage::AddCacheRule { rule: params.rule })
        .await?;

    let ControlReply::RuleAdded { index } = reply else {
        return Err(Error::InvalidInput(format!("unexpected engine reply: {reply:?}")).into());
    };

    json_result(&CacheAddRuleOutput { index, version: engine.version().to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::cache::fetch::{CacheFetchOutput, CacheFetchParams, fetch_impl};
    use crate::tools::test_support::{fetcher, output, state};
    use intercache_client::ResponseSource;
    use intercache_core::Strategy;

    const SVG: &str = "https://example.com/icon.svg";

    #[tokio::test]
    async fn test_injected_rule_takes_effect() {
        let fetcher = fetcher();
        fetcher.respond(SVG, 200, "image/svg+xml", "<svg/>");
        let state = state(fetcher.clone()).await;

        let params = CacheAddRuleParams { rule: RuleSpec::new(r"\.svg$", Strategy::CacheFirst, "images") };
        let out: CacheAddRuleOutput = output(&add_rule_impl(&state, params).await.unwrap());
        assert_eq!(out.index, 2);
        assert_eq!(out.version, "v1");

        let fetch = || CacheFetchParams { url: SVG.into(), method: None, navigation: false };
        fetch_impl(&state, fetch()).await.unwrap();
        let second: CacheFetchOutput = output(&fetch_impl(&state, fetch()).await.unwrap());
        assert_eq!(second.source, Some(ResponseSource::Cache));
        assert_eq!(fetcher.calls_for(SVG), 1);
    }

    #[tokio::test]
    async fn test_unknown_partition_rejected() {
        let state = state(fetcher()).await;
        let params = CacheAddRuleParams { rule: RuleSpec::new(r"\.mp4$", Strategy::CacheFirst, "videos") };
        let err = add_rule_impl(&state, params).await.unwrap_err();
        assert_eq!(err.code.0, -32003);
    }

    #[tokio::test]
    async fn test_invalid_pattern_rejected() {
        let state = state(fetcher()).await;
        let params = CacheAddRuleParams { rule: RuleSpec::new("(", Strategy::CacheFirst, "images") };
        let err = add_rule_impl(&state, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }

    #[test]
    fn test_params_accept_camel_case_rule() {
        let params: CacheAddRuleParams = serde_json::from_str(
            r#"{"rule":{"pattern":"/api/","strategy":"networkFirst","partition":"pages","maxAge":30,"timeoutMs":500}}"#,
        )
        .unwrap();
        assert_eq!(params.rule.strategy, Strategy::NetworkFirst);
        assert_eq!(params.rule.timeout_ms, Some(500));
    }
}
