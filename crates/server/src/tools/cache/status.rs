//! cache_status tool implementation.
//!
//! Telemetry snapshot plus per-partition `{entries, maxEntries, strategy}`.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{ServerState, json_result};
use intercache_client::StatusReport;

/// Output from the cache_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatusOutput {
    /// Status of the engine serving requests.
    pub active: StatusReport,
    /// Version of an installed engine waiting for `SKIP_WAITING`, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_version: Option<String>,
}

/// Implementation of the cache_status tool.
pub async fn status_impl(state: &ServerState) -> Result<CallToolResult, McpError> {
    let active = state.active().await?.status().await?;
    let waiting_version = state
        .registration
        .waiting()
        .await
        .map(|engine| engine.version().to_string());

    json_result(&CacheStatusOutput { active, waiting_version })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::cache::fetch::{CacheFetchParams, fetch_impl};
    use crate::tools::test_support::{PNG, fetcher, output, state};
    use intercache_client::LifecycleState;

    #[tokio::test]
    async fn test_status_after_traffic() {
        let state = state(fetcher()).await;
        for _ in 0..4 {
            let params = CacheFetchParams { url: PNG.into(), method: None, navigation: false };
            fetch_impl(&state, params).await.unwrap();
        }

        let out: CacheStatusOutput = output(&status_impl(&state).await.unwrap());
        assert_eq!(out.active.version, "v1");
        assert_eq!(out.active.state, LifecycleState::Active);
        assert_eq!(out.active.telemetry.hits, 3);
        assert_eq!(out.active.telemetry.misses, 1);
        assert_eq!(out.active.telemetry.rate_percent, 75.0);

        let images = out.active.partitions.iter().find(|p| p.name == "images").unwrap();
        assert_eq!(images.entries, 1);
        assert_eq!(images.max_entries, 3);
        assert!(out.waiting_version.is_none());
    }

    #[tokio::test]
    async fn test_status_without_engine() {
        let state = crate::tools::ServerState::new(
            intercache_core::CacheDb::open_in_memory().await.unwrap(),
            fetcher(),
        );
        let err = status_impl(&state).await.unwrap_err();
        assert_eq!(err.code.0, -32008);
    }
}
