//! cache_clear tool implementation.
//!
//! Deletes entries unconditionally from one partition or from all of them.
//! Clearing an empty partition succeeds and reports nothing deleted.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{ServerState, json_result};
use intercache_core::{ClearScope, Error};

/// Parameters for the cache_clear tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearParams {
    /// Partition to clear.
    #[serde(default)]
    pub partition: Option<String>,

    /// Clear every partition.
    #[serde(default)]
    pub all: bool,
}

/// Output from the cache_clear tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearOutput {
    /// (partition, deleted entries) for partitions that lost entries.
    pub cleared: Vec<(String, u64)>,
    /// Total number of entries deleted.
    pub deleted: u64,
    /// (partition, error) for partitions that could not be cleared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<(String, String)>,
}

/// Implementation of the cache_clear tool.
pub async fn clear_impl(state: &ServerState, params: CacheClearParams) -> Result<CallToolResult, McpError> {
    let scope = match (params.partition, params.all) {
        (Some(_), true) => {
            return Err(Error::InvalidInput("specify either partition or all, not both".into()).into());
        }
        (Some(name), false) => ClearScope::Partition(name),
        (None, true) => ClearScope::All,
        (None, false) => {
            return Err(Error::InvalidInput("one of partition or all must be specified".into()).into());
        }
    };

    let report = state.active().await?.clear(&scope).await?;
    let deleted = report.total();
    json_result(&CacheClearOutput { cleared: report.evicted, deleted, failed: report.failed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::cache::fetch::{CacheFetchParams, fetch_impl};
    use crate::tools::test_support::{PAGE, PNG, fetcher, output, state};

    async fn warm(state: &ServerState) {
        for url in [PNG, PAGE] {
            let params = CacheFetchParams { url: url.into(), method: None, navigation: false };
            fetch_impl(state, params).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_clear_partition_twice() {
        let state = state(fetcher()).await;
        warm(&state).await;

        let params = CacheClearParams { partition: Some("images".into()), all: false };
        let first: CacheClearOutput = output(&clear_impl(&state, params.clone()).await.unwrap());
        assert_eq!(first.deleted, 1);

        let second: CacheClearOutput = output(&clear_impl(&state, params).await.unwrap());
        assert_eq!(second.deleted, 0);
        assert!(second.cleared.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let state = state(fetcher()).await;
        warm(&state).await;

        let out: CacheClearOutput =
            output(&clear_impl(&state, CacheClearParams { partition: None, all: true }).await.unwrap());
        assert_eq!(out.deleted, 2);
        assert_eq!(out.cleared, vec![("images".to_string(), 1), ("pages".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_clear_requires_scope() {
        let state = state(fetcher()).await;
        assert!(clear_impl(&state, CacheClearParams::default()).await.is_err());

        let both = CacheClearParams { partition: Some("images".into()), all: true };
        assert!(clear_impl(&state, both).await.is_err());

        let unknown = CacheClearParams { partition: Some("videos".into()), all: false };
        let err = clear_impl(&state, unknown).await.unwrap_err();
        assert_eq!(err.code.0, -32003);
    }
}
