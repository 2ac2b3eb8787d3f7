//! cache_trim tool implementation.
//!
//! Trims one partition to its entry bound, or runs a full quota sweep (expiry,
//! storage estimate, trim of every partition) when no partition is given.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{ServerState, json_result};
use intercache_client::SweepReport;

/// Parameters for the cache_trim tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheTrimParams {
    /// Partition to trim. Omit to sweep every partition.
    #[serde(default)]
    pub partition: Option<String>,
}

/// Output from the cache_trim tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheTrimOutput {
    /// (partition, deleted entries) for partitions that lost entries.
    pub evicted: Vec<(String, u64)>,
    /// Total number of entries deleted.
    pub deleted: u64,
    /// Full sweep details when no partition was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepReport>,
}

/// Implementation of the cache_trim tool.
pub async fn trim_impl(state: &ServerState, params: CacheTrimParams) -> Result<CallToolResult, McpError> {
    let engine = state.active().await?;

    let output = match params.partition.as_deref() {
        Some(name) => {
            let report = engine.trim(Some(name)).await?;
            CacheTrimOutput { deleted: report.total(), evicted: report.evicted, sweep: None }
        }
        None => {
            let sweep = engine.sweep().await?;
            let mut evicted = sweep.expired.evicted.clone();
            evicted.extend(sweep.trimmed.evicted.iter().cloned());
            let deleted = sweep.expired.total() + sweep.trimmed.total();
            CacheTrimOutput { evicted, deleted, sweep: Some(sweep) }
        }
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{fetcher, output, state};
    use intercache_core::StoredResponse;

    #[tokio::test]
    async fn test_trim_partition_over_bound() {
        let state = state(fetcher()).await;
        let engine = state.active().await.unwrap();
        let body = StoredResponse::new(200, None, b"x".to_vec());
        // Bypass the write path so the partition overshoots its bound of 3.
        for i in 0..8 {
            engine
                .store()
                .db()
                .put_entry("images", &format!("https://example.com/{i}.png"), &body, None)
                .await
                .unwrap();
        }

        let params = CacheTrimParams { partition: Some("images".into()) };
        let out: CacheTrimOutput = output(&trim_impl(&state, params).await.unwrap());
        assert_eq!(out.deleted, 5);
        assert_eq!(engine.store().entry_count("images").await.unwrap(), 3);
        assert!(engine.store().get("images", "https://example.com/0.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_all() {
        let state = state(fetcher()).await;
        let engine = state.active().await.unwrap();
        let body = StoredResponse::new(200, None, b"x".to_vec());
        let old = chrono::Utc::now() - chrono::Duration::hours(2);
        engine
            .store()
            .db()
            .put_entry_at("pages", "https://example.com/old/", &body, None, old)
            .await
            .unwrap();

        let out: CacheTrimOutput = output(&trim_impl(&state, CacheTrimParams::default()).await.unwrap());
        assert_eq!(out.deleted, 1);
        assert_eq!(out.sweep.unwrap().expired.evicted, vec![("pages".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_trim_unknown_partition() {
        let state = state(fetcher()).await;
        let params = CacheTrimParams { partition: Some("videos".into()) };
        assert!(trim_impl(&state, params).await.is_err());
    }
}
