//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::{
    ServerState,
    cache::{
        CacheAddRuleParams, CacheClearParams, CacheFetchParams, CacheTrimParams, add_rule_impl, clear_impl,
        fetch_impl, reset_impl, status_impl, trim_impl,
    },
    lifecycle::{skip_waiting_impl, update_impl, version_impl},
};

use std::sync::Arc;

use intercache_client::{FetchClient, FetchConfig};
use intercache_core::{AppConfig, Error};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for intercache.
#[derive(Clone)]
pub struct CacheServer {
    tool_router: ToolRouter<Self>,
    state: ServerState,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CacheServer {
    /// Create a new server handler around a registration with an active engine.
    pub fn new(state: ServerState) -> Self {
        Self { tool_router: Self::tool_router(), state }
    }

    #[tool(
        description = "Run a request through the cache engine. Returns the response (with its source: cache, network or offline) or a typed failure."
    )]
    async fn cache_fetch(&self, params: Parameters<CacheFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.state, params.0).await
    }

    #[tool(
        description = "Append a caching rule {pattern, strategy, partition, maxAge?, timeoutMs?} to the active engine. Rules match in order, first match wins."
    )]
    async fn cache_add_rule(&self, params: Parameters<CacheAddRuleParams>) -> Result<CallToolResult, McpError> {
        add_rule_impl(&self.state, params.0).await
    }

    #[tool(description = "Hit/miss telemetry and per-partition entries, maxEntries and strategy.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.state).await
    }

    #[tool(description = "Delete all entries of one partition, or of every partition with all=true.")]
    async fn cache_clear(&self, params: Parameters<CacheClearParams>) -> Result<CallToolResult, McpError> {
        clear_impl(&self.state, params.0).await
    }

    #[tool(
        description = "Trim a partition to its entry bound (oldest inserted first), or run a full expiry and quota sweep when no partition is given."
    )]
    async fn cache_trim(&self, params: Parameters<CacheTrimParams>) -> Result<CallToolResult, McpError> {
        trim_impl(&self.state, params.0).await
    }

    #[tool(description = "Reset hit and miss counters to zero.")]
    async fn telemetry_reset(&self) -> Result<CallToolResult, McpError> {
        reset_impl(&self.state).await
    }

    #[tool(description = "Version identifier of the active configuration.")]
    async fn lifecycle_version(&self) -> Result<CallToolResult, McpError> {
        version_impl(&self.state).await
    }

    #[tool(description = "Activate the waiting engine immediately, retiring the active one.")]
    async fn lifecycle_skip_waiting(&self) -> Result<CallToolResult, McpError> {
        skip_waiting_impl(&self.state).await
    }

    #[tool(
        description = "Reload configuration and install a new engine. It waits for lifecycle_skip_waiting unless nothing is active."
    )]
    async fn lifecycle_update(&self) -> Result<CallToolResult, McpError> {
        let config = AppConfig::load().map_err(|e| Error::Config(e.to_string()))?;
        let fetcher = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
        update_impl(&self.state, config, fetcher).await
    }
}

impl ServerHandler for CacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "intercache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{fetcher, state};

    #[tokio::test]
    async fn test_all_tools_listed() {
        let server = CacheServer::new(state(fetcher()).await);
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cache_add_rule",
                "cache_clear",
                "cache_fetch",
                "cache_status",
                "cache_trim",
                "lifecycle_skip_waiting",
                "lifecycle_update",
                "lifecycle_version",
                "telemetry_reset",
            ]
        );
    }

    #[tokio::test]
    async fn test_server_info() {
        let server = CacheServer::new(state(fetcher()).await);
        let info = server.get_info();
        assert_eq!(info.server_info.name, "intercache");
    }
}
