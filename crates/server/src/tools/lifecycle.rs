//! Lifecycle MCP tools: version query, skip-wait and configuration update.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use std::sync::Arc;

use crate::tools::{ServerState, json_result};
use intercache_client::{CacheEngine, ControlMessage, ControlReply, Fetcher, LifecycleState};
use intercache_core::{AppConfig, Error};

/// Output from the lifecycle_version tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionOutput {
    /// Version of the active configuration, as answered by `GET_VERSION`.
    pub version: String,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_version: Option<String>,
}

/// Output from the lifecycle_skip_waiting tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkipWaitingOutput {
    /// Whether a waiting engine was promoted.
    pub promoted: bool,
    /// Version now serving requests.
    pub active_version: String,
}

/// Output from the lifecycle_update tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutput {
    /// Version of the newly installed engine.
    pub version: String,
    /// `active` when it took over immediately, `installed` when it is waiting.
    pub state: LifecycleState,
    pub active_version: String,
}

/// Implementation of the lifecycle_version tool.
pub async fn version_impl(state: &ServerState) -> Result<CallToolResult, McpError> {
    let engine = state.active().await?;
    let reply = engine.control().send(ControlMessage::GetVersion).await?;
    let ControlReply::Version { version } = reply else {
        return Err(Error::InvalidInput(format!("unexpected engine reply: {reply:?}")).into());
    };

    let waiting_version = state
        .registration
        .waiting()
        .await
        .map(|engine| engine.version().to_string());

    json_result(&VersionOutput { version, state: engine.state(), waiting_version })
}

/// Implementation of the lifecycle_skip_waiting tool.
pub async fn skip_waiting_impl(state: &ServerState) -> Result<CallToolResult, McpError> {
    let promoted = state.registration.skip_waiting().await?;
    let active_version = state.active().await?.version().to_string();
    json_result(&SkipWaitingOutput { promoted: promoted.is_some(), active_version })
}

/// Implementation of the lifecycle_update tool.
///
/// Builds a new engine from `config` and `fetcher` on the same database and
/// registers it. The database path of `config` is ignored; the running store
/// stays in place. The fetcher is built from the reloaded configuration, so
/// user agent, timeout and size limit changes apply to the new engine only.
pub async fn update_impl(
    state: &ServerState, config: AppConfig, fetcher: Arc<dyn Fetcher>,
) -> Result<CallToolResult, McpError> {
    let engine = CacheEngine::new(&config, state.db.clone(), fetcher);
    let lifecycle = state.registration.register(engine.clone()).await?;
    let active_version = state.active().await?.version().to_string();

    tracing::info!(version = %engine.version(), state = %lifecycle, "configuration update registered");
    json_result(&UpdateOutput { version: engine.version().to_string(), state: lifecycle, active_version })
}
