//! telemetry_reset tool implementation.
//!
//! Zeroes the active engine's hit and miss counters. Stored entries are untouched.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::{ServerState, json_result};

/// Implementation of the telemetry_reset tool. Returns the snapshot after the reset.
pub async fn reset_impl(state: &ServerState) -> Result<CallToolResult, McpError> {
    let engine = state.active().await?;
    engine.reset_telemetry();
    json_result(&engine.telemetry().await?)
}
