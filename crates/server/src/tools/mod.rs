//! MCP tool implementations.
//!
//! This module contains all tools exposed by the intercache server. Each tool
//! has a `*_impl` function taking the shared [`ServerState`] so it can be
//! exercised without a transport.

pub mod cache;
pub mod lifecycle;

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use intercache_client::{CacheEngine, Fetcher, Registration};
use intercache_core::{CacheDb, Error};

/// Everything the tools need: the registration serving requests, plus the
/// database and fetcher used to build replacement engines.
#[derive(Clone)]
pub struct ServerState {
    pub registration: Arc<Registration>,
    pub db: CacheDb,
    pub fetcher: Arc<dyn Fetcher>,
}

impl ServerState {
    pub fn new(db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { registration: Arc::new(Registration::new()), db, fetcher }
    }

    /// The engine currently serving requests.
    pub async fn active(&self) -> Result<Arc<CacheEngine>, Error> {
        self.registration.active().await.ok_or(Error::EngineClosed)
    }
}

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
