//! cache_fetch tool implementation.
//!
//! Runs one request through the active engine, exactly as an intercepted
//! request would be handled.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{ServerState, json_result};
use intercache_client::{InterceptedRequest, Method, Outcome, ResponseSource};
use intercache_core::Error;

/// Longest body excerpt returned to the caller, in characters.
const MAX_BODY_PREVIEW: usize = 4096;

/// Parameters for the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchParams {
    /// The URL to request.
    pub url: String,

    /// HTTP method (default: GET). Anything else bypasses the cache.
    #[serde(default)]
    pub method: Option<String>,

    /// Treat the request as a top-level navigation (offline document on failure).
    #[serde(default)]
    pub navigation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Response,
    FetchFailed,
    NotAvailableOffline,
}

/// Output from the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchOutput {
    /// Normalized request URL.
    pub url: String,
    pub outcome: FetchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResponseSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Body size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_bytes: Option<usize>,
    /// Lossy UTF-8 excerpt of the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Implementation of the cache_fetch tool.
pub async fn fetch_impl(state: &ServerState, params: CacheFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let method = match params.method.as_deref() {
        None => Method::GET,
        Some(raw) => Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {raw}")))?,
    };

    let request = InterceptedRequest { url: params.url.clone(), method, navigation: params.navigation };
    let outcome = state.active().await?.handle(request).await?;

    let output = match outcome {
        Outcome::Response(response) => {
            let text = String::from_utf8_lossy(&response.body);
            CacheFetchOutput {
                url: response.url,
                outcome: FetchOutcome::Response,
                status: Some(response.status),
                source: Some(response.source),
                content_type: response.content_type,
                body_bytes: Some(response.body.len()),
                body: Some(text.chars().take(MAX_BODY_PREVIEW).collect()),
                reason: None,
            }
        }
        Outcome::FetchFailed { url, reason } => CacheFetchOutput {
            url,
            outcome: FetchOutcome::FetchFailed,
            status: None,
            source: None,
            content_type: None,
            body_bytes: None,
            body: None,
            reason: Some(reason),
        },
        Outcome::NotAvailableOffline { url } => CacheFetchOutput {
            reason: Some(format!("{url} is not available offline")),
            url,
            outcome: FetchOutcome::NotAvailableOffline,
            status: None,
            source: None,
            content_type: None,
            body_bytes: None,
            body: None,
        },
    };

    json_result(&output)
}
