//! Intercepted requests and the engine's answers.

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::fetch::FetchResponse;
use intercache_core::CacheEntry;

/// Body of the synthetic response given to navigations with nothing to show.
pub const OFFLINE_BODY: &str = "You are offline and this page is not available from the cache.";

/// A request seen at the interception point.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: Method,
    /// Top-level document navigation; total failure serves the offline document.
    pub navigation: bool,
}

impl InterceptedRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: Method::GET, navigation: false }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: Method::GET, navigation: true }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Served from the partition store without waiting on the network.
    Cache,
    Network,
    /// Offline fallback document or placeholder.
    Offline,
}

/// A response handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl EngineResponse {
    pub fn from_entry(entry: CacheEntry, source: ResponseSource) -> Self {
        Self {
            url: entry.url,
            status: entry.response.status,
            content_type: entry.response.content_type,
            headers: entry.response.headers,
            body: Bytes::from(entry.response.body),
            source,
        }
    }

    pub fn from_network(response: FetchResponse) -> Self {
        let stored = response.to_stored();
        Self {
            url: response.url.to_string(),
            status: stored.status,
            content_type: stored.content_type,
            headers: stored.headers,
            body: response.bytes,
            source: ResponseSource::Network,
        }
    }

    /// 503 plain-text placeholder for a navigation that failed everywhere.
    pub fn offline_placeholder(url: &str) -> Self {
        Self {
            url: url.to_string(),
            status: 503,
            content_type: Some("text/plain; charset=utf-8".to_string()),
            headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
            body: Bytes::from_static(OFFLINE_BODY.as_bytes()),
            source: ResponseSource::Offline,
        }
    }
}

/// Typed result of handling one request. Failures never escape as panics or
/// errors from the interception point.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Response(EngineResponse),
    /// The network was needed and did not deliver.
    FetchFailed { url: String, reason: String },
    /// cache-only miss: the resource is not available offline.
    NotAvailableOffline { url: String },
}

impl Outcome {
    pub fn response(&self) -> Option<&EngineResponse> {
        match self {
            Outcome::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<EngineResponse> {
        match self {
            Outcome::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Outcome::Response(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_placeholder() {
        let response = EngineResponse::offline_placeholder("https://example.com/");
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Offline);
        assert!(response.content_type.as_deref().unwrap().starts_with("text/plain"));
        assert_eq!(&response.body[..], OFFLINE_BODY.as_bytes());
    }

    #[test]
    fn test_request_constructors() {
        let nav = InterceptedRequest::navigate("https://example.com/");
        assert!(nav.navigation);
        assert_eq!(nav.method, Method::GET);

        let post = InterceptedRequest::get("https://example.com/api/form").with_method(Method::POST);
        assert!(!post.navigation);
        assert_eq!(post.method, Method::POST);
    }

    #[test]
    fn test_outcome_accessors() {
        let failed = Outcome::FetchFailed { url: "u".into(), reason: "r".into() };
        assert!(!failed.is_response());
        assert!(failed.response().is_none());

        let ok = Outcome::Response(EngineResponse::offline_placeholder("u"));
        assert!(ok.is_response());
        assert_eq!(ok.into_response().unwrap().status, 503);
    }
}
