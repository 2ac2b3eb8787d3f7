//! Scripted network double for tests.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! dependent crates' tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url, header};
use tokio::sync::watch;

use crate::fetch::{FetchResponse, Fetcher};
use intercache_core::Error;

#[derive(Debug, Clone)]
struct Scripted {
    status: u16,
    content_type: Option<String>,
    body: Bytes,
}

/// In-process [`Fetcher`] that serves scripted responses.
///
/// Unknown URLs answer 404. While offline every fetch fails with
/// `NETWORK_UNAVAILABLE`. While held, fetches block until released.
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    gate: watch::Sender<bool>,
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            delay: Mutex::new(None),
            gate,
        }
    }

    /// Builder form of [`ScriptedFetcher::respond`].
    pub fn with(self, url: &str, status: u16, content_type: &str, body: &str) -> Self {
        self.respond(url, status, content_type, body);
        self
    }

    /// Script (or replace) the response for `url`.
    pub fn respond(&self, url: &str, status: u16, content_type: &str, body: &str) {
        let scripted =
            Scripted { status, content_type: Some(content_type.to_string()), body: Bytes::from(body.to_string()) };
        self.routes.lock().unwrap().insert(url.to_string(), scripted);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Block every subsequent fetch until [`ScriptedFetcher::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Total fetches attempted.
    pub fn calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Fetches attempted for one URL.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, Error> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NetworkUnavailable(format!("offline: {url}")));
        }

        let scripted = self.routes.lock().unwrap().get(url.as_str()).cloned().unwrap_or(Scripted {
            status: 404,
            content_type: Some("text/plain".to_string()),
            body: Bytes::from_static(b"not found"),
        });

        let mut headers = header::HeaderMap::new();
        if let Some(content_type) = scripted.content_type.as_deref()
            && let Ok(value) = header::HeaderValue::from_str(content_type)
        {
            headers.insert(header::CONTENT_TYPE, value);
        }

        Ok(FetchResponse {
            url: url.clone(),
            final_url: url.clone(),
            status: StatusCode::from_u16(scripted.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            content_type: scripted.content_type,
            bytes: scripted.body,
            headers,
            fetch_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_and_unknown_routes() {
        let fetcher = ScriptedFetcher::new().with("https://example.com/a.css", 200, "text/css", "a{}");

        let ok = fetcher.fetch(&Url::parse("https://example.com/a.css").unwrap()).await.unwrap();
        assert_eq!(ok.status, StatusCode::OK);
        assert_eq!(&ok.bytes[..], b"a{}");

        let missing = fetcher.fetch(&Url::parse("https://example.com/b.css").unwrap()).await.unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(fetcher.calls_for("https://example.com/a.css"), 1);
    }

    #[tokio::test]
    async fn test_offline() {
        let fetcher = ScriptedFetcher::new().with("https://example.com/", 200, "text/html", "<p>");
        fetcher.set_offline(true);
        let result = fetcher.fetch(&Url::parse("https://example.com/").unwrap()).await;
        assert!(matches!(result, Err(Error::NetworkUnavailable(_))));
    }
}
