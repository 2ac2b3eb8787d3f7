//! Strategy dispatcher.
//!
//! Each strategy is a small state machine over check-store, fetch-network,
//! write-store and respond. Store and network failures are converted into an
//! [`Outcome`] at this boundary; nothing here returns an error to the caller.
//!
//! ### Telemetry
//! Every dispatch records exactly one counter: a hit when the response came out
//! of the store, a miss otherwise. Requests that bypass the cache record nothing.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use super::request::{EngineResponse, InterceptedRequest, Outcome, ResponseSource};
use crate::fetch::{FetchResponse, Fetcher};
use intercache_core::{CacheEntry, Error, PartitionStore, Resolved, Strategy, Telemetry};

/// Where navigations go when everything else failed.
#[derive(Debug, Clone, Default)]
pub struct OfflineFallback {
    /// Partition holding the offline document.
    pub partition: String,
    /// Normalized URL of the offline document, if one is configured.
    pub url: Option<String>,
}

/// Executes strategies against a shared store, fetcher and telemetry.
///
/// Cheap to clone; background revalidation runs on a clone.
#[derive(Clone)]
pub struct Dispatcher {
    store: PartitionStore,
    telemetry: Arc<Telemetry>,
    fetcher: Arc<dyn Fetcher>,
    network_timeout: Duration,
    fallback: OfflineFallback,
}

impl Dispatcher {
    pub fn new(
        store: PartitionStore, telemetry: Arc<Telemetry>, fetcher: Arc<dyn Fetcher>, network_timeout: Duration,
        fallback: OfflineFallback,
    ) -> Self {
        Self { store, telemetry, fetcher, network_timeout, fallback }
    }

    /// Run the resolved rule's strategy for `url`.
    pub async fn dispatch(&self, request: &InterceptedRequest, url: &Url, rule: &Resolved) -> Outcome {
        tracing::debug!(%url, partition = %rule.partition, strategy = %rule.strategy, "dispatching");

        let outcome = match rule.strategy {
            Strategy::CacheFirst => self.cache_first(url, rule).await,
            Strategy::NetworkFirst => self.network_first(url, rule).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(url, rule).await,
            Strategy::NetworkOnly => self.network_only(url).await,
            Strategy::CacheOnly => self.cache_only(url, rule).await,
        };

        self.finish(request, outcome).await
    }

    /// Send a request straight to the network without touching store or telemetry.
    pub async fn passthrough(&self, request: &InterceptedRequest, url: &Url) -> Outcome {
        let outcome = match self.fetch(url, None).await {
            Ok(response) => Outcome::Response(EngineResponse::from_network(response)),
            Err(e) => fetch_failed(url, &e),
        };
        self.finish(request, outcome).await
    }

    async fn cache_first(&self, url: &Url, rule: &Resolved) -> Outcome {
        if let Some(entry) = self.lookup(&rule.partition, url).await {
            self.telemetry.record_hit();
            return Outcome::Response(EngineResponse::from_entry(entry, ResponseSource::Cache));
        }

        self.telemetry.record_miss();
        match self.fetch(url, None).await {
            Ok(response) => {
                self.write(rule, url, &response).await;
                Outcome::Response(EngineResponse::from_network(response))
            }
            Err(e) => fetch_failed(url, &e),
        }
    }

    async fn network_first(&self, url: &Url, rule: &Resolved) -> Outcome {
        let budget = rule.timeout.unwrap_or(self.network_timeout);
        let error = match self.fetch(url, Some(budget)).await {
            Ok(response) => {
                self.telemetry.record_miss();
                self.write(rule, url, &response).await;
                return Outcome::Response(EngineResponse::from_network(response));
            }
            Err(e) => e,
        };

        tracing::debug!(%url, error = %error, "network attempt failed, checking store");
        match self.lookup(&rule.partition, url).await {
            Some(entry) => {
                self.telemetry.record_hit();
                Outcome::Response(EngineResponse::from_entry(entry, ResponseSource::Cache))
            }
            None => {
                self.telemetry.record_miss();
                fetch_failed(url, &error)
            }
        }
    }

    async fn stale_while_revalidate(&self, url: &Url, rule: &Resolved) -> Outcome {
        if let Some(entry) = self.lookup(&rule.partition, url).await {
            self.telemetry.record_hit();
            self.revalidate(url.clone(), rule.clone());
            return Outcome::Response(EngineResponse::from_entry(entry, ResponseSource::Cache));
        }

        self.telemetry.record_miss();
        match self.fetch(url, None).await {
            Ok(response) => {
                self.write(rule, url, &response).await;
                Outcome::Response(EngineResponse::from_network(response))
            }
            Err(e) => fetch_failed(url, &e),
        }
    }

    async fn network_only(&self, url: &Url) -> Outcome {
        self.telemetry.record_miss();
        match self.fetch(url, None).await {
            Ok(response) => Outcome::Response(EngineResponse::from_network(response)),
            Err(e) => fetch_failed(url, &e),
        }
    }

    async fn cache_only(&self, url: &Url, rule: &Resolved) -> Outcome {
        match self.lookup(&rule.partition, url).await {
            Some(entry) => {
                self.telemetry.record_hit();
                Outcome::Response(EngineResponse::from_entry(entry, ResponseSource::Cache))
            }
            None => {
                self.telemetry.record_miss();
                Outcome::NotAvailableOffline { url: url.to_string() }
            }
        }
    }

    /// Detached refresh of a stored entry. The responding path never awaits it.
    fn revalidate(&self, url: Url, rule: Resolved) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.fetch(&url, None).await {
                Ok(response) => this.write(&rule, &url, &response).await,
                Err(e) => tracing::warn!(%url, error = %e, "background revalidation failed"),
            }
        });
    }

    /// Navigations that ended without a response get the offline document.
    async fn finish(&self, request: &InterceptedRequest, outcome: Outcome) -> Outcome {
        if !request.navigation || outcome.is_response() {
            return outcome;
        }

        if let Some(offline_url) = self.fallback.url.as_deref() {
            match self.store.get(&self.fallback.partition, offline_url).await {
                Ok(Some(entry)) => {
                    return Outcome::Response(EngineResponse::from_entry(entry, ResponseSource::Offline));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "offline document lookup failed"),
            }
        }
        tracing::debug!(url = %request.url, "serving offline placeholder");
        Outcome::Response(EngineResponse::offline_placeholder(&request.url))
    }

    async fn lookup(&self, partition: &str, url: &Url) -> Option<CacheEntry> {
        match self.store.get(partition, url.as_str()).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(partition, %url, error = %e, "store read failed, treating as miss");
                None
            }
        }
    }

    async fn fetch(&self, url: &Url, budget: Option<Duration>) -> Result<FetchResponse, Error> {
        match budget {
            Some(budget) => tokio::time::timeout(budget, self.fetcher.fetch(url))
                .await
                .map_err(|_| Error::FetchTimeout(format!("no response within {}ms", budget.as_millis())))?,
            None => self.fetcher.fetch(url).await,
        }
    }

    /// Store a successful response. Non-2xx responses are never stored.
    async fn write(&self, rule: &Resolved, url: &Url, response: &FetchResponse) {
        if !response.is_cacheable() {
            tracing::debug!(%url, status = response.status.as_u16(), "not storing unsuccessful response");
            return;
        }
        if let Err(e) = self
            .store
            .put(&rule.partition, url.as_str(), &response.to_stored(), rule.max_age)
            .await
        {
            tracing::warn!(partition = %rule.partition, %url, error = %e, "store write failed");
        }
    }
}

fn fetch_failed(url: &Url, error: &Error) -> Outcome {
    Outcome::FetchFailed { url: url.to_string(), reason: error.to_string() }
}
