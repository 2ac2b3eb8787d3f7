//! The request-interception cache engine.
//!
//! A [`CacheEngine`] is built from one configuration snapshot. It owns its
//! partition store, rule list, telemetry counters and lifecycle; several engines
//! may share a database while one replaces another (see [`Registration`]).
//!
//! Request flow: normalize the URL, resolve a rule, hand the (partition,
//! strategy) pair to the [`Dispatcher`]. Requests that match no rule, target an
//! unknown partition or use a method other than GET go straight to the network.

mod control;
mod dispatcher;
mod lifecycle;
mod quota;
mod registration;
mod request;

pub use control::{ControlMessage, ControlReply, EngineHandle};
pub use dispatcher::{Dispatcher, OfflineFallback};
pub use lifecycle::LifecycleState;
pub use quota::{QUOTA_PRESSURE_RATIO, QuotaMonitor, SqliteEstimator, StorageEstimate, StorageEstimator, SweepReport};
pub use registration::Registration;
pub use request::{EngineResponse, InterceptedRequest, OFFLINE_BODY, Outcome, ResponseSource};

use std::sync::{Arc, OnceLock, Weak};

use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};

use crate::fetch::{Fetcher, canonicalize, request_key};
use intercache_core::{
    AppConfig, CacheDb, CacheRule, ClearScope, Error, EvictionReport, PartitionStore, RuleRegistry, RuleSpec, Strategy,
    Telemetry, TelemetrySnapshot,
};

use lifecycle::Lifecycle;

const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// Per-partition line of the status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStatus {
    pub name: String,
    pub entries: u64,
    pub max_entries: usize,
    pub strategy: Strategy,
    pub max_age_secs: u64,
}

/// Answer to the status query consumed by operational tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub version: String,
    pub state: LifecycleState,
    pub telemetry: TelemetrySnapshot,
    pub partitions: Vec<PartitionStatus>,
    /// Number of active rules.
    pub rules: usize,
}

pub struct CacheEngine {
    version: String,
    store: PartitionStore,
    rules: RwLock<RuleRegistry>,
    telemetry: Arc<Telemetry>,
    fetcher: Arc<dyn Fetcher>,
    dispatcher: Dispatcher,
    lifecycle: Lifecycle,
    control: EngineHandle,
    precache: Vec<String>,
    static_partition: String,
    offline_url: Option<String>,
    registration: OnceLock<Weak<registration::Slots>>,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("version", &self.version)
            .field("state", &self.state())
            .field("store", &self.store)
            .finish()
    }
}

impl CacheEngine {
    /// Build an engine from `config` and start its control loop.
    ///
    /// Startup rules go through the same path as `ADD_CACHE_RULE`; a rule that
    /// fails to compile or targets an unknown partition is logged and skipped.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &AppConfig, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Arc<Self> {
        let store = PartitionStore::new(db, &config.partitions);

        let mut rules = RuleRegistry::new();
        for spec in &config.rules {
            match compile_rule(&store, spec) {
                Ok(rule) => rules.add(rule),
                Err(e) => tracing::warn!(pattern = %spec.pattern, partition = %spec.partition, error = %e, "skipping rule"),
            }
        }

        let offline_url = config.offline_url.as_deref().and_then(|raw| match request_key(raw) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(offline_url = raw, error = %e, "ignoring offline document");
                None
            }
        });

        let telemetry = Arc::new(Telemetry::new());
        let dispatcher = Dispatcher::new(
            store.clone(),
            telemetry.clone(),
            fetcher.clone(),
            config.network_timeout(),
            OfflineFallback { partition: config.static_partition.clone(), url: offline_url.clone() },
        );

        let estimator = config
            .quota_bytes
            .map(|quota| Arc::new(SqliteEstimator::new(store.clone(), quota)) as Arc<dyn StorageEstimator>);
        let quota = QuotaMonitor::new(store.clone(), estimator, config.quota_check_interval());

        let (tx, rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let engine = Arc::new(Self {
            version: config.version.clone(),
            store,
            rules: RwLock::new(rules),
            telemetry,
            fetcher,
            dispatcher,
            lifecycle: Lifecycle::new(quota),
            control: EngineHandle::new(tx),
            precache: config.precache.clone(),
            static_partition: config.static_partition.clone(),
            offline_url,
            registration: OnceLock::new(),
        });
        tokio::spawn(control::run(Arc::downgrade(&engine), rx));

        tracing::info!(
            version = %engine.version,
            partitions = engine.store.names().len(),
            "cache engine created"
        );
        engine
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    /// Sender for this engine's control channel.
    pub fn control(&self) -> EngineHandle {
        self.control.clone()
    }

    /// Handle one intercepted request.
    ///
    /// Only an unparseable URL is an error; every other failure is an [`Outcome`].
    pub async fn handle(&self, request: InterceptedRequest) -> Result<Outcome, Error> {
        let url = canonicalize(&request.url)?;

        if request.method != Method::GET {
            tracing::debug!(%url, method = %request.method, "not cacheable, passing through");
            return Ok(self.dispatcher.passthrough(&request, &url).await);
        }

        let resolved = self.rules.read().await.resolve(url.as_str());
        let Some(rule) = resolved else {
            tracing::debug!(%url, "no rule matched, passing through");
            return Ok(self.dispatcher.passthrough(&request, &url).await);
        };

        if !self.store.contains(&rule.partition) {
            let err = Error::Config(format!("rule {} targets unknown partition {}", rule.index, rule.partition));
            tracing::warn!(%url, error = %err, "passing through");
            return Ok(self.dispatcher.passthrough(&request, &url).await);
        }

        Ok(self.dispatcher.dispatch(&request, &url, &rule).await)
    }

    /// Append a rule to the end of the rule list and return its position.
    pub(crate) async fn add_rule(&self, spec: RuleSpec) -> Result<usize, Error> {
        let rule = compile_rule(&self.store, &spec)?;
        let mut rules = self.rules.write().await;
        rules.add(rule);
        let index = rules.len() - 1;
        tracing::info!(index, pattern = %spec.pattern, partition = %spec.partition, strategy = %spec.strategy, "rule added");
        Ok(index)
    }

    /// Patterns of the active rules, in match order.
    pub async fn rule_patterns(&self) -> Vec<String> {
        self.rules
            .read()
            .await
            .rules()
            .iter()
            .map(|rule| rule.pattern().to_string())
            .collect()
    }

    pub async fn telemetry(&self) -> Result<TelemetrySnapshot, Error> {
        Ok(self.telemetry.snapshot(self.store.entry_counts().await?))
    }

    pub fn reset_telemetry(&self) {
        self.telemetry.reset();
        tracing::info!(version = %self.version, "telemetry reset");
    }

    pub async fn status(&self) -> Result<StatusReport, Error> {
        let counts = self.store.entry_counts().await?;
        let partitions = self
            .store
            .partitions()
            .zip(counts.iter())
            .map(|(partition, (_, entries))| PartitionStatus {
                name: partition.name.clone(),
                entries: *entries,
                max_entries: partition.max_entries,
                strategy: partition.strategy,
                max_age_secs: partition.max_age.as_secs(),
            })
            .collect();

        Ok(StatusReport {
            version: self.version.clone(),
            state: self.state(),
            telemetry: self.telemetry.snapshot(counts),
            partitions,
            rules: self.rules.read().await.len(),
        })
    }

    pub async fn clear(&self, scope: &ClearScope) -> Result<EvictionReport, Error> {
        self.store.clear(scope).await
    }

    /// Trim one partition, or every partition when `partition` is `None`.
    pub async fn trim(&self, partition: Option<&str>) -> Result<EvictionReport, Error> {
        match partition {
            Some(name) => {
                let deleted = self.store.trim(name).await?;
                let evicted = if deleted > 0 { vec![(name.to_string(), deleted)] } else { Vec::new() };
                Ok(EvictionReport { evicted, ..Default::default() })
            }
            None => self.store.trim_all().await,
        }
    }

    /// Run one quota monitor sweep now.
    pub async fn sweep(&self) -> Result<SweepReport, Error> {
        self.lifecycle.quota().check().await
    }
}

fn compile_rule(store: &PartitionStore, spec: &RuleSpec) -> Result<CacheRule, Error> {
    let rule = CacheRule::compile(spec)?;
    if !store.contains(&rule.partition) {
        return Err(Error::Config(format!(
            "rule {:?} targets unknown partition {}",
            spec.pattern, spec.partition
        )));
    }
    Ok(rule)
}
