//! Install and activation lifecycle.
//!
//! ```text
//! parsed -> installing -> installed -> activating -> active -> redundant
//!               |                                        ^
//!               +--------------- (install failed) -------+
//! ```
//!
//! Installing precaches the manifest into the static partition, all or nothing.
//! Precached entries are pinned, so runtime writes to the same partition never
//! trim them away.
//! Activating deletes every stored partition the current configuration does not
//! name, then starts the quota monitor.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::CacheEngine;
use super::quota::QuotaMonitor;
use super::registration::Slots;
use crate::fetch::{FetchResponse, canonicalize};
use intercache_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, install not yet attempted.
    Parsed,
    Installing,
    /// Precache complete, waiting to be activated.
    Installed,
    Activating,
    Active,
    /// Install failed, or superseded by a newer engine.
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(super) struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    /// Serializes transitions.
    transition: Mutex<()>,
    skip_waiting: AtomicBool,
    monitor: Mutex<Option<JoinHandle<()>>>,
    quota: QuotaMonitor,
}

impl Lifecycle {
    pub(super) fn new(quota: QuotaMonitor) -> Self {
        let (state, _) = watch::channel(LifecycleState::Parsed);
        Self {
            state,
            transition: Mutex::new(()),
            skip_waiting: AtomicBool::new(false),
            monitor: Mutex::new(None),
            quota,
        }
    }

    pub(super) fn quota(&self) -> &QuotaMonitor {
        &self.quota
    }

    fn get(&self) -> LifecycleState {
        *self.state.borrow()
    }

    fn set(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        tracing::info!(from = %previous, to = %next, "lifecycle transition");
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().take() {
            monitor.abort();
        }
    }
}

impl CacheEngine {
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    /// Subscribe to lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.state.subscribe()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.lifecycle.skip_waiting.load(Ordering::SeqCst)
    }

    /// Register partitions and precache the manifest.
    ///
    /// Any unreachable or unsuccessful manifest entry fails the whole install,
    /// leaves the static partition untouched and marks the engine redundant.
    pub async fn install(&self) -> Result<(), Error> {
        let _transition = self.lifecycle.transition.lock().await;
        let state = self.lifecycle.get();
        if state != LifecycleState::Parsed {
            return Err(Error::InvalidInput(format!("cannot install from state {state}")));
        }
        self.lifecycle.set(LifecycleState::Installing);

        let result = async {
            self.store.register_all(&self.version).await?;
            self.precache().await
        }
        .await;

        match result {
            Ok(count) => {
                tracing::info!(version = %self.version, precached = count, "install complete");
                self.lifecycle.set(LifecycleState::Installed);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(version = %self.version, error = %e, "install failed");
                self.lifecycle.set(LifecycleState::Redundant);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let mut manifest = Vec::with_capacity(self.precache.len() + 1);
        for raw in self.precache.iter().chain(self.offline_url.iter()) {
            let url = canonicalize(raw).map_err(|e| Error::Config(format!("precache entry {raw:?}: {e}")))?;
            if !manifest.contains(&url) {
                manifest.push(url);
            }
        }
        if manifest.is_empty() {
            return Ok(0);
        }
        if let Some(partition) = self.store.partition(&self.static_partition)
            && partition.is_bounded()
            && manifest.len() > partition.max_entries
        {
            return Err(Error::Config(format!(
                "precache manifest has {} entries but partition {} holds at most {}",
                manifest.len(),
                partition.name,
                partition.max_entries
            )));
        }

        let mut join_set = JoinSet::new();
        for url in manifest {
            let fetcher = self.fetcher.clone();
            join_set.spawn(async move {
                let result = fetcher.fetch(&url).await;
                (url, result)
            });
        }

        let mut fetched: Vec<FetchResponse> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (url, result) = joined.map_err(|e| Error::Config(format!("precache task failed: {e}")))?;
            match result {
                Ok(response) if response.is_cacheable() => fetched.push(response),
                Ok(response) => failures.push(format!("{url} returned {}", response.status.as_u16())),
                Err(e) => failures.push(format!("{url}: {e}")),
            }
        }

        if !failures.is_empty() {
            failures.sort();
            return Err(Error::Config(format!("precache failed: {}", failures.join("; "))));
        }

        let entries: Vec<_> = fetched
            .iter()
            .map(|response| (response.url.to_string(), response.to_stored()))
            .collect();
        self.store.put_precached(&self.static_partition, &entries).await?;
        Ok(entries.len())
    }

    /// Delete stale partitions and start serving.
    ///
    /// Activating an already active engine is a no-op.
    pub async fn activate(&self) -> Result<(), Error> {
        let _transition = self.lifecycle.transition.lock().await;
        match self.lifecycle.get() {
            LifecycleState::Installed => {}
            LifecycleState::Active => return Ok(()),
            state => return Err(Error::InvalidInput(format!("cannot activate from state {state}"))),
        }
        self.lifecycle.set(LifecycleState::Activating);

        match self.store.drop_unconfigured().await {
            Ok(dropped) => {
                if !dropped.is_empty() {
                    tracing::info!(version = %self.version, ?dropped, "deleted stale partitions");
                }
            }
            Err(e) => {
                self.lifecycle.set(LifecycleState::Installed);
                return Err(e);
            }
        }

        let mut monitor = self.lifecycle.monitor.lock().await;
        if let Some(previous) = monitor.replace(self.lifecycle.quota.clone().spawn()) {
            previous.abort();
        }
        self.lifecycle.set(LifecycleState::Active);
        Ok(())
    }

    /// Link the engine to the registration that owns it. Returns false when it
    /// already belongs to one.
    pub(super) fn attach(&self, slots: &Arc<Slots>) -> bool {
        self.registration.set(Arc::downgrade(slots)).is_ok()
    }

    /// Request activation without waiting for the current engine to retire.
    ///
    /// A registered engine that is waiting is promoted by its registration,
    /// superseding the active engine. A standalone installed engine activates
    /// immediately. An engine still installing remembers the request. Returns
    /// the resulting state.
    pub async fn skip_waiting(self: &Arc<Self>) -> Result<LifecycleState, Error> {
        self.lifecycle.skip_waiting.store(true, Ordering::SeqCst);
        match self.registration.get().and_then(Weak::upgrade) {
            Some(slots) => {
                slots.promote_waiting(self).await?;
            }
            None if self.lifecycle.get() == LifecycleState::Installed => self.activate().await?,
            None => {}
        }
        Ok(self.lifecycle.get())
    }

    /// Mark the engine redundant and stop its quota monitor.
    pub async fn retire(&self) {
        let _transition = self.lifecycle.transition.lock().await;
        if let Some(monitor) = self.lifecycle.monitor.lock().await.take() {
            monitor.abort();
        }
        if self.lifecycle.get() != LifecycleState::Redundant {
            self.lifecycle.set(LifecycleState::Redundant);
        }
    }
}
