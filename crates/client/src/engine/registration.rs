//! Active and waiting engines.
//!
//! A registration holds at most one active engine, which serves requests, and
//! at most one installed engine waiting to replace it. Promotion activates the
//! waiting engine and retires the one it replaces. Registered engines keep a
//! weak link back to the registration, so a `SKIP_WAITING` delivered on an
//! engine's own control channel promotes it here as well.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::control::{ControlMessage, ControlReply};
use super::lifecycle::LifecycleState;
use super::request::{InterceptedRequest, Outcome};
use super::CacheEngine;
use intercache_core::Error;

#[derive(Debug, Default)]
pub(super) struct Slots {
    active: RwLock<Option<Arc<CacheEngine>>>,
    waiting: Mutex<Option<Arc<CacheEngine>>>,
}

impl Slots {
    async fn promote(&self, engine: Arc<CacheEngine>) -> Result<(), Error> {
        engine.activate().await?;
        let previous = self.active.write().await.replace(engine.clone());
        if let Some(previous) = previous
            && !Arc::ptr_eq(&previous, &engine)
        {
            tracing::info!(from = %previous.version(), to = %engine.version(), "engine superseded");
            previous.retire().await;
        }
        Ok(())
    }

    /// Promote `engine` if it is the waiting engine. Returns whether it was.
    pub(super) async fn promote_waiting(&self, engine: &Arc<CacheEngine>) -> Result<bool, Error> {
        let taken = {
            let mut waiting = self.waiting.lock().await;
            match waiting.as_ref() {
                Some(current) if Arc::ptr_eq(current, engine) => waiting.take(),
                _ => None,
            }
        };
        let Some(engine) = taken else {
            return Ok(false);
        };

        if let Err(e) = self.promote(engine.clone()).await {
            let mut waiting = self.waiting.lock().await;
            if waiting.is_none() {
                *waiting = Some(engine);
            }
            return Err(e);
        }
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct Registration {
    slots: Arc<Slots>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `engine` and either activate it or park it as the waiting engine.
    ///
    /// It activates immediately when nothing is active or when it already
    /// received a skip-wait request. A failed install leaves the current engines
    /// untouched.
    pub async fn register(&self, engine: Arc<CacheEngine>) -> Result<LifecycleState, Error> {
        if !engine.attach(&self.slots) {
            tracing::warn!(version = %engine.version(), "engine already belongs to another registration");
        }
        engine.install().await?;

        let has_active = self.slots.active.read().await.is_some();
        // The skip-wait flag is read under the waiting lock, which promote_waiting also takes.
        let mut waiting = self.slots.waiting.lock().await;
        if !has_active || engine.skip_waiting_requested() {
            drop(waiting);
            self.slots.promote(engine.clone()).await?;
        } else {
            tracing::info!(version = %engine.version(), "installed, waiting for activation");
            let replaced = waiting.replace(engine.clone());
            drop(waiting);
            if let Some(replaced) = replaced {
                replaced.retire().await;
            }
        }
        Ok(engine.state())
    }

    /// Force the waiting engine to take over.
    ///
    /// The request travels through the waiting engine's control channel.
    /// Returns the newly active version, or `None` when nothing was waiting.
    pub async fn skip_waiting(&self) -> Result<Option<String>, Error> {
        let Some(engine) = self.waiting().await else {
            return Ok(None);
        };

        match engine.control().send(ControlMessage::SkipWaiting).await? {
            ControlReply::SkipWaiting { state: LifecycleState::Active } => Ok(Some(engine.version().to_string())),
            reply => {
                tracing::warn!(?reply, version = %engine.version(), "skip-wait did not activate the waiting engine");
                Ok(None)
            }
        }
    }

    pub async fn active(&self) -> Option<Arc<CacheEngine>> {
        self.slots.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<CacheEngine>> {
        self.slots.waiting.lock().await.clone()
    }

    /// Route a request to the active engine.
    pub async fn handle(&self, request: InterceptedRequest) -> Result<Outcome, Error> {
        let engine = self.active().await.ok_or(Error::EngineClosed)?;
        engine.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use intercache_core::{AppConfig, CacheDb, PartitionConfig, StoredResponse, Strategy};

    fn config(version: &str, partitions: &[&str]) -> AppConfig {
        AppConfig {
            version: version.into(),
            partitions: partitions
                .iter()
                .map(|name| PartitionConfig::new(*name, Strategy::CacheFirst, 0, 0))
                .collect(),
            static_partition: partitions[0].to_string(),
            rules: Vec::new(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_engine_activates_immediately() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let registration = Registration::new();
        let engine = CacheEngine::new(&config("v1", &["A"]), db, Arc::new(ScriptedFetcher::new()));

        let state = registration.register(engine).await.unwrap();
        assert_eq!(state, LifecycleState::Active);
        assert_eq!(registration.active().await.unwrap().version(), "v1");
        assert!(registration.waiting().await.is_none());
    }

    #[tokio::test]
    async fn test_rollover_waits_for_skip_waiting() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let registration = Registration::new();
        let fetcher = Arc::new(ScriptedFetcher::new());

        let v1 = CacheEngine::new(&config("v1", &["A", "B", "C"]), db.clone(), fetcher.clone());
        registration.register(v1.clone()).await.unwrap();
        let body = StoredResponse::new(200, None, b"x".to_vec());
        for name in ["A", "B", "C"] {
            v1.store().put(name, "https://example.com/", &body, None).await.unwrap();
        }

        let v2 = CacheEngine::new(&config("v2", &["A", "B"]), db.clone(), fetcher);
        let state = registration.register(v2.clone()).await.unwrap();
        assert_eq!(state, LifecycleState::Installed);
        assert_eq!(registration.active().await.unwrap().version(), "v1");
        assert_eq!(v1.store().entry_count("C").await.unwrap(), 1);

        let promoted = registration.skip_waiting().await.unwrap();
        assert_eq!(promoted.as_deref(), Some("v2"));
        assert_eq!(registration.active().await.unwrap().version(), "v2");
        assert_eq!(v1.state(), LifecycleState::Redundant);
        assert_eq!(v2.state(), LifecycleState::Active);
        assert_eq!(db.stored_partition_names().await.unwrap(), vec!["A".to_string(), "B".to_string()]);

        assert_eq!(registration.skip_waiting().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_skip_waiting_on_engine_channel_supersedes_active() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let registration = Registration::new();
        let fetcher = Arc::new(ScriptedFetcher::new());

        let v1 = CacheEngine::new(&config("v1", &["A", "C"]), db.clone(), fetcher.clone());
        registration.register(v1.clone()).await.unwrap();
        let body = StoredResponse::new(200, None, b"x".to_vec());
        v1.store().put("C", "https://example.com/", &body, None).await.unwrap();

        let v2 = CacheEngine::new(&config("v2", &["A"]), db.clone(), fetcher);
        registration.register(v2.clone()).await.unwrap();

        let reply = v2.control().send(ControlMessage::SkipWaiting).await.unwrap();
        assert_eq!(reply, ControlReply::SkipWaiting { state: LifecycleState::Active });

        assert_eq!(v1.state(), LifecycleState::Redundant);
        assert_eq!(v2.state(), LifecycleState::Active);
        assert_eq!(registration.active().await.unwrap().version(), "v2");
        assert!(registration.waiting().await.is_none());
        assert_eq!(db.stored_partition_names().await.unwrap(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_waiting_on_active_engine_is_noop() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let registration = Registration::new();
        let v1 = CacheEngine::new(&config("v1", &["A"]), db, Arc::new(ScriptedFetcher::new()));
        registration.register(v1.clone()).await.unwrap();

        let reply = v1.control().send(ControlMessage::SkipWaiting).await.unwrap();
        assert_eq!(reply, ControlReply::SkipWaiting { state: LifecycleState::Active });
        assert_eq!(registration.active().await.unwrap().version(), "v1");
    }

    #[tokio::test]
    async fn test_failed_install_keeps_current_engine() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let registration = Registration::new();
        let fetcher = Arc::new(ScriptedFetcher::new());

        let v1 = CacheEngine::new(&config("v1", &["A"]), db.clone(), fetcher.clone());
        registration.register(v1).await.unwrap();

        let mut broken = config("v2", &["A"]);
        broken.precache = vec!["https://example.com/missing.js".into()];
        let v2 = CacheEngine::new(&broken, db, fetcher);
        assert!(registration.register(v2.clone()).await.is_err());

        assert_eq!(v2.state(), LifecycleState::Redundant);
        assert_eq!(registration.active().await.unwrap().version(), "v1");
        assert!(registration.waiting().await.is_none());
    }

    #[tokio::test]
    async fn test_handle_without_active_engine() {
        let registration = Registration::new();
        let result = registration.handle(InterceptedRequest::get("https://example.com/")).await;
        assert!(matches!(result, Err(Error::EngineClosed)));
    }
}
