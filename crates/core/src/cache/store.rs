//! Partition store.
//!
//! Owns the fixed set of partitions declared by configuration and mediates
//! every read and write against the backing database. Writes and trims of one
//! partition are serialized by that partition's lock; no operation ever holds
//! two partition locks at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::connection::CacheDb;
use super::entries::{CacheEntry, StoredResponse};
use crate::Error;
use crate::config::PartitionConfig;
use crate::rules::Strategy;

/// A named, independently bounded cache compartment.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub name: String,
    pub strategy: Strategy,
    pub max_age: Duration,
    /// Entry-count ceiling. 0 = unbounded.
    pub max_entries: usize,
}

impl Partition {
    pub fn is_bounded(&self) -> bool {
        self.max_entries > 0
    }
}

impl From<&PartitionConfig> for Partition {
    fn from(config: &PartitionConfig) -> Self {
        Self {
            name: config.name.clone(),
            strategy: config.strategy,
            max_age: Duration::from_secs(config.max_age_secs),
            max_entries: config.max_entries,
        }
    }
}

struct Slot {
    partition: Partition,
    lock: Mutex<()>,
}

/// Shared handle to the configured partitions and their backing store.
///
/// Cheap to clone; clones share partitions, locks and the database connection.
#[derive(Clone)]
pub struct PartitionStore {
    db: CacheDb,
    slots: Arc<HashMap<String, Slot>>,
    order: Arc<Vec<String>>,
}

impl std::fmt::Debug for PartitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionStore").field("partitions", &self.order).finish()
    }
}

impl PartitionStore {
    /// Build the store from the partition configuration table.
    ///
    /// Duplicate names keep the first row.
    pub fn new(db: CacheDb, partitions: &[PartitionConfig]) -> Self {
        let mut slots = HashMap::new();
        let mut order = Vec::new();
        for config in partitions {
            if slots.contains_key(&config.name) {
                tracing::warn!(partition = %config.name, "duplicate partition in configuration, keeping the first");
                continue;
            }
            order.push(config.name.clone());
            slots.insert(config.name.clone(), Slot { partition: Partition::from(config), lock: Mutex::new(()) });
        }
        Self { db, slots: Arc::new(slots), order: Arc::new(order) }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.slots.get(name).map(|slot| &slot.partition)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Configured partitions in declaration order.
    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.order.iter().filter_map(|name| self.partition(name))
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub(crate) fn slot(&self, name: &str) -> Result<(&Partition, &Mutex<()>), Error> {
        self.slots
            .get(name)
            .map(|slot| (&slot.partition, &slot.lock))
            .ok_or_else(|| Error::Config(format!("unknown partition: {name}")))
    }

    /// Record every configured partition in the backing store's catalog.
    pub async fn register_all(&self, version: &str) -> Result<(), Error> {
        for name in self.order.iter() {
            self.db.register_partition(name, version).await?;
        }
        Ok(())
    }

    /// Look up `url` in `partition`, ignoring max-age.
    pub async fn get(&self, partition: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        self.slot(partition)?;
        self.db.get_entry(partition, url).await
    }

    /// Write `response` for `url` into `partition`, then trim the partition if
    /// the write pushed it past its bound.
    pub async fn put(
        &self, partition: &str, url: &str, response: &StoredResponse, max_age_override: Option<Duration>,
    ) -> Result<(), Error> {
        let (config, lock) = self.slot(partition)?;
        let _guard = lock.lock().await;

        self.db
            .put_entry(partition, url, response, max_age_override.map(|d| d.as_secs()))
            .await?;

        if config.is_bounded() {
            let evicted = self.db.trim_entries(partition, config.max_entries).await?;
            if evicted > 0 {
                tracing::debug!(partition, evicted, "trimmed partition after write");
            }
        }
        Ok(())
    }

    /// Replace the precached set of `partition` with `entries`.
    ///
    /// Entries from an earlier manifest lose their pin and become ordinary FIFO
    /// entries. Fails with `Error::Config` when a bounded partition cannot hold
    /// the whole manifest.
    pub async fn put_precached(&self, partition: &str, entries: &[(String, StoredResponse)]) -> Result<(), Error> {
        let (config, lock) = self.slot(partition)?;
        if config.is_bounded() && entries.len() > config.max_entries {
            return Err(Error::Config(format!(
                "precache manifest has {} entries but partition {partition} holds at most {}",
                entries.len(),
                config.max_entries
            )));
        }
        let _guard = lock.lock().await;

        let unpinned = self.db.unpin_entries(partition).await?;
        for (url, response) in entries {
            self.db.put_pinned_entry(partition, url, response).await?;
        }
        if config.is_bounded() {
            let evicted = self.db.trim_entries(partition, config.max_entries).await?;
            tracing::debug!(partition, pinned = entries.len(), unpinned, evicted, "stored precache");
        }
        Ok(())
    }

    /// URLs of the precached entries of `partition`.
    pub async fn pinned_urls(&self, partition: &str) -> Result<Vec<String>, Error> {
        self.slot(partition)?;
        self.db.list_pinned_urls(partition).await
    }

    /// Remove the entry for `url` from `partition`.
    pub async fn delete(&self, partition: &str, url: &str) -> Result<bool, Error> {
        let (_, lock) = self.slot(partition)?;
        let _guard = lock.lock().await;
        self.db.delete_entry(partition, url).await
    }

    pub async fn entry_count(&self, partition: &str) -> Result<u64, Error> {
        self.slot(partition)?;
        self.db.count_entries(partition).await
    }

    /// URLs held by `partition`, oldest first.
    pub async fn urls(&self, partition: &str) -> Result<Vec<String>, Error> {
        self.slot(partition)?;
        self.db.list_entry_urls(partition).await
    }

    /// Entry counts of every configured partition, in declaration order.
    pub async fn entry_counts(&self) -> Result<Vec<(String, u64)>, Error> {
        let mut counts = Vec::with_capacity(self.order.len());
        for name in self.order.iter() {
            counts.push((name.clone(), self.db.count_entries(name).await?));
        }
        Ok(counts)
    }

    pub async fn usage_bytes(&self) -> Result<u64, Error> {
        self.db.storage_usage().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partitions() -> Vec<PartitionConfig> {
        vec![
            PartitionConfig::new("static", Strategy::CacheFirst, 3600, 3),
            PartitionConfig::new("api", Strategy::NetworkFirst, 60, 0),
        ]
    }

    fn body(text: &str) -> StoredResponse {
        StoredResponse::new(200, Some("text/plain".into()), text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_unknown_partition_is_config_error() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        let result = store.get("videos", "https://example.com/a.mp4").await;
        assert!(matches!(result, Err(Error::Config(_))));

        let result = store.put("videos", "https://example.com/a.mp4", &body("x"), None).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_put_trims_bounded_partition() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        for i in 0..5 {
            store
                .put("static", &format!("https://example.com/{i}.css"), &body("x"), None)
                .await
                .unwrap();
        }
        assert_eq!(store.entry_count("static").await.unwrap(), 3);
        assert!(store.get("static", "https://example.com/0.css").await.unwrap().is_none());
        assert!(store.get("static", "https://example.com/4.css").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_precached_entries_outlive_runtime_writes() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        let manifest = vec![
            ("https://example.com/offline.html".to_string(), body("offline")),
            ("https://example.com/app.js".to_string(), body("app")),
        ];
        store.put_precached("static", &manifest).await.unwrap();

        for i in 0..5 {
            store
                .put("static", &format!("https://example.com/{i}.css"), &body("x"), None)
                .await
                .unwrap();
        }
        assert_eq!(store.entry_count("static").await.unwrap(), 3);
        assert!(store.get("static", "https://example.com/offline.html").await.unwrap().is_some());
        assert!(store.get("static", "https://example.com/app.js").await.unwrap().is_some());
        assert!(store.get("static", "https://example.com/4.css").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_precache_replaces_previous_pins() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        store
            .put_precached("static", &[("https://example.com/v1.js".to_string(), body("1"))])
            .await
            .unwrap();
        store
            .put_precached("static", &[("https://example.com/v2.js".to_string(), body("2"))])
            .await
            .unwrap();

        assert_eq!(store.pinned_urls("static").await.unwrap(), vec!["https://example.com/v2.js".to_string()]);
        assert_eq!(store.entry_count("static").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_precache_larger_than_bound_is_rejected() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        let manifest: Vec<(String, StoredResponse)> =
            (0..4).map(|i| (format!("https://example.com/{i}.js"), body("x"))).collect();

        let result = store.put_precached("static", &manifest).await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(store.entry_count("static").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_partition_keeps_everything() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        for i in 0..10 {
            store
                .put("api", &format!("https://example.com/api/{i}"), &body("x"), None)
                .await
                .unwrap();
        }
        assert_eq!(store.entry_count("api").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_max_age_override_persisted() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        store
            .put("api", "https://example.com/api/me", &body("me"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        let entry = store.get("api", "https://example.com/api/me").await.unwrap().unwrap();
        assert_eq!(entry.max_age_secs, Some(5));
    }

    #[tokio::test]
    async fn test_entry_counts_in_declaration_order() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        store.put("api", "https://example.com/api/1", &body("x"), None).await.unwrap();

        let counts = store.entry_counts().await.unwrap();
        assert_eq!(counts, vec![("static".to_string(), 0), ("api".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_partition() {
        let store = PartitionStore::new(CacheDb::open_in_memory().await.unwrap(), &partitions());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put("static", &format!("https://example.com/{i}.js"), &body("x"), None)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.entry_count("static").await.unwrap(), 3);
    }
}
