//! SQLite-backed partition store.
//!
//! This module provides the persistent cache behind the engine using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named partitions with independent entry-count and max-age bounds
//! - Entries keyed by SHA-256 of `(partition, normalized URL)`
//! - FIFO trimming, expiry sweeps, clearing and stale-partition deletion
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod catalog;
pub mod connection;
pub mod entries;
pub mod eviction;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, StoredResponse};
pub use eviction::{ClearScope, EvictionReport};
pub use store::{Partition, PartitionStore};
