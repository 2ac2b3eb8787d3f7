//! Core types and shared functionality for intercache.
//!
//! This crate provides:
//! - Partition store with SQLite backend and eviction
//! - Rule registry for request classification
//! - Hit/miss telemetry
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod rules;
pub mod telemetry;

pub use cache::{CacheDb, CacheEntry, ClearScope, EvictionReport, Partition, PartitionStore, StoredResponse};
pub use config::{AppConfig, ConfigError, PartitionConfig};
pub use error::Error;
pub use rules::{CacheRule, Resolved, RuleRegistry, RuleSpec, Strategy};
pub use telemetry::{Telemetry, TelemetrySnapshot};
