//! Cache-related MCP tools.
//!
//! Request handling, rule injection, status, clearing, trimming and telemetry.

pub mod clear;
pub mod fetch;
pub mod rules;
pub mod status;
pub mod telemetry;
pub mod trim;

pub use clear::{CacheClearParams, clear_impl};
pub use fetch::{CacheFetchParams, fetch_impl};
pub use rules::{CacheAddRuleParams, add_rule_impl};
pub use status::status_impl;
pub use telemetry::reset_impl;
pub use trim::{CacheTrimParams, trim_impl};
