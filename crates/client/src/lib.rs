//! Client side of intercache.
//!
//! This crate provides the network fetch capability and the cache engine that
//! sits between a caller and the network: rule resolution, strategy dispatch,
//! the install/activate lifecycle and the quota monitor.

pub mod engine;
pub mod fetch;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{
    CacheEngine, ControlMessage, ControlReply, EngineHandle, EngineResponse, InterceptedRequest, LifecycleState,
    Outcome, PartitionStatus, Registration, ResponseSource, StatusReport, SweepReport,
};
pub use fetch::{FetchClient, FetchConfig, FetchResponse, Fetcher};
pub use reqwest::Method;
