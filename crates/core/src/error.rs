//! Unified error types for intercache.
//!
//! Every variant carries a stable upper-case code prefix in its display string so
//! operational tooling can match on it without parsing prose.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network fetch could not complete (offline, connection refused, DNS failure).
    #[error("NETWORK_UNAVAILABLE: {0}")]
    NetworkUnavailable(String),

    /// Store lookup missed and no network fallback was attempted.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Rule references an unknown partition, or a precache manifest entry was unreachable.
    #[error("CONFIG_ERROR: {0}")]
    Config(String),

    /// Storage estimate unavailable or trimming could not relieve quota pressure.
    #[error("QUOTA_EXCEEDED: {0}")]
    QuotaExceeded(String),

    /// Invalid input parameters (e.g., empty URL, malformed pattern).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// The engine's control channel has shut down.
    #[error("ENGINE_CLOSED")]
    EngineClosed,
}

impl Error {
    /// Whether this error means the network round-trip failed (as opposed to a local fault).
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            Error::NetworkUnavailable(_) | Error::FetchTimeout(_) | Error::FetchTooLarge(_)
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::NetworkUnavailable(msg) => (-32000, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::Config(msg) => (-32003, msg.clone()),
            Error::QuotaExceeded(msg) => (-32004, msg.clone()),
            Error::InvalidUrl(msg) => (-32005, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::EngineClosed => (-32008, "Cache engine is not running".to_string()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::CorruptEntry(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("https://example.com/a.png".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("a.png"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::Config("unknown partition: videos".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32003);
    }

    #[test]
    fn test_network_failure_classification() {
        assert!(Error::NetworkUnavailable("offline".into()).is_network_failure());
        assert!(Error::FetchTimeout("3000ms".into()).is_network_failure());
        assert!(!Error::NotFound("x".into()).is_network_failure());
        assert!(!Error::Config("x".into()).is_network_failure());
    }
}
