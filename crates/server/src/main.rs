//! intercache server entry point.
//!
//! This is the main binary that boots the cache engine and serves its control
//! and status tools over MCP on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use intercache_client::{CacheEngine, FetchClient, FetchConfig};
use intercache_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.version,
        db_path = %config.db_path.display(),
        "Starting intercache server on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let fetcher = Arc::new(FetchClient::new(FetchConfig::from(&config))?);

    let state = tools::ServerState::new(db, fetcher);
    let engine = CacheEngine::new(&config, state.db.clone(), state.fetcher.clone());
    state.registration.register(engine).await?;

    let handler = handler::CacheServer::new(state);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
