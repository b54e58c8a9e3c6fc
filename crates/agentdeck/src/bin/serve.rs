//! Runs the sync server over a SQLite-backed store.
//!
//! Environment: `AGENTDECK_DB` (database path), `AGENTDECK_ADDR`
//! (listen address, default `127.0.0.1:4860`), `RUST_LOG` (filter).

use std::net::SocketAddr;
use std::sync::Arc;

use agentdeck::config::EngineConfig;
use agentdeck::server::Server;
use agentdeck::storage::SqliteStorage;
use agentdeck::SyncEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = EngineConfig::default();
    if let Ok(path) = std::env::var("AGENTDECK_DB") {
        config.database_path = path.into();
    }
    let addr: SocketAddr = std::env::var("AGENTDECK_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:4860".to_string())
        .parse()?;

    let storage = Arc::new(SqliteStorage::open(&config.database_path)?);
    let engine = Arc::new(SyncEngine::recover(storage, config)?);
    engine.start_vacuum();

    let mut server = Server::start(engine, addr).await?;
    tracing::info!(
        boot_id = %uuid::Uuid::now_v7(),
        addr = %server.addr(),
        "sync server listening"
    );

    tokio::signal::ctrl_c().await?;
    server.shutdown()?;
    Ok(())
}
