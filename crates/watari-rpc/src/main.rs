//! Watari RPC Server - JSON-RPC backend for the migration engine.
//!
//! This binary provides a JSON-RPC 2.0 server that wraps the watari-core
//! library for frontends driving a manga library migration.

mod handler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use watari_core::{
    DynStore, EventBus, HttpSource, SourceId, SourceInfo, SourceRegistry, SqliteStore, StoreConfig,
};

#[derive(Parser, Debug)]
#[command(name = "watari-rpc")]
#[command(about = "JSON-RPC server for the Watari migration engine")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Data directory holding the library database (defaults to the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON catalog of HTTP sources to register at startup
    #[arg(long)]
    sources: Option<PathBuf>,
}

/// One entry of the source catalog file.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceEntry {
    id: String,
    name: String,
    #[serde(default)]
    lang: Option<String>,
    base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Watari RPC Server");

    let data_dir = match args.data_dir {
        Some(path) => path,
        None => dirs::data_local_dir()
            .map(|dir| dir.join("watari"))
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    info!("Data directory: {}", data_dir.display());

    let store: DynStore = Arc::new(
        SqliteStore::new(data_dir.join(StoreConfig::DB_FILENAME))
            .context("Failed to open library database")?,
    );

    let registry = Arc::new(SourceRegistry::new());
    if let Some(path) = &args.sources {
        let count = register_sources(&registry, path).await?;
        info!("Registered {} sources from {}", count, path.display());
    }

    // Start the server
    let addr =
        server::start_server(store, registry, EventBus::default(), &args.host, args.port).await?;

    // Print port for the frontend to read (intentional stdout for IPC)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}

/// Load the source catalog file and register one HTTP source per entry.
///
/// Entries with an unusable base URL are skipped with a warning rather than
/// failing startup.
async fn register_sources(registry: &SourceRegistry, path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source catalog {}", path.display()))?;
    let entries: Vec<SourceEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid source catalog {}", path.display()))?;

    let mut registered = 0;
    for entry in entries {
        let info = SourceInfo {
            id: SourceId::new(entry.id),
            name: entry.name,
            lang: entry.lang,
            base_url: Some(entry.base_url),
        };
        match HttpSource::new(info) {
            Ok(source) => {
                registry.register(Arc::new(source)).await;
                registered += 1;
            }
            Err(e) => warn!("Skipping source from catalog: {}", e),
        }
    }
    Ok(registered)
}
