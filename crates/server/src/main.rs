//! datavault-mcp server entry point.
//!
//! Boots the cache service and serves it over MCP stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use datavault_client::InstanceRegistry;
use datavault_core::CacheConfig;
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

    let config = CacheConfig::load()?;
    tracing::info!(base_dir = %config.base_dir.display(), "Starting datavault-mcp server on stdio transport");

    let registry = InstanceRegistry::new();
    let cache = registry.get_or_create(&config).await?;

    let handler = handler::DatavaultServer::new(cache);
    let server = serve_server(handler, stdio()).await?;

    tokio::select! {
        result = server.waiting() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    registry.shutdown_all().await;
    Ok(())
}
