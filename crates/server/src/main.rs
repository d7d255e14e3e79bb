//! pulso MCP server entry point.
//!
//! Boots the fetch engine from layered configuration and serves it on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use pulso_core::{AppConfig, Engine};

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    tracing::info!(
        backend = %config.cache_backend,
        cache_dir = %config.cache_dir.display(),
        session = %config.session_id,
        "Starting pulso server on stdio transport"
    );

    let drivers = pulso_client::default_drivers(&config)?;
    let engine = Engine::from_config(config, drivers).await?;

    let handler = handler::PulsoServer::new(Arc::new(engine));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
