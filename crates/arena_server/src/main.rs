//! Arena Server - TCP entry point.

mod cli;

use anyhow::{Context, Result};
use arena_server::{GameServer, ServerConfig};
use clap::Parser;
use cli::Cli;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,arena_server=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        config = config.with_host(host);
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }

    info!(addr = %config.bind_addr(), users = config.users().len(), "Starting arena server");

    let server = Arc::new(GameServer::from_config(config));
    let listener = server.bind().await?;

    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => warn!("Shutdown requested"),
    }

    info!("Server stopped");
    Ok(())
}
