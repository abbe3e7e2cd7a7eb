//! Redfish EvtSync plugin binary.

use anyhow::Result;
use evtsync_agent::{Agent, AgentConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Redfish EvtSync plugin"
    );

    // Load configuration
    let config = AgentConfig::from_env()?;

    tracing::info!(
        plugin_id = %config.plugin.id,
        queues = ?config.bus.queues,
        "Configuration loaded"
    );

    Agent::new(config).run().await?;

    Ok(())
}
