//! Stdio MCP server: `temple-bridge serve`.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use temple_bridge::config::BridgeConfig;
use temple_bridge::mcp::McpServer;
use temple_bridge::tools::UnavailableEngine;

pub async fn cmd_serve(config: &BridgeConfig) -> Result<()> {
    config.verify()?;

    info!("BTB repository: {}", config.basics_path.display());
    info!("Threshold repository: {}", config.threshold_path.display());

    // No derive engine ships with this build; the derive tools report it as unavailable
    let server = McpServer::new(config, Arc::new(UnavailableEngine));
    info!("Registered tools: {}", server.tools().names().join(", "));

    server.run_stdio().await
}
