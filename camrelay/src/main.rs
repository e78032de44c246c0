mod server;

use anyhow::Result;
use tracing::info;

use camrelay_core::{bootstrap::load_config, logging};

use server::CamRelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("CamRelay server starting...");
    info!("HTTP address: {}", config.http_address());
    match &config.source.url {
        Some(url) => info!("Default RTSP source: {url}"),
        None => info!("No default RTSP source configured; requests must carry ?url="),
    }

    // 3. Serve until shutdown
    CamRelayServer::new(config).start().await
}
