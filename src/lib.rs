pub mod client;
pub mod core;
pub mod providers;
pub mod server;
pub mod store;

use crate::core::config::{ClientConfig, ServiceConfig};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Starts the Rate Service with its fixed configuration.
pub async fn run_server() -> Result<()> {
    info!("Rate service starting...");
    let config = ServiceConfig::default();
    debug!("Service config: {config:#?}");
    server::run(config).await
}

/// Runs the Rate Client once with its fixed configuration.
pub async fn run_client() -> Result<f64> {
    let config = ClientConfig::default();
    debug!("Client config: {config:#?}");
    let http = reqwest::Client::builder()
        .user_agent(crate::core::config::USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;
    client::run(&client::RateClient::new(http, config)).await
}
