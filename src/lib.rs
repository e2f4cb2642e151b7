pub mod api;
pub mod client;
pub mod config;
pub mod errors;
pub mod formula;
pub mod forms;
pub mod model;
pub mod normalize;
pub mod server;
pub mod state;
pub mod tools;

pub use client::{GristClient, GristError};
pub use config::{CliArgs, ServerConfig, TransportKind};
pub use server::GristServer;

use anyhow::Result;
use std::sync::Arc;

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    tracing::info!(
        api_url = %config.api_url,
        api_key = %config.masked_api_key(),
        transport = %config.transport,
        "starting grist mcp server"
    );
    GristServer::new(config)?.run().await
}
