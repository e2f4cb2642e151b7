use crate::client::GristClient;
use crate::config::ServerConfig;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared handles passed to every tool invocation.
pub struct AppState {
    config: Arc<ServerConfig>,
    client: GristClient,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let client = GristClient::new(&config).context("failed to build Grist client")?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    pub fn client(&self) -> &GristClient {
        &self.client
    }
}
