#![allow(dead_code)]

use grist_mcp::config::{ServerConfig, TransportKind};
use grist_mcp::server::GristServer;
use grist_mcp::state::AppState;
use std::sync::Arc;
use wiremock::MockServer;

pub const TEST_API_KEY: &str = "test-key-0123456789";

/// A mock Grist API plus the config pointing at it.
pub struct MockGrist {
    server: MockServer,
}

impl MockGrist {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    pub fn api_url(&self) -> String {
        format!("{}/api", self.server.uri())
    }

    pub fn config(&self) -> ServerConfig {
        self.config_with(|_| {})
    }

    pub fn config_with<F>(&self, configure: F) -> ServerConfig
    where
        F: FnOnce(&mut ServerConfig),
    {
        let mut config = ServerConfig {
            api_key: TEST_API_KEY.to_string(),
            api_url: self.api_url(),
            enabled_tools: None,
            transport: TransportKind::Stdio,
            http_bind_address: "127.0.0.1:0".parse().expect("bind address"),
            http_path: "/mcp".to_string(),
            tool_timeout_ms: Some(5_000),
            max_response_bytes: Some(1_000_000),
            request_timeout_ms: 5_000,
            download_timeout_ms: 5_000,
            upload_timeout_ms: 5_000,
        };
        configure(&mut config);
        config
    }

    pub fn state(&self) -> Arc<AppState> {
        app_state_with_config(self.config())
    }

    pub fn grist_server(&self) -> GristServer {
        GristServer::from_state(self.state())
    }

    pub async fn received_bodies(&self) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null))
            .collect()
    }
}

pub fn app_state_with_config(config: ServerConfig) -> Arc<AppState> {
    Arc::new(AppState::new(Arc::new(config)).expect("app state"))
}
