use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://docs.getgrist.com/api";
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8000";
const DEFAULT_HTTP_PATH: &str = "/mcp";
const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_RESPONSE_BYTES: u64 = 1_000_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_DOWNLOAD_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[value(alias = "streamable-http", alias = "stream-http", alias = "stream_http")]
    #[serde(alias = "streamable-http", alias = "stream-http", alias = "stream_http")]
    Http,
    Stdio,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Stdio => write!(f, "stdio"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_key: String,
    /// Grist REST root, e.g. `https://docs.getgrist.com/api`. Never ends with `/`.
    pub api_url: String,
    pub enabled_tools: Option<HashSet<String>>,
    pub transport: TransportKind,
    pub http_bind_address: SocketAddr,
    pub http_path: String,
    pub tool_timeout_ms: Option<u64>,
    pub max_response_bytes: Option<u64>,
    pub request_timeout_ms: u64,
    pub download_timeout_ms: u64,
    pub upload_timeout_ms: u64,
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            api_key: cli_api_key,
            api_url: cli_api_url,
            api_host: cli_api_host,
            enabled_tools: cli_enabled_tools,
            transport: cli_transport,
            http_bind: cli_http_bind,
            http_path: cli_http_path,
            tool_timeout_ms: cli_tool_timeout_ms,
            max_response_bytes: cli_max_response_bytes,
            request_timeout_ms: cli_request_timeout_ms,
            download_timeout_ms: cli_download_timeout_ms,
            upload_timeout_ms: cli_upload_timeout_ms,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            api_key: file_api_key,
            api_url: file_api_url,
            enabled_tools: file_enabled_tools,
            transport: file_transport,
            http_bind: file_http_bind,
            http_path: file_http_path,
            tool_timeout_ms: file_tool_timeout_ms,
            max_response_bytes: file_max_response_bytes,
            request_timeout_ms: file_request_timeout_ms,
            download_timeout_ms: file_download_timeout_ms,
            upload_timeout_ms: file_upload_timeout_ms,
        } = file_config;

        let api_key = cli_api_key
            .or(file_api_key)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("GRIST_API_KEY is not set (use --api-key or the environment)")
            })?;

        let api_url = normalize_api_url(
            &cli_api_url
                .or(cli_api_host)
                .or(file_api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        );
        anyhow::ensure!(!api_url.is_empty(), "Grist API URL must not be empty");

        let enabled_tools = cli_enabled_tools
            .or(file_enabled_tools)
            .map(|tools| {
                tools
                    .into_iter()
                    .map(|tool| tool.trim().to_ascii_lowercase())
                    .filter(|tool| !tool.is_empty())
                    .collect::<HashSet<_>>()
            })
            .filter(|set| !set.is_empty());

        let transport = cli_transport
            .or(file_transport)
            .unwrap_or(TransportKind::Stdio);

        let http_bind_address = match cli_http_bind.or(file_http_bind) {
            Some(addr) => addr,
            None => DEFAULT_HTTP_BIND
                .parse()
                .context("default bind address invalid")?,
        };

        let http_path = cli_http_path
            .or(file_http_path)
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| DEFAULT_HTTP_PATH.to_string());
        let http_path = if http_path.starts_with('/') {
            http_path
        } else {
            format!("/{http_path}")
        };

        let tool_timeout_ms = cli_tool_timeout_ms
            .or(file_tool_timeout_ms)
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_MS);
        let tool_timeout_ms = if tool_timeout_ms == 0 {
            None
        } else {
            Some(tool_timeout_ms)
        };

        let max_response_bytes = cli_max_response_bytes
            .or(file_max_response_bytes)
            .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES);
        let max_response_bytes = if max_response_bytes == 0 {
            None
        } else {
            Some(max_response_bytes)
        };

        let request_timeout_ms = cli_request_timeout_ms
            .or(file_request_timeout_ms)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
            .max(1);
        let download_timeout_ms = cli_download_timeout_ms
            .or(file_download_timeout_ms)
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_MS)
            .max(1);
        let upload_timeout_ms = cli_upload_timeout_ms
            .or(file_upload_timeout_ms)
            .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_MS)
            .max(1);

        Ok(Self {
            api_key,
            api_url,
            enabled_tools,
            transport,
            http_bind_address,
            http_path,
            tool_timeout_ms,
            max_response_bytes,
            request_timeout_ms,
            download_timeout_ms,
            upload_timeout_ms,
        })
    }

    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        match &self.enabled_tools {
            Some(set) => set.contains(&tool.to_ascii_lowercase()),
            None => true,
        }
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.and_then(|ms| {
            if ms > 0 {
                Some(Duration::from_millis(ms))
            } else {
                None
            }
        })
    }

    pub fn max_response_bytes(&self) -> Option<usize> {
        self.max_response_bytes.and_then(|bytes| {
            if bytes > 0 {
                Some(bytes as usize)
            } else {
                None
            }
        })
    }

    /// Web root used to build document and form links (`api_url` without `/api`).
    pub fn public_base_url(&self) -> String {
        let trimmed = self.api_url.trim_end_matches('/');
        trimmed.strip_suffix("/api").unwrap_or(trimmed).to_string()
    }

    pub fn masked_api_key(&self) -> String {
        mask_api_key(&self.api_key)
    }
}

/// Adds a scheme when missing and drops trailing slashes.
pub fn normalize_api_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

pub fn mask_api_key(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..5].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "[SET]".to_string()
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "grist-mcp", about = "Grist MCP server", version)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "GRIST_API_KEY",
        value_name = "KEY",
        hide_env_values = true,
        help = "Grist API key (required)"
    )]
    pub api_key: Option<String>,

    #[arg(
        long,
        env = "GRIST_API_URL",
        value_name = "URL",
        help = "Grist API base URL (default: https://docs.getgrist.com/api)"
    )]
    pub api_url: Option<String>,

    #[arg(
        long,
        env = "GRIST_API_HOST",
        value_name = "URL",
        hide = true,
        help = "Fallback for --api-url"
    )]
    pub api_host: Option<String>,

    #[arg(
        long,
        env = "GRIST_MCP_ENABLED_TOOLS",
        value_name = "TOOL",
        value_delimiter = ',',
        help = "Restrict execution to the provided tool names"
    )]
    pub enabled_tools: Option<Vec<String>>,

    #[arg(
        long,
        env = "GRIST_MCP_TRANSPORT",
        value_enum,
        value_name = "TRANSPORT",
        help = "Transport to expose (stdio or http)"
    )]
    pub transport: Option<TransportKind>,

    #[arg(
        long,
        env = "GRIST_MCP_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address when using http transport"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "GRIST_MCP_HTTP_PATH",
        value_name = "PATH",
        help = "Route serving the streamable HTTP endpoint (default: /mcp)"
    )]
    pub http_path: Option<String>,

    #[arg(
        long,
        env = "GRIST_MCP_TOOL_TIMEOUT_MS",
        value_name = "MS",
        help = "Tool request timeout in milliseconds (default: 30000; 0 disables)",
        value_parser = clap::value_parser!(u64)
    )]
    pub tool_timeout_ms: Option<u64>,

    #[arg(
        long,
        env = "GRIST_MCP_MAX_RESPONSE_BYTES",
        value_name = "BYTES",
        help = "Max response size in bytes (default: 1000000; 0 disables)",
        value_parser = clap::value_parser!(u64)
    )]
    pub max_response_bytes: Option<u64>,

    #[arg(
        long,
        value_name = "MS",
        help = "Timeout for metadata and record calls (default: 30000)",
        value_parser = clap::value_parser!(u64)
    )]
    pub request_timeout_ms: Option<u64>,

    #[arg(
        long,
        value_name = "MS",
        help = "Timeout for document, CSV and attachment downloads (default: 60000)",
        value_parser = clap::value_parser!(u64)
    )]
    pub download_timeout_ms: Option<u64>,

    #[arg(
        long,
        value_name = "MS",
        help = "Timeout for xlsx exports and attachment uploads (default: 120000)",
        value_parser = clap::value_parser!(u64)
    )]
    pub upload_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    api_key: Option<String>,
    api_url: Option<String>,
    enabled_tools: Option<Vec<String>>,
    transport: Option<TransportKind>,
    http_bind: Option<SocketAddr>,
    http_path: Option<String>,
    tool_timeout_ms: Option<u64>,
    max_response_bytes: Option<u64>,
    request_timeout_ms: Option<u64>,
    download_timeout_ms: Option<u64>,
    upload_timeout_ms: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(
            normalize_api_url("grist.example.com/api/"),
            "https://grist.example.com/api"
        );
        assert_eq!(
            normalize_api_url("http://localhost:8484/api"),
            "http://localhost:8484/api"
        );
    }

    #[test]
    fn masking_keeps_edges_of_long_keys() {
        assert_eq!(mask_api_key("abcdefghijklmnop"), "abcde...lmnop");
        assert_eq!(mask_api_key("short"), "[SET]");
        assert_eq!(mask_api_key("exactly10c"), "[SET]");
    }
}
