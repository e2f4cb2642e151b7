use anyhow::Result;
use clap::Parser;
use grist_mcp::config::{CliArgs, DEFAULT_API_URL, ServerConfig, TransportKind};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

const ENV_KEYS: [&str; 9] = [
    "GRIST_API_KEY",
    "GRIST_API_URL",
    "GRIST_API_HOST",
    "GRIST_MCP_ENABLED_TOOLS",
    "GRIST_MCP_TRANSPORT",
    "GRIST_MCP_HTTP_BIND",
    "GRIST_MCP_HTTP_PATH",
    "GRIST_MCP_TOOL_TIMEOUT_MS",
    "GRIST_MCP_MAX_RESPONSE_BYTES",
];

fn clear_env() {
    for key in ENV_KEYS {
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::remove_var(key) };
    }
}

fn parse(args: &[&str]) -> Result<ServerConfig> {
    let mut argv = vec!["grist-mcp"];
    argv.extend_from_slice(args);
    ServerConfig::from_args(CliArgs::try_parse_from(argv)?)
}

#[test]
#[serial]
fn missing_api_key_is_fatal() {
    clear_env();
    let err = parse(&[]).unwrap_err();
    assert!(err.to_string().contains("GRIST_API_KEY"));
}

#[test]
#[serial]
fn defaults_apply_when_only_the_key_is_given() -> Result<()> {
    clear_env();
    let config = parse(&["--api-key", "abc"])?;
    assert_eq!(config.api_url, DEFAULT_API_URL);
    assert_eq!(config.transport, TransportKind::Stdio);
    assert_eq!(config.http_path, "/mcp");
    assert_eq!(config.http_bind_address.to_string(), "127.0.0.1:8000");
    assert_eq!(config.tool_timeout(), Some(Duration::from_millis(30_000)));
    assert_eq!(config.max_response_bytes(), Some(1_000_000));
    assert_eq!(config.public_base_url(), "https://docs.getgrist.com");
    Ok(())
}

#[test]
#[serial]
fn environment_supplies_key_and_host_fallback() -> Result<()> {
    clear_env();
    // SAFETY: tests touching the environment are serialized.
    unsafe {
        std::env::set_var("GRIST_API_KEY", "from-env");
        std::env::set_var("GRIST_API_HOST", "grist.example.org/api/");
    }
    let config = parse(&[]);
    clear_env();

    let config = config?;
    assert_eq!(config.api_key, "from-env");
    assert_eq!(config.api_url, "https://grist.example.org/api");
    assert_eq!(config.public_base_url(), "https://grist.example.org");
    Ok(())
}

#[test]
#[serial]
fn zero_disables_timeout_and_size_limit() -> Result<()> {
    clear_env();
    let config = parse(&[
        "--api-key",
        "abc",
        "--tool-timeout-ms",
        "0",
        "--max-response-bytes",
        "0",
    ])?;
    assert_eq!(config.tool_timeout(), None);
    assert_eq!(config.max_response_bytes(), None);
    Ok(())
}

#[test]
#[serial]
fn enabled_tools_match_case_insensitively() -> Result<()> {
    clear_env();
    let config = parse(&["--api-key", "abc", "--enabled-tools", "List_Tables, add_grist_records"])?;
    assert!(config.is_tool_enabled("list_tables"));
    assert!(config.is_tool_enabled("ADD_GRIST_RECORDS"));
    assert!(!config.is_tool_enabled("delete_document"));
    Ok(())
}

#[test]
#[serial]
fn http_transport_accepts_streamable_alias() -> Result<()> {
    clear_env();
    let config = parse(&[
        "--api-key",
        "abc",
        "--transport",
        "streamable-http",
        "--http-path",
        "grist",
    ])?;
    assert_eq!(config.transport, TransportKind::Http);
    assert_eq!(config.http_path, "/grist");
    Ok(())
}

#[test]
#[serial]
fn file_values_sit_under_cli_values() -> Result<()> {
    clear_env();
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
    writeln!(
        file,
        "api_key: file-key\napi_url: http://localhost:8484/api\ntool_timeout_ms: 1234\nenabled_tools:\n  - list_records"
    )?;
    let path = file.path().to_str().expect("utf-8 path").to_string();

    let config = parse(&["--config", &path, "--tool-timeout-ms", "99"])?;
    assert_eq!(config.api_key, "file-key");
    assert_eq!(config.api_url, "http://localhost:8484/api");
    assert_eq!(config.tool_timeout_ms, Some(99));
    assert!(config.is_tool_enabled("list_records"));
    assert!(!config.is_tool_enabled("list_tables"));
    Ok(())
}

#[test]
#[serial]
fn json_config_files_are_accepted() -> Result<()> {
    clear_env();
    let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
    write!(file, r#"{{"api_key": "json-key", "transport": "http"}}"#)?;
    let path = file.path().to_str().expect("utf-8 path").to_string();

    let config = parse(&["--config", &path])?;
    assert_eq!(config.api_key, "json-key");
    assert_eq!(config.transport, TransportKind::Http);
    Ok(())
}

#[test]
fn masked_key_hides_the_middle() -> Result<()> {
    let config = ServerConfig::from_args(CliArgs {
        api_key: Some("abcdefghijklmnopqrstuvwxyz".into()),
        ..CliArgs::default()
    })?;
    assert_eq!(config.masked_api_key(), "abcde...vwxyz");
    Ok(())
}
