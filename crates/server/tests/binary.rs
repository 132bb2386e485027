mod common;

use anyhow::Context as _;
use apimcp_test_support::{KillOnDrop, TestServer, items, pick_unused_port, wait_http_ok};
use common::{SseClient, first_text, tool_names};
use serde_json::json;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

fn spawn_apimcp(args: &[&str], port: u16) -> anyhow::Result<std::process::Child> {
    Command::new(env!("CARGO_BIN_EXE_apimcp"))
        .args(args)
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .context("spawn apimcp")
}

#[tokio::test]
async fn serves_tools_from_a_spec_url() -> anyhow::Result<()> {
    let api = TestServer::start(items::router()).await?;
    let port = pick_unused_port()?;
    let _child = KillOnDrop(spawn_apimcp(
        &["--spec", &api.url("/openapi.json"), "--exclude-tags", "write,media"],
        port,
    )?);

    let base_url = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base_url}/health"), Duration::from_secs(20)).await?;

    let mut client = SseClient::connect(&base_url, "/mcp").await?;
    let init = client.initialize().await?;
    assert_eq!(init["result"]["serverInfo"]["name"], "Test Items API");

    let tools = client.list_tools().await?;
    assert_eq!(
        tool_names(&tools),
        ["get_item", "inspect_request", "list_items", "raise_error"]
    );

    let result = client.call_tool("get_item", json!({"item_id": 3})).await?;
    assert!(first_text(&result).contains("Item 3"));
    Ok(())
}

#[tokio::test]
async fn reads_a_yaml_config_file() -> anyhow::Result<()> {
    let api = TestServer::start(items::router()).await?;
    let dir = tempfile::tempdir()?;

    let spec_path = dir.path().join("openapi.yaml");
    std::fs::write(&spec_path, serde_yaml::to_string(&items::openapi("/"))?)?;

    let config_path = dir.path().join("apimcp.yaml");
    let config = json!({
        "spec": spec_path,
        "baseUrl": api.base_url(),
        "mountPath": "tools/",
        "name": "Items From Config",
        "includeOperations": ["get_item"],
    });
    std::fs::write(&config_path, serde_yaml::to_string(&config)?)?;

    let port = pick_unused_port()?;
    let _child = KillOnDrop(spawn_apimcp(&["--config", path_str(&config_path)?], port)?);

    let base_url = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base_url}/health"), Duration::from_secs(20)).await?;

    let mut client = SseClient::connect(&base_url, "/tools").await?;
    let init = client.initialize().await?;
    assert_eq!(init["result"]["serverInfo"]["name"], "Items From Config");
    assert_eq!(tool_names(&client.list_tools().await?), ["get_item"]);

    let result = client.call_tool("get_item", json!({"item_id": 1})).await?;
    assert_eq!(result["isError"], false);
    Ok(())
}

#[tokio::test]
async fn exits_with_an_error_without_a_spec() -> anyhow::Result<()> {
    let status = Command::new(env!("CARGO_BIN_EXE_apimcp"))
        .env_remove("APIMCP_SPEC")
        .env_remove("APIMCP_CONFIG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    assert!(!status.success());
    Ok(())
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str().context("non UTF-8 temp path")
}
