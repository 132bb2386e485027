#![allow(dead_code)]

use anyhow::Context as _;
use apimcp_openapi_tools::{OpenApiToolSource, SourceConfig, SpecSource};
use apimcp_server::McpServer;
use apimcp_test_support::{TestServer, items};
use futures::StreamExt as _;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use std::time::Duration;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the items API and an MCP server generated from its document.
pub async fn items_server(
    config: impl FnOnce(SourceConfig) -> SourceConfig,
) -> anyhow::Result<(TestServer, McpServer)> {
    let api = TestServer::start(items::router()).await?;
    let base = SourceConfig::new(SpecSource::Location(api.url("/openapi.json")), None);
    let source = OpenApiToolSource::build("items", config(base)).await?;
    Ok((api, McpServer::new(source, None, None)))
}

/// A minimal HTTP+SSE MCP client.
pub struct SseClient {
    http: reqwest::Client,
    base_url: String,
    pub endpoint: String,
    events: BoxStream<'static, Result<sse_stream::Sse, sse_stream::Error>>,
    next_id: u64,
}

impl SseClient {
    /// Open the event stream at `base_url{sse_path}` and wait for the `endpoint` event.
    pub async fn connect(base_url: &str, sse_path: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::new();
        let resp = http
            .get(format!("{base_url}{sse_path}"))
            .header("accept", "text/event-stream")
            .send()
            .await
            .context("open SSE stream")?
            .error_for_status()?;
        anyhow::ensure!(
            resp.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("text/event-stream")),
            "expected an event stream"
        );

        let mut events = sse_stream::SseStream::from_byte_stream(resp.bytes_stream()).boxed();
        let endpoint = loop {
            let evt = tokio::time::timeout(EVENT_TIMEOUT, events.next())
                .await
                .context("timed out waiting for endpoint event")?
                .context("stream ended before endpoint event")?
                .context("read SSE event")?;
            if evt.event.as_deref() == Some("endpoint") {
                break evt.data.unwrap_or_default();
            }
        };

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            endpoint,
            events,
            next_id: 0,
        })
    }

    /// `POST` a raw body to the endpoint announced by the server.
    pub async fn post_raw(&self, body: impl Into<reqwest::Body>) -> anyhow::Result<reqwest::Response> {
        Ok(self
            .http
            .post(format!("{}{}", self.base_url, self.endpoint))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?)
    }

    pub async fn post(&self, message: &Value) -> anyhow::Result<reqwest::Response> {
        self.post_raw(serde_json::to_vec(message)?).await
    }

    /// Next `message` event, parsed as JSON.
    pub async fn next_message(&mut self) -> anyhow::Result<Value> {
        loop {
            let evt = tokio::time::timeout(EVENT_TIMEOUT, self.events.next())
                .await
                .context("timed out waiting for message event")?
                .context("stream ended")?
                .context("read SSE event")?;
            if evt.event.as_deref() != Some("message") {
                continue;
            }
            let data = evt.data.unwrap_or_default();
            return serde_json::from_str(&data).context("parse SSE data as JSON");
        }
    }

    /// Send a request and wait for its reply.
    pub async fn request(&mut self, method: &str, params: Value) -> anyhow::Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let resp = self
            .post(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await?;
        let status = resp.status();
        anyhow::ensure!(status == reqwest::StatusCode::ACCEPTED, "unexpected status {status}");
        let reply = self.next_message().await?;
        anyhow::ensure!(reply["id"] == id, "reply for a different request: {reply}");
        Ok(reply)
    }

    /// Run the `initialize` handshake.
    pub async fn initialize(&mut self) -> anyhow::Result<Value> {
        let reply = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "test-client", "version": "0.1.0"}
                }),
            )
            .await?;
        let resp = self
            .post(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await?;
        let status = resp.status();
        anyhow::ensure!(status == reqwest::StatusCode::ACCEPTED, "unexpected status {status}");
        Ok(reply)
    }

    pub async fn list_tools(&mut self) -> anyhow::Result<Vec<Value>> {
        let reply = self.request("tools/list", json!({})).await?;
        let tools = reply["result"]["tools"].as_array().context("tools array")?.clone();
        Ok(tools)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        let reply = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;
        Ok(reply["result"].clone())
    }
}

/// Sorted tool names of a `tools/list` result.
pub fn tool_names(tools: &[Value]) -> Vec<String> {
    let mut names: Vec<String> = tools
        .iter()
        .filter_map(|t| t["name"].as_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

/// Text of the first content item of a tool result.
pub fn first_text(result: &Value) -> &str {
    result["content"][0]["text"].as_str().unwrap_or_default()
}
