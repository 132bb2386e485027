//! MCP request handling on top of an [`OpenApiToolSource`].
//!
//! Only the `tools` capability is served. Requests are dispatched by hand on the `rmcp` model
//! types; the transport (see [`crate::sse`]) only moves JSON-RPC messages around.

use apimcp_openapi_tools::OpenApiToolSource;
use async_trait::async_trait;
use rmcp::model::{
    CallToolResult, ClientJsonRpcMessage, ClientRequest, Content, ErrorCode, ErrorData, Implementation,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, JsonRpcVersion2_0, ListToolsResult, RequestId,
    ServerCapabilities, ServerInfo, ServerJsonRpcMessage, ServerResult,
};
use serde_json::Value;
use std::sync::Arc;

/// Name used when neither the caller nor the `OpenAPI` document provides one.
pub const DEFAULT_SERVER_NAME: &str = "apimcp";

/// Something that answers client JSON-RPC messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// `None` for notifications and client responses.
    async fn handle_message(&self, message: ClientJsonRpcMessage) -> Option<ServerJsonRpcMessage>;
}

/// MCP server exposing the tools of one `OpenAPI` tool source.
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<Inner>,
}

struct Inner {
    source: OpenApiToolSource,
    name: String,
    description: Option<String>,
}

impl McpServer {
    /// Wrap a started tool source.
    ///
    /// `name` defaults to the document title (then [`DEFAULT_SERVER_NAME`]), `description` to the
    /// document description.
    #[must_use]
    pub fn new(source: OpenApiToolSource, name: Option<String>, description: Option<String>) -> Self {
        let name = name
            .or_else(|| source.spec_title())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());
        let description = description.or_else(|| source.spec_description());
        Self {
            inner: Arc::new(Inner {
                source,
                name,
                description,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    #[must_use]
    pub fn source(&self) -> &OpenApiToolSource {
        &self.inner.source
    }

    fn server_info(&self, protocol_version: rmcp::model::ProtocolVersion) -> ServerInfo {
        let mut server_info = Implementation::from_build_env();
        server_info.name.clone_from(&self.inner.name);
        server_info.version = env!("CARGO_PKG_VERSION").to_string();

        let mut info = ServerInfo::default();
        info.protocol_version = protocol_version;
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = server_info;
        info.instructions.clone_from(&self.inner.description);
        info
    }

    async fn call_tool(&self, name: &str, arguments: Option<serde_json::Map<String, Value>>) -> CallToolResult {
        let arguments = arguments.map_or(Value::Null, Value::Object);
        match self.inner.source.call_tool(name, arguments).await {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(tool = %name, error = %e, "tool call failed");
                CallToolResult::error(vec![Content::text(e.to_string())])
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest<ClientRequest>) -> ServerJsonRpcMessage {
        let id = request.id;
        let result = match request.request {
            ClientRequest::InitializeRequest(req) => {
                tracing::info!(
                    client = %req.params.client_info.name,
                    protocol_version = ?req.params.protocol_version,
                    "client initialized"
                );
                ServerResult::InitializeResult(self.server_info(req.params.protocol_version))
            }
            ClientRequest::PingRequest(_) => ServerResult::empty(()),
            ClientRequest::ListToolsRequest(_) => ServerResult::ListToolsResult(ListToolsResult {
                tools: self.inner.source.list_tools(),
                ..Default::default()
            }),
            ClientRequest::CallToolRequest(req) => {
                tracing::debug!(tool = %req.params.name, "tools/call");
                ServerResult::CallToolResult(self.call_tool(&req.params.name, req.params.arguments).await)
            }
            _ => {
                return jsonrpc_error(id, ErrorCode::METHOD_NOT_FOUND, "Method not found".to_string(), None);
            }
        };

        ServerJsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: JsonRpcVersion2_0,
            id,
            result,
        })
    }
}

#[async_trait]
impl MessageHandler for McpServer {
    async fn handle_message(&self, message: ClientJsonRpcMessage) -> Option<ServerJsonRpcMessage> {
        match message {
            ClientJsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            ClientJsonRpcMessage::Notification(notification) => {
                tracing::debug!(notification = ?notification.notification, "client notification");
                None
            }
            _ => None,
        }
    }
}

/// Build a JSON-RPC error message.
#[must_use]
pub fn jsonrpc_error(id: RequestId, code: ErrorCode, message: String, data: Option<Value>) -> ServerJsonRpcMessage {
    ServerJsonRpcMessage::Error(JsonRpcError {
        jsonrpc: JsonRpcVersion2_0,
        id,
        error: ErrorData::new(code, message, data),
    })
}
