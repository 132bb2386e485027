//! Axum routes for the HTTP+SSE transport.

use crate::mcp::{McpServer, MessageHandler};
use crate::sse::SseTransport;
use axum::body::Bytes;
use axum::extract::{OriginalUri, Query, State};
use axum::http::Uri;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Normalize a user supplied mount path: leading `/`, no trailing `/` (except for the root).
#[must_use]
pub fn normalize_mount_path(mount_path: &str) -> String {
    let trimmed = mount_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Path clients `POST` messages to for a (normalized) mount path.
#[must_use]
pub fn messages_path(mount_path: &str) -> String {
    if mount_path == "/" {
        "/messages/".to_string()
    } else {
        format!("{mount_path}/messages/")
    }
}

impl McpServer {
    /// Routes serving this server at `mount_path`.
    ///
    /// `GET {mount_path}` opens the event stream; `POST {mount_path}/messages/?session_id=...`
    /// carries client messages.
    pub fn router(&self, mount_path: &str) -> Router {
        let mount_path = normalize_mount_path(mount_path);
        let messages_path = messages_path(&mount_path);
        let handler: Arc<dyn MessageHandler> = Arc::new(self.clone());
        let transport = SseTransport::new(messages_path.as_str(), handler);

        tracing::info!(
            server = %self.name(),
            sse = %mount_path,
            messages = %messages_path,
            "MCP server mounted"
        );

        Router::new()
            .route(&mount_path, get(sse_handler))
            .route(&messages_path, post(messages_handler))
            .with_state(transport)
    }

    /// Merge this server's routes into an existing application.
    pub fn mount(&self, app: Router, mount_path: &str) -> Router {
        app.merge(self.router(mount_path))
    }
}

/// The part of the request path added by `Router::nest` above these routes.
fn nest_prefix<'a>(original: &'a str, local: &str) -> &'a str {
    original
        .strip_suffix(local)
        .or_else(|| (local == "/").then_some(original))
        .unwrap_or_default()
        .trim_end_matches('/')
}

async fn sse_handler(
    State(transport): State<SseTransport>,
    OriginalUri(original): OriginalUri,
    uri: Uri,
) -> impl IntoResponse {
    let (session_id, stream) = transport.connect(nest_prefix(original.path(), uri.path()));
    tracing::debug!(session_id = %session_id, "SSE connection established");
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn messages_handler(
    State(transport): State<SseTransport>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    transport
        .handle_post_message(query.get("session_id").map(String::as_str), &body)
        .await
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_paths_are_normalized() {
        assert_eq!(normalize_mount_path("test-mcp"), "/test-mcp");
        assert_eq!(normalize_mount_path("/test-mcp2/"), "/test-mcp2");
        assert_eq!(normalize_mount_path("/mcp"), "/mcp");
        assert_eq!(normalize_mount_path("/nested/path/"), "/nested/path");
        assert_eq!(normalize_mount_path("/"), "/");
        assert_eq!(normalize_mount_path(""), "/");
    }

    #[test]
    fn nest_prefix_is_what_precedes_the_local_path() {
        assert_eq!(nest_prefix("/mcp", "/mcp"), "");
        assert_eq!(nest_prefix("/api/mcp", "/mcp"), "/api");
        assert_eq!(nest_prefix("/a/b/mcp", "/mcp"), "/a/b");
        assert_eq!(nest_prefix("/api/", "/"), "/api");
        assert_eq!(nest_prefix("/api", "/"), "/api");
        assert_eq!(nest_prefix("/", "/"), "");
    }

    #[test]
    fn messages_path_follows_the_mount() {
        assert_eq!(messages_path("/mcp"), "/mcp/messages/");
        assert_eq!(messages_path("/"), "/messages/");
    }
}
