//! HTTP+SSE transport.
//!
//! A client opens an event stream (`GET`), receives an `endpoint` event naming the URL to `POST`
//! its JSON-RPC messages to, and gets every reply as a `message` event on the same stream.

use crate::mcp::{MessageHandler, jsonrpc_error};
use axum::Json;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::{IntoResponse as _, Response};
use futures::stream::{self, Stream, StreamExt as _};
use parking_lot::RwLock;
use rmcp::model::{ClientJsonRpcMessage, ErrorCode, RequestId, ServerJsonRpcMessage};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Pending server messages per session before senders wait.
const SESSION_BUFFER: usize = 64;

type Sessions = Arc<RwLock<HashMap<Uuid, mpsc::Sender<ServerJsonRpcMessage>>>>;

/// Session registry plus the plumbing between `POST`ed messages and event streams.
#[derive(Clone)]
pub struct SseTransport {
    messages_endpoint: Arc<str>,
    sessions: Sessions,
    handler: Arc<dyn MessageHandler>,
}

/// Removes its session from the registry when the event stream is dropped.
struct SessionGuard {
    id: Uuid,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.write().remove(&self.id);
        tracing::debug!(session_id = %self.id, "SSE session closed");
    }
}

impl SseTransport {
    /// `messages_endpoint` is the path clients `POST` to; the session id is appended as query.
    #[must_use]
    pub fn new(messages_endpoint: impl Into<Arc<str>>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            messages_endpoint: messages_endpoint.into(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            handler,
        }
    }

    #[must_use]
    pub fn messages_endpoint(&self) -> &str {
        &self.messages_endpoint
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Register a new session and return its event stream.
    ///
    /// The first event is `endpoint`; every server message follows as a `message` event. `prefix`
    /// is prepended to the advertised endpoint (the path the routes are nested under, if any).
    pub fn connect(&self, prefix: &str) -> (Uuid, impl Stream<Item = Result<Event, Infallible>> + Send + use<>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.sessions.write().insert(id, tx);
        tracing::debug!(session_id = %id, "SSE session opened");

        let endpoint = format!("{prefix}{}?session_id={}", self.messages_endpoint, id.simple());
        let first = stream::once(async move { Ok(Event::default().event("endpoint").data(endpoint)) });

        let guard = SessionGuard {
            id,
            sessions: Arc::clone(&self.sessions),
        };
        let messages = stream::unfold((rx, guard), |(mut rx, guard)| async move {
            let message = rx.recv().await?;
            let event = match serde_json::to_string(&message) {
                Ok(data) => Event::default().event("message").data(data),
                Err(e) => {
                    tracing::warn!(session_id = %guard.id, error = %e, "failed to serialize server message");
                    Event::default().comment("serialization error")
                }
            };
            Some((Ok(event), (rx, guard)))
        });

        (id, first.chain(messages))
    }

    /// Accept a client message for a session.
    ///
    /// Replies go to the session's event stream; the HTTP response only acknowledges receipt.
    pub async fn handle_post_message(&self, session_id: Option<&str>, body: &[u8]) -> Response {
        let Some(session_id) = session_id else {
            tracing::warn!("message received without session_id");
            return (StatusCode::BAD_REQUEST, "session_id is required").into_response();
        };
        let Ok(id) = Uuid::parse_str(session_id) else {
            tracing::warn!(session_id = %session_id, "received invalid session ID");
            return (StatusCode::BAD_REQUEST, "Invalid session ID").into_response();
        };
        let Some(sender) = self.sessions.read().get(&id).cloned() else {
            tracing::warn!(session_id = %id, "could not find session");
            return (StatusCode::NOT_FOUND, "Could not find session").into_response();
        };

        let message: ClientJsonRpcMessage = match serde_json::from_slice(body) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "failed to parse client message");
                let error = jsonrpc_error(
                    RequestId::String("unknown".into()),
                    ErrorCode::PARSE_ERROR,
                    "Parse error".to_string(),
                    Some(json!({"validation_error": e.to_string()})),
                );
                tokio::spawn(async move {
                    if sender.send(error).await.is_err() {
                        tracing::debug!(session_id = %id, "session closed before parse error was delivered");
                    }
                });
                let body = Json(json!({"error": "Could not parse message"}));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
        };

        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            if let Some(reply) = handler.handle_message(message).await
                && sender.send(reply).await.is_err()
            {
                tracing::debug!(session_id = %id, "session closed before reply was delivered");
            }
        });

        (StatusCode::ACCEPTED, Json(json!({"message": "Accepted"}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::response::IntoResponse as _;
    use axum::response::sse::Sse;
    use futures::StreamExt as _;
    use rmcp::model::{JsonRpcResponse, JsonRpcVersion2_0, ServerResult};

    struct Pong;

    #[async_trait]
    impl MessageHandler for Pong {
        async fn handle_message(&self, message: ClientJsonRpcMessage) -> Option<ServerJsonRpcMessage> {
            match message {
                ClientJsonRpcMessage::Request(req) => Some(ServerJsonRpcMessage::Response(JsonRpcResponse {
                    jsonrpc: JsonRpcVersion2_0,
                    id: req.id,
                    result: ServerResult::empty(()),
                })),
                _ => None,
            }
        }
    }

    fn transport() -> SseTransport {
        SseTransport::new("/mcp/messages/", Arc::new(Pong))
    }

    async fn body_text(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_invalid_and_unknown_sessions() {
        let t = transport();

        let resp = t.handle_post_message(None, b"{}").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(resp).await, "session_id is required");

        let resp = t.handle_post_message(Some("not-a-uuid"), b"{}").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(resp).await, "Invalid session ID");

        let unknown = Uuid::new_v4().simple().to_string();
        let resp = t.handle_post_message(Some(&unknown), b"{}").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(resp).await, "Could not find session");
    }

    #[tokio::test]
    async fn accepts_messages_and_forwards_replies_to_the_session() {
        let t = transport();
        let (id, stream) = t.connect("");
        let mut stream = Box::pin(stream);
        assert_eq!(t.session_count(), 1);

        // endpoint event
        assert!(stream.next().await.is_some());

        let resp = t
            .handle_post_message(
                Some(&id.simple().to_string()),
                br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#,
            )
            .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_text(resp).await, r#"{"message":"Accepted"}"#);

        // The reply arrives on the stream as a `message` event.
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn unparseable_messages_are_rejected_and_reported_on_the_stream() {
        let t = transport();
        let (id, stream) = t.connect("");
        let mut stream = Box::pin(stream);
        let _endpoint = stream.next().await;

        let resp = t.handle_post_message(Some(&id.to_string()), b"not json").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(resp).await, r#"{"error":"Could not parse message"}"#);
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn stream_outlives_the_transport_handle() {
        let t = transport();
        let (_, stream) = t.clone().connect("");
        let mut stream = Box::pin(stream);
        drop(t);
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn endpoint_carries_the_prefix() {
        let t = transport();
        let (id, stream) = t.connect("/api");
        let body = Sse::new(stream).into_response().into_body();
        let first = body.into_data_stream().next().await.unwrap().unwrap();
        let first = String::from_utf8(first.to_vec()).unwrap();
        assert!(first.starts_with("event: endpoint\n"), "{first}");
        let data = format!("data: /api/mcp/messages/?session_id={}\n", id.simple());
        assert!(first.contains(&data), "{first}");
    }

    #[tokio::test]
    async fn parse_errors_do_not_wait_for_an_undrained_stream() {
        let t = transport();
        let (id, _stream) = t.connect("");
        let session = id.simple().to_string();

        for _ in 0..(SESSION_BUFFER * 2) {
            let resp = tokio::time::timeout(
                std::time::Duration::from_secs(2),
                t.handle_post_message(Some(&session), b"garbage"),
            )
            .await
            .expect("POST answered without waiting for the stream");
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_closes_the_session() {
        let t = transport();
        let (id, stream) = t.connect("");
        assert_eq!(t.session_count(), 1);
        drop(stream);
        assert_eq!(t.session_count(), 0);

        let resp = t.handle_post_message(Some(&id.simple().to_string()), b"{}").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
