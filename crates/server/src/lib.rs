//! Serve the operations of an `OpenAPI`-described web API as MCP tools over HTTP+SSE.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use apimcp_openapi_tools::{OpenApiToolSource, SourceConfig, SpecSource};
//! use apimcp_server::McpServer;
//!
//! let config = SourceConfig::new(SpecSource::Location("http://localhost:8080/openapi.json".into()), None);
//! let source = OpenApiToolSource::build("api", config).await?;
//! let app = McpServer::new(source, None, None).router("/mcp");
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mcp;
pub mod router;
pub mod sse;

pub use error::{Result, ServerError};
pub use mcp::{DEFAULT_SERVER_NAME, McpServer, MessageHandler};
pub use router::{health, normalize_mount_path};
pub use sse::SseTransport;
