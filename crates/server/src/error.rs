//! Error types for the MCP server.

use apimcp_openapi_tools::OpenApiToolsError;
use thiserror::Error;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration errors (invalid YAML, missing spec, conflicting filters)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failures of the underlying `OpenAPI` tool source
    #[error(transparent)]
    Tools(#[from] OpenApiToolsError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
