//! Error types for `apimcp-openapi-tools`.

use thiserror::Error;

/// Main error type for `OpenAPI` tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (invalid config, missing fields, conflicts).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (spec failed to load, tool discovery failed).
    #[error("Startup error: {0}")]
    Startup(String),

    /// Runtime errors (unknown tool, unsupported method).
    #[error("{0}")]
    Runtime(String),

    /// The API answered a tool call with an error status.
    #[error("{0}")]
    Http(String),

    /// `OpenAPI` errors (spec parsing, `$ref` resolution).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    OpenApiSpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    OpenApiSpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    OpenApiSpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level failures of outbound requests.
    #[error("Request error: {0}")]
    Request(String),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;

/// Render a `reqwest` error without leaking credentials embedded in the URL.
pub(crate) fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    match e.url() {
        Some(url) if !url.username().is_empty() || url.password().is_some() => {
            let mut clean = url.clone();
            let _ = clean.set_username("");
            let _ = clean.set_password(None);
            e.to_string().replace(url.as_str(), clean.as_str())
        }
        _ => e.to_string(),
    }
}
