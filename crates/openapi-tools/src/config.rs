use crate::error::{OpenApiToolsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where the `OpenAPI` document comes from.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SpecSource {
    /// URL (`http(s)://`, `file://`) or file path.
    Location(String),
    /// An already materialized document (e.g. generated by the application itself).
    Inline(serde_json::Value),
}

impl SpecSource {
    /// A human readable label for logs and error messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            SpecSource::Location(l) => l,
            SpecSource::Inline(_) => "inline",
        }
    }

    #[must_use]
    pub fn is_url(&self) -> bool {
        matches!(self, SpecSource::Location(l) if l.starts_with("http://") || l.starts_with("https://"))
    }
}

/// Controls how much of the response documentation ends up in tool descriptions.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Describe every documented response, not only the first success response.
    #[serde(default)]
    pub describe_all_responses: bool,
    /// Include the full JSON schema of described responses.
    #[serde(default)]
    pub describe_full_response_schema: bool,
}

/// Selects which operations are exposed as tools.
///
/// Operation filters and tag filters combine as a union. Within each pair only one side
/// may be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolFilter {
    #[serde(default)]
    pub include_operations: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_operations: Option<Vec<String>>,
    #[serde(default)]
    pub include_tags: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_tags: Option<Vec<String>>,
}

impl ToolFilter {
    /// Reject conflicting include/exclude pairs.
    ///
    /// # Errors
    ///
    /// Returns a config error if both include and exclude operations (or tags) are given.
    pub fn validate(&self) -> Result<()> {
        if self.include_operations.is_some() && self.exclude_operations.is_some() {
            return Err(OpenApiToolsError::Config(
                "Cannot specify both include_operations and exclude_operations".to_string(),
            ));
        }
        if self.include_tags.is_some() && self.exclude_tags.is_some() {
            return Err(OpenApiToolsError::Config(
                "Cannot specify both include_tags and exclude_tags".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include_operations.is_none()
            && self.exclude_operations.is_none()
            && self.include_tags.is_none()
            && self.exclude_tags.is_none()
    }
}

/// Authentication applied to every outbound API call.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthConfig {
    None,
    Bearer { token: String },
    Header { name: String, value: String },
    Basic { username: String, password: String },
    Query { name: String, value: String },
}

/// Configuration for an OpenAPI-backed tool source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// `OpenAPI` document.
    pub spec: SpecSource,

    /// Base URL for API calls. Falls back to the first `servers` entry of the document.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(flatten)]
    pub convert: ConvertOptions,

    #[serde(flatten)]
    pub filter: ToolFilter,

    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Static headers sent with every call.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-call timeout in seconds (`0` disables it).
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Upper bound for API response bodies.
    #[serde(default)]
    pub max_response_bytes: Option<usize>,
}

impl SourceConfig {
    /// Minimal configuration: a document and an optional base URL.
    #[must_use]
    pub fn new(spec: SpecSource, base_url: Option<String>) -> Self {
        Self {
            spec,
            base_url,
            convert: ConvertOptions::default(),
            filter: ToolFilter::default(),
            auth: None,
            headers: HashMap::new(),
            timeout_secs: None,
            max_response_bytes: None,
        }
    }
}
