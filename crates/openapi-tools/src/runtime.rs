//! `OpenAPI` tool source runtime.
//!
//! Loads an `OpenAPI` document, turns its operations into MCP tools and executes outbound HTTP
//! requests for `tools/call`.

use crate::config::{AuthConfig, SourceConfig, SpecSource};
use crate::convert::{BodyKind, OperationDetails, OperationMap, ParamLocation, convert_openapi_to_tools};
use crate::error::{OpenApiToolsError, Result, sanitize_reqwest_error};
use crate::filter::filter_tools;
use crate::resolver::{DocId, OpenApiResolver, parse_document};
use crate::semantics::method_accepts_body;
use base64::Engine as _;
use mime::Mime;
use openapiv3::OpenAPI;
use parking_lot::RwLock;
use reqwest::Client;
use rmcp::model::{CallToolResult, Content, Tool};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// `OpenAPI` tool source that exposes HTTP API endpoints as MCP tools.
#[derive(Clone)]
pub struct OpenApiToolSource {
    /// Source name (used for logs and error context).
    name: String,
    config: SourceConfig,
    client: Client,
    /// Populated by [`Self::start`].
    loaded: Arc<RwLock<Option<Arc<LoadedSpec>>>>,
    /// Used when the config doesn't set `timeoutSecs`.
    default_timeout: Duration,
    /// Bound for spec loading and tool conversion.
    startup_timeout: Duration,
}

#[derive(Debug)]
struct LoadedSpec {
    title: String,
    description: Option<String>,
    base_url: String,
    tools: Vec<Tool>,
    operations: OperationMap,
}

#[derive(Debug, Default, PartialEq)]
struct RequestParts {
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl OpenApiToolSource {
    /// Create a new `OpenAPI` tool source.
    ///
    /// This constructor does not fetch/parse the spec; call [`Self::start`] (or [`Self::build`])
    /// before using [`Self::list_tools`] / [`Self::call_tool`].
    ///
    /// # Errors
    ///
    /// Returns a config error if the tool filter is contradictory or the HTTP client cannot be
    /// built.
    pub fn new(name: impl Into<String>, config: SourceConfig) -> Result<Self> {
        config.filter.validate()?;
        let client = Client::builder()
            .build()
            .map_err(|e| OpenApiToolsError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            config,
            client,
            loaded: Arc::new(RwLock::new(None)),
            default_timeout: DEFAULT_CALL_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        })
    }

    /// Override the fallback per-call timeout and the startup timeout.
    #[must_use]
    pub fn with_timeouts(mut self, default_timeout: Duration, startup_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self.startup_timeout = startup_timeout;
        self
    }

    /// Create and start a tool source in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or spec loading, parsing or conversion fails.
    pub async fn build(name: impl Into<String>, config: SourceConfig) -> Result<Self> {
        let src = Self::new(name, config)?;
        src.start().await?;
        Ok(src)
    }

    /// Load and parse the `OpenAPI` document.
    async fn load_spec(&self) -> Result<(DocId, Value)> {
        let location = match &self.config.spec {
            SpecSource::Inline(value) => return Ok((DocId::Inline, value.clone())),
            SpecSource::Location(location) => location,
        };

        let doc = DocId::parse(location)?;
        let content = match &doc {
            DocId::Url(url) => {
                tracing::info!(source = %self.name, url = %url, "fetching OpenAPI spec");
                let resp = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| OpenApiToolsError::OpenApiSpecFetch {
                        url: location.clone(),
                        message: sanitize_reqwest_error(&e),
                    })?;
                let bytes = read_response_body_limited_bytes(resp, self.config.max_response_bytes)
                    .await
                    .map_err(|e| OpenApiToolsError::OpenApiSpecFetch {
                        url: location.clone(),
                        message: e.to_string(),
                    })?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            DocId::File(path) => {
                tracing::info!(source = %self.name, path = %path.display(), "loading OpenAPI spec");
                std::fs::read_to_string(path).map_err(|e| OpenApiToolsError::OpenApiSpecReadFile {
                    path: location.clone(),
                    source: e,
                })?
            }
            DocId::Inline => {
                return Err(OpenApiToolsError::Config(format!("Unsupported spec location '{location}'")));
            }
        };

        let value = parse_document(&content).map_err(|e| OpenApiToolsError::OpenApiSpecParse {
            location: location.clone(),
            source: e,
        })?;
        Ok((doc, value))
    }

    /// Load the spec, generate and filter tools, and make the source ready for use.
    ///
    /// # Errors
    ///
    /// Returns an error if spec loading, parsing or tool conversion fails, if no base URL can be
    /// determined, or if all of this takes longer than the startup timeout.
    pub async fn start(&self) -> Result<()> {
        let startup_timeout = self.startup_timeout;

        let startup = async {
            let (doc, raw) = self.load_spec().await?;
            let spec: OpenAPI = serde_json::from_value(raw.clone()).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Invalid OpenAPI document '{}': {e}", self.config.spec.label()))
            })?;

            let base_url = self
                .config
                .base_url
                .clone()
                .or_else(|| spec.servers.first().map(|s| s.url.clone()));
            let Some(base_url) = base_url else {
                return Err(OpenApiToolsError::OpenApi(
                    "No base URL configured and none found in spec".to_string(),
                ));
            };
            let base_url = self.resolve_base_url(&base_url)?;

            let resolver = OpenApiResolver::new(doc, raw, self.client.clone());
            let (tools, operations) = convert_openapi_to_tools(&spec, &resolver, self.config.convert).await?;
            let converted = tools.len();
            let (tools, operations) = filter_tools(tools, operations, &self.config.filter);
            if tools.len() != converted {
                tracing::info!(
                    source = %self.name,
                    kept = tools.len(),
                    converted,
                    "tool filter applied"
                );
            }

            Ok::<_, OpenApiToolsError>(LoadedSpec {
                title: spec.info.title,
                description: spec.info.description,
                base_url,
                tools,
                operations,
            })
        };

        let loaded = match tokio::time::timeout(startup_timeout, startup).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(OpenApiToolsError::Startup(format!(
                    "Startup timeout after {}s for OpenAPI tool source '{}'",
                    startup_timeout.as_secs(),
                    self.name
                )));
            }
        };

        tracing::info!(
            source = %self.name,
            tools = loaded.tools.len(),
            base_url = %loaded.base_url,
            "OpenAPI tool source ready"
        );
        *self.loaded.write() = Some(Arc::new(loaded));
        Ok(())
    }

    fn resolve_base_url(&self, base_url: &str) -> Result<String> {
        if base_url.starts_with("http://") || base_url.starts_with("https://") {
            return Ok(base_url.trim_end_matches('/').to_string());
        }

        // Relative server URLs (e.g. "/api/v3") are resolved against the spec URL.
        match &self.config.spec {
            SpecSource::Location(location) if self.config.spec.is_url() => {
                let mut spec_url = Url::parse(location).map_err(|e| {
                    OpenApiToolsError::OpenApi(format!("Invalid OpenAPI spec URL '{location}': {e}"))
                })?;
                spec_url.set_fragment(None);

                let resolved = spec_url.join(base_url).map_err(|e| {
                    OpenApiToolsError::OpenApi(format!("Invalid baseUrl '{base_url}': {e} (set baseUrl explicitly)"))
                })?;
                Ok(resolved.as_str().trim_end_matches('/').to_string())
            }
            _ => Err(OpenApiToolsError::OpenApi(format!(
                "Invalid baseUrl '{base_url}': must be an absolute http(s) URL (set baseUrl explicitly)",
            ))),
        }
    }

    fn loaded(&self) -> Option<Arc<LoadedSpec>> {
        self.loaded.read().clone()
    }

    /// Source name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// List the MCP `Tool`s exposed by this source (empty before [`Self::start`]).
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.loaded().map(|l| l.tools.clone()).unwrap_or_default()
    }

    /// Tool name -> HTTP operation for every exposed tool.
    #[must_use]
    pub fn operation_map(&self) -> OperationMap {
        self.loaded().map(|l| l.operations.clone()).unwrap_or_default()
    }

    /// The `info.title` of the loaded document.
    #[must_use]
    pub fn spec_title(&self) -> Option<String> {
        self.loaded().map(|l| l.title.clone())
    }

    /// The `info.description` of the loaded document.
    #[must_use]
    pub fn spec_description(&self) -> Option<String> {
        self.loaded().and_then(|l| l.description.clone())
    }

    /// The base URL all calls are sent to.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.loaded().map(|l| l.base_url.clone())
    }

    /// Execute a tool call.
    ///
    /// Arguments are not validated against the input schema; the API decides.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the source was not started or the tool name is unknown
    /// - the outbound HTTP request fails
    /// - the API answers with a status of 400 or above
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let loaded = self
            .loaded()
            .ok_or_else(|| OpenApiToolsError::Runtime(format!("Tool source '{}' is not started", self.name)))?;
        let details = loaded
            .operations
            .get(name)
            .ok_or_else(|| OpenApiToolsError::Runtime(format!("Unknown tool: {name}")))?;

        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(OpenApiToolsError::Runtime(format!(
                    "Arguments for {name} must be an object, got {other}"
                )));
            }
        };

        let parts = build_request_parts(details, arguments);
        let url = self.build_url(&loaded.base_url, &parts)?;
        tracing::debug!(tool = %name, method = %details.method, url = %url, "calling API");

        let mut request = self.client.request(details.method.clone(), url);
        request = self.apply_auth(request);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        for (key, value) in &parts.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &parts.body {
            request = request.json(body);
        }
        request = self.apply_timeout(request);

        let response = request
            .send()
            .await
            .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = read_response_body_limited_bytes(response, self.config.max_response_bytes).await?;

        if status.as_u16() >= 400 {
            return Err(OpenApiToolsError::Http(format!(
                "Error calling {name}. Status code: {}. Response: {}",
                status.as_u16(),
                response_text(&bytes)
            )));
        }

        if let Some(mime_type) = image_mime_type(content_type.as_deref()) {
            let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
            return Ok(CallToolResult::success(vec![Content::image(b64, mime_type)]));
        }

        Ok(CallToolResult::success(vec![Content::text(response_text(&bytes))]))
    }

    fn build_url(&self, base_url: &str, parts: &RequestParts) -> Result<Url> {
        let mut url = Url::parse(&format!("{base_url}{}", parts.path))
            .map_err(|e| OpenApiToolsError::Runtime(format!("Invalid URL: {e}")))?;

        let auth_pair = match &self.config.auth {
            Some(AuthConfig::Query { name, value }) => Some((name, value)),
            _ => None,
        };
        if !parts.query.is_empty() || auth_pair.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &parts.query {
                pairs.append_pair(k, v);
            }
            if let Some((k, v)) = auth_pair {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth {
            Some(AuthConfig::Bearer { token }) => request.bearer_auth(token),
            Some(AuthConfig::Header { name, value }) => request.header(name, value),
            Some(AuthConfig::Basic { username, password }) => request.basic_auth(username, Some(password)),
            // Query auth is applied while building the URL.
            Some(AuthConfig::Query { .. } | AuthConfig::None) | None => request,
        }
    }

    fn apply_timeout(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.timeout_secs {
            Some(0) => request,
            Some(secs) => request.timeout(Duration::from_secs(secs)),
            None => request.timeout(self.default_timeout),
        }
    }
}

/// Split tool arguments into path, query, header and body parts.
///
/// Declared parameters that are absent are left out (a missing path parameter keeps its
/// `{placeholder}`). Whatever remains becomes the JSON body of a POST/PUT/PATCH.
fn build_request_parts(details: &OperationDetails, mut arguments: Map<String, Value>) -> RequestParts {
    let mut parts = RequestParts {
        path: details.path.clone(),
        ..RequestParts::default()
    };

    for param in &details.parameters {
        let Some(value) = arguments.remove(&param.name) else {
            continue;
        };
        match param.location {
            ParamLocation::Path => {
                let placeholder = format!("{{{}}}", param.name);
                let segment = encode_path_segment(&value_to_string(&value));
                parts.path = parts.path.replace(&placeholder, &segment);
            }
            ParamLocation::Query => match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in &items {
                        parts.query.push((param.name.clone(), value_to_string(item)));
                    }
                }
                other => parts.query.push((param.name.clone(), value_to_string(&other))),
            },
            ParamLocation::Header => {
                if !value.is_null() {
                    parts.headers.push((param.name.clone(), value_to_string(&value)));
                }
            }
        }
    }

    if arguments.is_empty() {
        return parts;
    }
    if !method_accepts_body(&details.method) {
        tracing::debug!(
            method = %details.method,
            ignored = arguments.len(),
            "ignoring arguments that match no parameter"
        );
        return parts;
    }
    parts.body = match details.body {
        BodyKind::Wrapped if arguments.len() == 1 && arguments.contains_key("body") => arguments.remove("body"),
        _ => Some(Value::Object(arguments)),
    };
    parts
}

/// Scalars as plain text (`true`, `3`, `abc`); arrays and objects as JSON.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

fn encode_path_segment(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Pretty JSON (2-space indent) when the body parses as JSON, the raw text otherwise.
fn response_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match serde_json::from_str::<Value>(&text) {
        Ok(v) => serde_json::to_string_pretty(&v).unwrap_or_else(|_| text.into_owned()),
        Err(_) => text.into_owned(),
    }
}

/// `type/subtype` of an `image/*` content type, parameters stripped.
fn image_mime_type(content_type: Option<&str>) -> Option<String> {
    let m = content_type?.parse::<Mime>().ok()?;
    (m.type_() == mime::IMAGE).then(|| m.essence_str().to_string())
}

async fn read_response_body_limited_bytes(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> Result<Vec<u8>> {
    let Some(max) = max_bytes else {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?;
        return Ok(bytes.to_vec());
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(OpenApiToolsError::Http(format!("Response too large: {len} bytes (limit {max})")));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?
    {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(OpenApiToolsError::Http(format!("Response too large: exceeded {max} bytes")));
        }
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}
