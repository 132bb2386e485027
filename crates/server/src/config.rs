//! Command line and config file handling for the `apimcp` binary.
//!
//! Every setting can come from a flag, an environment variable or the YAML config file; flags
//! and environment variables win over the file.

use crate::error::{Result, ServerError};
use apimcp_openapi_tools::{AuthConfig, ConvertOptions, SourceConfig, SpecSource, ToolFilter};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_MOUNT_PATH: &str = "/mcp";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "apimcp", version)]
#[command(about = "Serve the operations of an OpenAPI-described web API as MCP tools over HTTP+SSE")]
pub struct Cli {
    /// YAML config file
    #[arg(short, long, env = "APIMCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// OpenAPI document (URL or file path)
    #[arg(short, long, env = "APIMCP_SPEC")]
    pub spec: Option<String>,

    /// Base URL for API calls (defaults to the document's first server)
    #[arg(long, env = "APIMCP_BASE_URL")]
    pub base_url: Option<String>,

    /// Address to listen on [default: 127.0.0.1:8000]
    #[arg(long, env = "APIMCP_BIND")]
    pub bind: Option<SocketAddr>,

    /// Where the MCP endpoint is mounted [default: /mcp]
    #[arg(long, env = "APIMCP_MOUNT_PATH")]
    pub mount_path: Option<String>,

    /// Server name reported to clients (defaults to the document title)
    #[arg(long, env = "APIMCP_NAME")]
    pub name: Option<String>,

    /// Server description (defaults to the document description)
    #[arg(long, env = "APIMCP_DESCRIPTION")]
    pub description: Option<String>,

    /// Only expose these operation ids (comma separated)
    #[arg(long, env = "APIMCP_INCLUDE_OPERATIONS", value_delimiter = ',')]
    pub include_operations: Option<Vec<String>>,

    /// Hide these operation ids (comma separated)
    #[arg(long, env = "APIMCP_EXCLUDE_OPERATIONS", value_delimiter = ',')]
    pub exclude_operations: Option<Vec<String>>,

    /// Only expose operations carrying one of these tags (comma separated)
    #[arg(long, env = "APIMCP_INCLUDE_TAGS", value_delimiter = ',')]
    pub include_tags: Option<Vec<String>>,

    /// Hide operations carrying one of these tags (comma separated)
    #[arg(long, env = "APIMCP_EXCLUDE_TAGS", value_delimiter = ',')]
    pub exclude_tags: Option<Vec<String>>,

    /// Describe every documented response in tool descriptions
    #[arg(long, env = "APIMCP_DESCRIBE_ALL_RESPONSES")]
    pub describe_all_responses: bool,

    /// Include full response schemas in tool descriptions
    #[arg(long, env = "APIMCP_DESCRIBE_FULL_RESPONSE_SCHEMA")]
    pub describe_full_response_schema: bool,

    /// Per-call timeout in seconds, 0 disables it [default: 30]
    #[arg(long, env = "APIMCP_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Timeout for loading the OpenAPI document [default: 30]
    #[arg(long, env = "APIMCP_STARTUP_TIMEOUT_SECS")]
    pub startup_timeout_secs: Option<u64>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "APIMCP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "APIMCP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Contents of the YAML config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub spec: Option<SpecSource>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub bind: Option<SocketAddr>,
    #[serde(default)]
    pub mount_path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub convert: ConvertOptions,
    #[serde(flatten)]
    pub filter: ToolFilter,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub startup_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_response_bytes: Option<usize>,
}

impl AppConfig {
    /// Read a YAML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid config.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

/// Fully resolved settings for one server run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: SourceConfig,
    pub bind: SocketAddr,
    pub mount_path: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub call_timeout: Duration,
    pub startup_timeout: Duration,
}

impl Settings {
    /// Merge the command line over the config file (if any).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable, no document is given, or the filters
    /// conflict.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        Self::merge(cli, file)
    }

    /// Merge the command line over an already loaded config file.
    ///
    /// # Errors
    ///
    /// Returns an error if no document is given or the filters conflict.
    pub fn merge(cli: &Cli, file: AppConfig) -> Result<Self> {
        let spec = cli
            .spec
            .clone()
            .map(SpecSource::Location)
            .or(file.spec)
            .ok_or_else(|| ServerError::Config("an OpenAPI document is required (--spec)".to_string()))?;

        let filter = ToolFilter {
            include_operations: cli.include_operations.clone().or(file.filter.include_operations),
            exclude_operations: cli.exclude_operations.clone().or(file.filter.exclude_operations),
            include_tags: cli.include_tags.clone().or(file.filter.include_tags),
            exclude_tags: cli.exclude_tags.clone().or(file.filter.exclude_tags),
        };
        filter.validate()?;

        let convert = ConvertOptions {
            describe_all_responses: cli.describe_all_responses || file.convert.describe_all_responses,
            describe_full_response_schema: cli.describe_full_response_schema
                || file.convert.describe_full_response_schema,
        };

        let timeout_secs = cli.timeout_secs.or(file.timeout_secs);
        let mut source = SourceConfig::new(spec, cli.base_url.clone().or(file.base_url));
        source.convert = convert;
        source.filter = filter;
        source.auth = file.auth;
        source.headers = file.headers;
        source.timeout_secs = timeout_secs;
        source.max_response_bytes = file.max_response_bytes;

        let bind = match cli.bind.or(file.bind) {
            Some(bind) => bind,
            None => DEFAULT_BIND
                .parse()
                .map_err(|e| ServerError::Config(format!("invalid default bind address: {e}")))?,
        };

        Ok(Self {
            source,
            bind,
            mount_path: cli
                .mount_path
                .clone()
                .or(file.mount_path)
                .unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string()),
            name: cli.name.clone().or(file.name),
            description: cli.description.clone().or(file.description),
            call_timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            startup_timeout: Duration::from_secs(
                cli.startup_timeout_secs
                    .or(file.startup_timeout_secs)
                    .unwrap_or(DEFAULT_STARTUP_TIMEOUT_SECS),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn cli(args: &[&str]) -> Cli {
        let args = std::iter::once("apimcp").chain(args.iter().copied());
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn invalid_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "spec: [unclosed").unwrap();
        assert!(matches!(AppConfig::load(file.path()), Err(ServerError::Yaml(_))));
    }

    #[test]
    fn defaults() {
        let args = cli(&["--spec", "http://api/openapi.json"]);
        let settings = Settings::merge(&args, AppConfig::default()).unwrap();
        assert_eq!(settings.bind.to_string(), DEFAULT_BIND);
        assert_eq!(settings.mount_path, "/mcp");
        assert_eq!(settings.call_timeout, Duration::from_secs(30));
        assert_eq!(settings.startup_timeout, Duration::from_secs(30));
        assert!(settings.source.filter.is_empty());
        assert_eq!(
            settings.source.spec,
            SpecSource::Location("http://api/openapi.json".to_string())
        );
    }

    #[test]
    fn spec_is_required() {
        let err = Settings::merge(&cli(&[]), AppConfig::default()).unwrap_err();
        assert!(err.to_string().contains("OpenAPI document is required"));
    }

    #[test]
    fn comma_separated_filters() {
        let settings = Settings::merge(
            &cli(&[
                "--spec",
                "api.yaml",
                "--include-operations",
                "get_item,list_items",
                "--exclude-tags",
                "write",
            ]),
            AppConfig::default(),
        )
        .unwrap();
        assert_eq!(
            settings.source.filter.include_operations,
            Some(vec!["get_item".to_string(), "list_items".to_string()])
        );
        assert_eq!(settings.source.filter.exclude_tags, Some(vec!["write".to_string()]));
    }

    #[test]
    fn conflicting_filters_are_rejected() {
        let err = Settings::merge(
            &cli(&["--spec", "api.yaml", "--include-tags", "a", "--exclude-tags", "b"]),
            AppConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("include_tags and exclude_tags"));
    }

    #[test]
    fn flags_override_the_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r"
spec: ./openapi.yaml
baseUrl: http://file.example
bind: 0.0.0.0:9000
mountPath: /tools
name: From File
includeTags: [read]
describeAllResponses: true
auth:
  type: bearer
  token: secret
headers:
  x-static: from-file
timeoutSecs: 5
"
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let args = cli(&["--config", path, "--base-url", "http://flag.example", "--name", "Flag"]);
        let settings = Settings::resolve(&args).unwrap();

        assert_eq!(settings.source.base_url.as_deref(), Some("http://flag.example"));
        assert_eq!(settings.name.as_deref(), Some("Flag"));
        assert_eq!(settings.bind.to_string(), "0.0.0.0:9000");
        assert_eq!(settings.mount_path, "/tools");
        assert_eq!(settings.source.filter.include_tags, Some(vec!["read".to_string()]));
        assert!(settings.source.convert.describe_all_responses);
        let token = "secret".to_string();
        assert_eq!(settings.source.auth, Some(AuthConfig::Bearer { token }));
        let header = settings.source.headers.get("x-static");
        assert_eq!(header.map(String::as_str), Some("from-file"));
        assert_eq!(settings.call_timeout, Duration::from_secs(5));
        assert_eq!(settings.source.spec, SpecSource::Location("./openapi.yaml".into()));
    }
}
