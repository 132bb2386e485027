//! `OpenAPI` -> MCP tooling.
//!
//! Converts the operations of an `OpenAPI` 3 document into MCP tools, selects them by operation
//! id or tag, and executes `tools/call` as HTTP requests against the described API.

pub mod config;
pub mod convert;
pub mod error;
pub mod filter;
pub mod resolver;
pub mod runtime;
pub mod schema;
pub mod semantics;

pub use config::{AuthConfig, ConvertOptions, SourceConfig, SpecSource, ToolFilter};
pub use convert::{OperationDetails, OperationMap, ParamLocation, ParameterDetails};
pub use error::{OpenApiToolsError, Result};
pub use runtime::OpenApiToolSource;
