//! `OpenAPI` operations -> MCP tools.

use crate::config::ConvertOptions;
use crate::error::Result;
use crate::resolver::{DocId, OpenApiResolver};
use crate::schema::{clean_schema, example_from_schema, title_case};
use crate::semantics::{TOOL_METHODS, annotations_for_method};
use openapiv3::{
    MediaType, OpenAPI, Operation, Parameter, ParameterSchemaOrContent, PathItem, ReferenceOr, Responses, StatusCode,
};
use reqwest::Method;
use rmcp::model::{JsonObject, Tool};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

/// Where a tool argument goes in the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

impl ParamLocation {
    fn from_parameter(p: &Parameter) -> Option<Self> {
        match p {
            Parameter::Path { .. } => Some(Self::Path),
            Parameter::Query { .. } => Some(Self::Query),
            Parameter::Header { .. } => Some(Self::Header),
            Parameter::Cookie { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDetails {
    pub name: String,
    pub location: ParamLocation,
}

/// How the JSON request body is assembled from tool arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    #[default]
    None,
    /// Object body: every leftover argument is a body property.
    Object,
    /// Any other body: the `body` argument is sent as-is.
    Wrapped,
}

/// What is needed to turn a tool call back into an HTTP request.
#[derive(Debug, Clone)]
pub struct OperationDetails {
    pub path: String,
    pub method: Method,
    pub parameters: Vec<ParameterDetails>,
    pub body: BodyKind,
    pub tags: Vec<String>,
}

impl OperationDetails {
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body != BodyKind::None
    }
}

/// Tool name (`operationId`) -> operation.
pub type OperationMap = HashMap<String, OperationDetails>;

/// Convert every `get`/`post`/`put`/`delete`/`patch` operation with an `operationId` into a tool.
///
/// Tools come back in document order.
///
/// # Errors
///
/// Returns an error if a `$ref` to a path item, parameter, request body or response cannot be
/// resolved.
pub async fn convert_openapi_to_tools(
    spec: &OpenAPI,
    resolver: &OpenApiResolver,
    options: ConvertOptions,
) -> Result<(Vec<Tool>, OperationMap)> {
    let root = resolver.root_doc().clone();
    let mut tools = Vec::new();
    let mut operation_map = OperationMap::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (path, item) in &spec.paths.paths {
        let (doc, item) = resolver.resolve_path_item(&root, item).await?;

        for method in &TOOL_METHODS {
            let Some(op) = operation_for(&item, method) else {
                continue;
            };
            let Some(operation_id) = op.operation_id.clone() else {
                tracing::warn!(method = %method, path = %path, "skipping operation without operationId");
                continue;
            };
            if !seen.insert(operation_id.clone()) {
                tracing::warn!(operation_id = %operation_id, path = %path, "skipping duplicate operationId");
                continue;
            }

            let generated = ToolInput {
                resolver,
                doc: &doc,
                path_item: &item,
                op,
                operation_id: &operation_id,
                options,
            }
            .generate()
            .await?;

            let mut tool = Tool::new(
                operation_id.clone(),
                generated.description,
                Arc::new(generated.input_schema),
            );
            tool.annotations = Some(annotations_for_method(method, op.summary.as_deref()));
            tools.push(tool);

            operation_map.insert(
                operation_id,
                OperationDetails {
                    path: path.clone(),
                    method: method.clone(),
                    parameters: generated.parameters,
                    body: generated.body,
                    tags: op.tags.clone(),
                },
            );
        }
    }

    tracing::debug!(tools = tools.len(), "converted OpenAPI operations");
    Ok((tools, operation_map))
}

fn operation_for<'a>(item: &'a PathItem, method: &Method) -> Option<&'a Operation> {
    match method.as_str() {
        "GET" => item.get.as_ref(),
        "POST" => item.post.as_ref(),
        "PUT" => item.put.as_ref(),
        "DELETE" => item.delete.as_ref(),
        "PATCH" => item.patch.as_ref(),
        _ => None,
    }
}

struct ToolInput<'a> {
    resolver: &'a OpenApiResolver,
    doc: &'a DocId,
    path_item: &'a PathItem,
    op: &'a Operation,
    operation_id: &'a str,
    options: ConvertOptions,
}

struct GeneratedTool {
    description: String,
    input_schema: JsonObject,
    parameters: Vec<ParameterDetails>,
    body: BodyKind,
}

impl ToolInput<'_> {
    async fn generate(self) -> Result<GeneratedTool> {
        let mut properties = Map::new();
        let mut required: Vec<String> = Vec::new();
        let mut parameters = Vec::new();

        let merged = merge_parameters(self.resolver, self.doc, &self.path_item.parameters, &self.op.parameters).await?;
        for (doc, param) in merged {
            let Some(location) = ParamLocation::from_parameter(&param) else {
                continue;
            };
            let data = param.parameter_data_ref();
            let schema = self.parameter_schema(&doc, &data.format).await;
            let schema = decorate_parameter_schema(schema, &data.name, data.description.as_deref());

            if location == ParamLocation::Path || data.required {
                required.push(data.name.clone());
            }
            properties.insert(data.name.clone(), schema);
            parameters.push(ParameterDetails {
                name: data.name.clone(),
                location,
            });
        }

        let body = self.add_body_properties(&mut properties, &mut required).await?;

        let mut input_schema = JsonObject::new();
        input_schema.insert("type".to_string(), json!("object"));
        input_schema.insert("properties".to_string(), Value::Object(properties));
        input_schema.insert("title".to_string(), json!(format!("{}Arguments", self.operation_id)));
        if !required.is_empty() {
            input_schema.insert("required".to_string(), json!(required));
        }

        let description = self.description().await?;

        Ok(GeneratedTool {
            description,
            input_schema,
            parameters,
            body,
        })
    }

    async fn parameter_schema(&self, doc: &DocId, format: &ParameterSchemaOrContent) -> Value {
        let raw = match format {
            ParameterSchemaOrContent::Schema(s) => serde_json::to_value(s).ok(),
            ParameterSchemaOrContent::Content(content) => content
                .values()
                .find_map(|m| m.schema.as_ref())
                .and_then(|s| serde_json::to_value(s).ok()),
        };
        match raw {
            Some(raw) => clean_schema(self.resolver.inline_schema_refs(doc, &raw).await),
            None => json!({"type": "string"}),
        }
    }

    async fn add_body_properties(
        &self,
        properties: &mut Map<String, Value>,
        required: &mut Vec<String>,
    ) -> Result<BodyKind> {
        let Some(body) = &self.op.request_body else {
            return Ok(BodyKind::None);
        };
        let (doc, body) = self.resolver.resolve_request_body(self.doc, body).await?;
        let Some(media) = json_media_type(&body.content) else {
            tracing::debug!(operation_id = %self.operation_id, "request body has no JSON content; ignoring");
            return Ok(BodyKind::None);
        };
        let schema = match &media.schema {
            Some(s) => clean_schema(self.resolver.inline_schema_refs(&doc, &serde_json::to_value(s)?).await),
            None => json!({"type": "object"}),
        };

        if let Some(body_props) = schema.get("properties").and_then(Value::as_object) {
            let body_required: HashSet<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            for (name, prop) in body_props {
                if properties.contains_key(name) {
                    tracing::debug!(
                        operation_id = %self.operation_id,
                        property = %name,
                        "body property shadowed by a parameter of the same name"
                    );
                    continue;
                }
                properties.insert(name.clone(), prop.clone());
                if body.required && body_required.contains(name.as_str()) {
                    required.push(name.clone());
                }
            }
            return Ok(BodyKind::Object);
        }

        let mut wrapped = schema;
        if let Some(obj) = wrapped.as_object_mut()
            && !obj.contains_key("title")
        {
            obj.insert("title".to_string(), json!("Body"));
        }
        properties.insert("body".to_string(), wrapped);
        if body.required {
            required.push("body".to_string());
        }
        Ok(BodyKind::Wrapped)
    }

    async fn description(&self) -> Result<String> {
        let mut description = self.op.summary.clone().unwrap_or_default();
        if let Some(d) = self.op.description.as_deref().filter(|d| !d.is_empty()) {
            if !description.is_empty() {
                description.push_str("\n\n");
            }
            description.push_str(d);
        }

        let selected = select_responses(&self.op.responses, self.options.describe_all_responses);
        if !selected.is_empty() {
            if !description.is_empty() {
                description.push_str("\n\n");
            }
            description.push_str("### Responses:\n");
        }
        for (status, response) in selected {
            let (doc, response) = self.resolver.resolve_response(self.doc, response).await?;
            let _ = write!(description, "\n**{status}**: {}", response.description);

            let Some(media) = json_media_type(&response.content) else {
                continue;
            };
            let schema = match &media.schema {
                Some(s) => Some(clean_schema(
                    self.resolver.inline_schema_refs(&doc, &serde_json::to_value(s)?).await,
                )),
                None => None,
            };

            let generated = schema.as_ref().map(example_from_schema).filter(|v| !v.is_null());
            let example = media_example(media).or(generated);
            if let Some(example) = example {
                let _ = write!(
                    description,
                    "\n\n**Example Response:**\n```json\n{}\n```",
                    serde_json::to_string_pretty(&example)?
                );
            }
            if self.options.describe_full_response_schema
                && let Some(schema) = &schema
            {
                let _ = write!(
                    description,
                    "\n\n**Output Schema:**\n```json\n{}\n```",
                    serde_json::to_string_pretty(schema)?
                );
            }
            description.push('\n');
        }

        Ok(description.trim_end().to_string())
    }
}

/// Give a parameter schema a title and the parameter's description, unless it has its own.
fn decorate_parameter_schema(schema: Value, name: &str, description: Option<&str>) -> Value {
    let Value::Object(mut obj) = schema else {
        return schema;
    };
    obj.entry("title").or_insert_with(|| json!(title_case(name)));
    if let Some(d) = description {
        obj.entry("description").or_insert_with(|| json!(d));
    }
    Value::Object(obj)
}

fn json_media_type(content: &openapiv3::Content) -> Option<&MediaType> {
    content
        .get("application/json")
        .or_else(|| content.iter().find(|(k, _)| k.contains("json")).map(|(_, v)| v))
}

fn media_example(media: &MediaType) -> Option<Value> {
    if let Some(example) = &media.example {
        return Some(example.clone());
    }
    media.examples.values().find_map(|e| match e {
        ReferenceOr::Item(example) => example.value.clone(),
        ReferenceOr::Reference { .. } => None,
    })
}

fn status_label(code: &StatusCode) -> String {
    match code {
        StatusCode::Code(c) => c.to_string(),
        StatusCode::Range(r) => format!("{r}XX"),
    }
}

/// Responses to document: all of them, or only the first success response
/// (lowest `2xx`, then `2XX`, then `default`).
fn select_responses(responses: &Responses, all: bool) -> Vec<(String, &ReferenceOr<openapiv3::Response>)> {
    if all {
        let labelled = responses.responses.iter().map(|(c, r)| (status_label(c), r));
        let default = responses.default.iter().map(|r| ("default".to_string(), r));
        return labelled.chain(default).collect();
    }

    let success = responses
        .responses
        .iter()
        .filter_map(|(c, r)| match c {
            StatusCode::Code(code) if (200..300).contains(code) => Some((*code, r)),
            _ => None,
        })
        .min_by_key(|(code, _)| *code)
        .map(|(code, r)| (code.to_string(), r))
        .or_else(|| {
            responses
                .responses
                .get(&StatusCode::Range(2))
                .map(|r| ("2XX".to_string(), r))
        })
        .or_else(|| responses.default.as_ref().map(|r| ("default".to_string(), r)));

    success.into_iter().collect()
}

/// Path-item parameters overlaid with operation parameters (same name and location: operation wins).
async fn merge_parameters(
    resolver: &OpenApiResolver,
    current_doc: &DocId,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<(DocId, Parameter)>> {
    fn key_for(p: &Parameter) -> (std::mem::Discriminant<Parameter>, String) {
        (std::mem::discriminant(p), p.parameter_data_ref().name.clone())
    }

    let mut merged: Vec<(DocId, Parameter)> = Vec::new();
    let mut index = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let (doc, rp) = resolver.resolve_parameter(current_doc, p).await?;
        let k = key_for(&rp);
        if let Some(i) = index.get(&k).copied() {
            merged[i] = (doc, rp);
        } else {
            index.insert(k, merged.len());
            merged.push((doc, rp));
        }
    }

    Ok(merged)
}
