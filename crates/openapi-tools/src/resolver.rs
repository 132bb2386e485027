//! `OpenAPI` `$ref` resolver.
//!
//! `openapiv3` models `$ref`s as `ReferenceOr<T>` without resolving them. This resolver handles
//! local refs (`#/...`), file refs (`./common.yaml#/...`, `file:///...`) and URL refs.
//!
//! Resolution is relative to the document that contains the `$ref`, so callers pass the current
//! document id (`DocId`) along.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{Parameter, PathItem, ReferenceOr, RequestBody, Response};
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    Url(Url),
    File(PathBuf),
    /// A document handed over in memory. Relative refs resolve against the working directory.
    Inline,
}

impl DocId {
    /// Parse a root spec location into a document identifier (URL or file path).
    ///
    /// # Errors
    ///
    /// Returns an error if the location is an invalid URL or invalid file URL.
    pub fn parse(spec_location: &str) -> Result<Self> {
        if spec_location.starts_with("http://") || spec_location.starts_with("https://") {
            let url = Url::parse(spec_location).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Invalid OpenAPI spec URL '{spec_location}': {e}"))
            })?;
            Ok(DocId::Url(strip_fragment(url)))
        } else if spec_location.starts_with("file://") {
            Ok(DocId::File(file_url_to_path(spec_location)?))
        } else {
            Ok(DocId::File(canonicalize_best_effort(PathBuf::from(spec_location))))
        }
    }

    fn display(&self) -> String {
        match self {
            DocId::Url(u) => u.to_string(),
            DocId::File(p) => p.display().to_string(),
            DocId::Inline => "inline".to_string(),
        }
    }
}

fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

fn file_url_to_path(s: &str) -> Result<PathBuf> {
    let url = Url::parse(s)
        .map_err(|e| OpenApiToolsError::OpenApi(format!("Invalid file URL '{s}': {e}")))?;
    let path = url
        .to_file_path()
        .map_err(|()| OpenApiToolsError::OpenApi(format!("Invalid file URL (not a path): {s}")))?;
    Ok(canonicalize_best_effort(path))
}

/// Parse document text as JSON, falling back to YAML.
pub(crate) fn parse_document(content: &str) -> std::result::Result<Value, serde_yaml::Error> {
    serde_json::from_str(content).or_else(|_| serde_yaml::from_str(content))
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug)]
pub struct OpenApiResolver {
    root_doc: DocId,
    client: Client,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
}

impl OpenApiResolver {
    /// Create a resolver seeded with the root document.
    #[must_use]
    pub fn new(root_doc: DocId, root_value: Value, client: Client) -> Self {
        let mut docs = HashMap::new();
        docs.insert(root_doc.clone(), Arc::new(root_value));
        Self {
            root_doc,
            client,
            docs: RwLock::new(docs),
        }
    }

    #[must_use]
    pub fn root_doc(&self) -> &DocId {
        &self.root_doc
    }

    /// Resolve a `$ref` for a parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or its document cannot be loaded.
    pub async fn resolve_parameter(
        &self,
        current_doc: &DocId,
        param: &ReferenceOr<Parameter>,
    ) -> Result<(DocId, Parameter)> {
        self.resolve_reference_or(current_doc, param).await
    }

    /// Resolve a `$ref` for a request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or its document cannot be loaded.
    pub async fn resolve_request_body(
        &self,
        current_doc: &DocId,
        body: &ReferenceOr<RequestBody>,
    ) -> Result<(DocId, RequestBody)> {
        self.resolve_reference_or(current_doc, body).await
    }

    /// Resolve a `$ref` for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or its document cannot be loaded.
    pub async fn resolve_response(
        &self,
        current_doc: &DocId,
        response: &ReferenceOr<Response>,
    ) -> Result<(DocId, Response)> {
        self.resolve_reference_or(current_doc, response).await
    }

    /// Resolve a `$ref` for a path item.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or its document cannot be loaded.
    pub async fn resolve_path_item(
        &self,
        current_doc: &DocId,
        item: &ReferenceOr<PathItem>,
    ) -> Result<(DocId, PathItem)> {
        self.resolve_reference_or(current_doc, item).await
    }

    /// Replace every `{"$ref": ...}` inside a JSON schema with the schema it points to.
    ///
    /// A ref that is already being expanded higher up on the same branch is left in place,
    /// which keeps recursive models finite. Refs that cannot be resolved are left as-is too.
    pub async fn inline_schema_refs(&self, current_doc: &DocId, schema: &Value) -> Value {
        let mut expanding = Vec::new();
        self.inline_value(current_doc.clone(), schema.clone(), &mut expanding)
            .await
    }

    fn inline_value<'a>(
        &'a self,
        doc: DocId,
        value: Value,
        expanding: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Value> {
        Box::pin(async move {
            match value {
                Value::Object(map) => {
                    if let Some(Value::String(reference)) = map.get("$ref") {
                        let Ok(key) = Self::canonical_ref_key(&doc, reference) else {
                            return Value::Object(map);
                        };
                        if expanding.contains(&key) {
                            return Value::Object(map);
                        }
                        let Ok((target_doc, target)) = self.resolve_ref_value(&doc, reference).await
                        else {
                            tracing::debug!(reference = %reference, "leaving unresolved $ref in schema");
                            return Value::Object(map);
                        };
                        expanding.push(key);
                        let mut inlined = self.inline_value(target_doc, target, expanding).await;
                        expanding.pop();

                        // Sibling keywords next to `$ref` (e.g. a description) win.
                        if let Value::Object(out) = &mut inlined {
                            for (k, v) in map {
                                if k != "$ref" {
                                    out.insert(k, v);
                                }
                            }
                        }
                        return inlined;
                    }

                    let mut out = serde_json::Map::with_capacity(map.len());
                    for (k, v) in map {
                        let v = self.inline_value(doc.clone(), v, expanding).await;
                        out.insert(k, v);
                    }
                    Value::Object(out)
                }
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for v in items {
                        out.push(self.inline_value(doc.clone(), v, expanding).await);
                    }
                    Value::Array(out)
                }
                other => other,
            }
        })
    }

    async fn resolve_reference_or<T>(&self, current_doc: &DocId, r: &ReferenceOr<T>) -> Result<(DocId, T)>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut doc = current_doc.clone();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok((doc, item)),
                ReferenceOr::Reference { reference } => {
                    let key = Self::canonical_ref_key(&doc, &reference)?;
                    if !seen.insert(key) {
                        return Err(OpenApiToolsError::OpenApi(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }

                    let (target_doc, value) = self.resolve_ref_value(&doc, &reference).await?;
                    let next: ReferenceOr<T> = serde_json::from_value(value).map_err(|e| {
                        OpenApiToolsError::OpenApi(format!(
                            "Failed to deserialize referenced value '{}' (doc {}): {}",
                            reference,
                            target_doc.display(),
                            e
                        ))
                    })?;

                    doc = target_doc;
                    cur = next;
                }
            }
        }
    }

    async fn resolve_ref_value(&self, current_doc: &DocId, reference: &str) -> Result<(DocId, Value)> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let doc_value = self.load_doc(&target_doc).await?;

        let selected = if let Some(ptr) = pointer {
            doc_value.pointer(&ptr).cloned().ok_or_else(|| {
                OpenApiToolsError::OpenApi(format!(
                    "Unresolved $ref '{}' (doc {}, missing pointer '{}')",
                    reference,
                    target_doc.display(),
                    ptr
                ))
            })?
        } else {
            (*doc_value).clone()
        };

        Ok((target_doc, selected))
    }

    fn parse_ref(current_doc: &DocId, reference: &str) -> Result<(DocId, Option<String>)> {
        let (doc_part, frag_part) = match reference.split_once('#') {
            Some((d, f)) => (d, Some(f)),
            None => (reference, None),
        };

        let target_doc = Self::resolve_doc(current_doc, doc_part)?;

        let ptr = match frag_part {
            Some("") | None => None,
            Some(frag) if frag.starts_with('/') => Some(frag.to_string()),
            Some(_) => {
                return Err(OpenApiToolsError::OpenApi(format!(
                    "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
                )));
            }
        };

        Ok((target_doc, ptr))
    }

    fn resolve_doc(current_doc: &DocId, doc_part: &str) -> Result<DocId> {
        if doc_part.is_empty() {
            return Ok(current_doc.clone());
        }

        if doc_part.starts_with("http://") || doc_part.starts_with("https://") {
            let url = Url::parse(doc_part)
                .map_err(|e| OpenApiToolsError::OpenApi(format!("Bad $ref URL '{doc_part}': {e}")))?;
            return Ok(DocId::Url(strip_fragment(url)));
        }

        if doc_part.starts_with("file://") {
            return Ok(DocId::File(file_url_to_path(doc_part)?));
        }

        match current_doc {
            DocId::Url(base) => {
                let joined = base.join(doc_part).map_err(|e| {
                    OpenApiToolsError::OpenApi(format!(
                        "Failed to resolve relative $ref '{doc_part}' against base {base}: {e}",
                    ))
                })?;
                Ok(DocId::Url(strip_fragment(joined)))
            }
            DocId::File(base) => {
                let resolved = if Path::new(doc_part).is_absolute() {
                    PathBuf::from(doc_part)
                } else {
                    base.parent().unwrap_or_else(|| Path::new(".")).join(doc_part)
                };
                Ok(DocId::File(canonicalize_best_effort(resolved)))
            }
            DocId::Inline => Ok(DocId::File(canonicalize_best_effort(PathBuf::from(doc_part)))),
        }
    }

    fn canonical_ref_key(current_doc: &DocId, reference: &str) -> Result<String> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let mut key = match &target_doc {
            DocId::Url(u) => format!("url:{u}"),
            DocId::File(p) => format!("file:{}", p.display()),
            DocId::Inline => "inline:".to_string(),
        };
        if let Some(ptr) = pointer {
            key.push('#');
            key.push_str(&ptr);
        }
        Ok(key)
    }

    async fn load_doc(&self, doc: &DocId) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let content = match doc {
            DocId::File(path) => std::fs::read_to_string(path).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Failed to read referenced file {}: {e}", path.display()))
            })?,
            DocId::Url(url) => self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| OpenApiToolsError::OpenApi(format!("Failed to fetch referenced URL {url}: {e}")))?
                .text()
                .await
                .map_err(|e| OpenApiToolsError::OpenApi(format!("Failed to read referenced URL body: {e}")))?,
            DocId::Inline => {
                return Err(OpenApiToolsError::OpenApi(
                    "Inline document is not loaded".to_string(),
                ));
            }
        };

        let parsed = parse_document(&content).map_err(|e| {
            OpenApiToolsError::OpenApi(format!("Failed to parse referenced document {}: {e}", doc.display()))
        })?;

        let parsed = Arc::new(parsed);
        self.docs.write().insert(doc.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }
}
