//! A small items API with a hand-written `OpenAPI` document, used as the target of generated tools.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tool names generated from [`openapi`], in document order.
pub const OPERATION_IDS: [&str; 8] = [
    "list_items",
    "create_item",
    "get_item",
    "update_item",
    "delete_item",
    "raise_error",
    "inspect_request",
    "get_logo",
];

/// 1x1 transparent PNG.
pub const LOGO_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00,
    0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4, 0x89, 0x00, 0x00, 0x00,
    0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d,
    0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

type Store = Arc<RwLock<BTreeMap<u64, Item>>>;

fn seed() -> BTreeMap<u64, Item> {
    [
        (1, "Item 1", 10.0, vec!["tag1", "tag2"]),
        (2, "Item 2", 20.0, vec!["tag2", "tag3"]),
        (3, "Item 3", 30.0, vec!["tag3", "tag4"]),
    ]
    .into_iter()
    .map(|(id, name, price, tags)| {
        (
            id,
            Item {
                id,
                name: name.to_string(),
                description: Some(format!("Item {id} description")),
                price,
                tags: tags.into_iter().map(str::to_string).collect(),
            },
        )
    })
    .collect()
}

/// The items API. The document it serves at `/openapi.json` uses a relative server URL (`/`).
pub fn router() -> Router {
    let store: Store = Arc::new(RwLock::new(seed()));
    Router::new()
        .route("/openapi.json", get(|| async { Json(openapi("/")) }))
        .route("/items", get(list_items).post(create_item))
        .route("/items/{item_id}", get(get_item).put(update_item).delete(delete_item))
        .route("/error", get(raise_error))
        .route("/inspect", get(inspect_request))
        .route("/logo.png", get(get_logo))
        .with_state(store)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Item not found"}))).into_response()
}

async fn list_items(State(store): State<Store>, Query(query): Query<Vec<(String, String)>>) -> Response {
    let mut skip = 0usize;
    let mut limit = 10usize;
    let mut tags: Vec<String> = Vec::new();
    for (k, v) in query {
        match k.as_str() {
            "skip" => skip = v.parse().unwrap_or(0),
            "limit" => limit = v.parse().unwrap_or(10),
            "tags" => tags.push(v),
            _ => {}
        }
    }
    let items: Vec<Item> = store
        .read()
        .values()
        .filter(|i| tags.is_empty() || i.tags.iter().any(|t| tags.contains(t)))
        .skip(skip)
        .take(limit)
        .cloned()
        .collect();
    Json(items).into_response()
}

#[derive(Deserialize)]
struct GetItemQuery {
    #[serde(default)]
    include_details: bool,
}

async fn get_item(State(store): State<Store>, Path(item_id): Path<u64>, Query(q): Query<GetItemQuery>) -> Response {
    let Some(mut item) = store.read().get(&item_id).cloned() else {
        return not_found();
    };
    if !q.include_details {
        item.description = None;
    }
    Json(item).into_response()
}

async fn create_item(State(store): State<Store>, Json(item): Json<Item>) -> Response {
    store.write().insert(item.id, item.clone());
    (StatusCode::CREATED, Json(item)).into_response()
}

async fn update_item(State(store): State<Store>, Path(item_id): Path<u64>, Json(mut item): Json<Item>) -> Response {
    let mut items = store.write();
    if !items.contains_key(&item_id) {
        return not_found();
    }
    item.id = item_id;
    items.insert(item_id, item.clone());
    Json(item).into_response()
}

async fn delete_item(State(store): State<Store>, Path(item_id): Path<u64>) -> Response {
    if store.write().remove(&item_id).is_none() {
        return not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn raise_error() -> Response {
    let body = Json(json!({"detail": "This is a test error"}));
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}

async fn inspect_request(uri: Uri, headers: HeaderMap) -> Json<Value> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    Json(json!({
        "query": uri.query().unwrap_or(""),
        "x_trace_id": header("x-trace-id"),
        "authorization": header("authorization"),
        "x_static": header("x-static"),
    }))
}

async fn get_logo() -> Response {
    ([(header::CONTENT_TYPE, "image/png")], LOGO_PNG).into_response()
}

/// `OpenAPI` 3.0 document for [`router`], advertising `server_url` as its only server.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn openapi(server_url: &str) -> Value {
    let item_id = json!({
        "name": "item_id", "in": "path", "required": true,
        "description": "ID of the item", "schema": {"type": "integer"}
    });
    let item_body = json!({
        "required": true,
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Item"}}}
    });
    let item_response = |description: &str| {
        json!({
            "description": description,
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Item"}}}
        })
    };
    let not_found = json!({
        "description": "Item not found",
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/HTTPError"}}}
    });

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Test Items API",
            "version": "0.1.0",
            "description": "A test API for items"
        },
        "servers": [{"url": server_url}],
        "tags": [{"name": "items"}, {"name": "error"}, {"name": "debug"}, {"name": "media"}],
        "paths": {
            "/items": {
                "get": {
                    "operationId": "list_items",
                    "summary": "List Items",
                    "description": "List all items with pagination and optional tag filtering.",
                    "tags": ["items", "read"],
                    "parameters": [
                        {"name": "skip", "in": "query", "description": "Number of items to skip",
                         "schema": {"type": "integer", "default": 0}},
                        {"name": "limit", "in": "query", "description": "Max number of items to return",
                         "schema": {"type": "integer", "default": 10}},
                        {"name": "tags", "in": "query", "description": "Only items carrying one of these tags",
                         "schema": {"type": "array", "items": {"type": "string"}}}
                    ],
                    "responses": {
                        "200": {"description": "OK", "content": {"application/json": {
                            "schema": {"type": "array", "items": {"$ref": "#/components/schemas/Item"}}}}}
                    }
                },
                "post": {
                    "operationId": "create_item",
                    "summary": "Create Item",
                    "description": "Create a new item.",
                    "tags": ["items", "write"],
                    "requestBody": item_body,
                    "responses": {"201": item_response("Created")}
                }
            },
            "/items/{item_id}": {
                "parameters": [item_id],
                "get": {
                    "operationId": "get_item",
                    "summary": "Get Item",
                    "description": "Get a specific item by its ID.",
                    "tags": ["items", "read"],
                    "parameters": [
                        {"name": "include_details", "in": "query", "description": "Include item description",
                         "schema": {"type": "boolean", "default": false}}
                    ],
                    "responses": {"200": item_response("OK"), "404": not_found}
                },
                "put": {
                    "operationId": "update_item",
                    "summary": "Update Item",
                    "tags": ["items", "write"],
                    "requestBody": item_body,
                    "responses": {"200": item_response("OK"), "404": not_found}
                },
                "delete": {
                    "operationId": "delete_item",
                    "summary": "Delete Item",
                    "tags": ["items", "write"],
                    "responses": {"204": {"description": "Deleted"}, "404": not_found}
                }
            },
            "/error": {
                "get": {
                    "operationId": "raise_error",
                    "summary": "Raise Error",
                    "tags": ["error"],
                    "responses": {"500": {"description": "Always fails"}}
                }
            },
            "/inspect": {
                "get": {
                    "operationId": "inspect_request",
                    "summary": "Inspect Request",
                    "description": "Echo the query string and selected headers.",
                    "tags": ["debug"],
                    "parameters": [
                        {"name": "x-trace-id", "in": "header", "schema": {"type": "string"}},
                        {"name": "filter", "in": "query", "schema": {"type": "object"}},
                        {"name": "flag", "in": "query", "schema": {"type": "boolean"}}
                    ],
                    "responses": {"200": {"description": "Echo"}}
                }
            },
            "/logo.png": {
                "get": {
                    "operationId": "get_logo",
                    "summary": "Get Logo",
                    "tags": ["media"],
                    "responses": {"200": {"description": "PNG", "content": {"image/png": {}}}}
                }
            }
        },
        "components": {"schemas": {
            "Item": {
                "type": "object",
                "required": ["id", "name", "price"],
                "properties": {
                    "id": {"type": "integer", "title": "Id"},
                    "name": {"type": "string", "title": "Name"},
                    "description": {"type": "string", "title": "Description", "nullable": true},
                    "price": {"type": "number", "title": "Price"},
                    "tags": {"type": "array", "items": {"type": "string"}, "title": "Tags"}
                }
            },
            "HTTPError": {
                "type": "object",
                "required": ["detail"],
                "properties": {"detail": {"type": "string"}}
            }
        }}
    })
}
