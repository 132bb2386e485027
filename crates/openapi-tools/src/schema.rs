//! JSON schema helpers used when turning `OpenAPI` operations into tool schemas.

use serde_json::{Map, Value, json};

/// Keys that only matter for documentation renderers.
const DISPLAY_ONLY_KEYS: &[&str] = &["xml", "externalDocs"];

/// Remove display-only keys at every depth.
#[must_use]
pub fn clean_schema(schema: Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !DISPLAY_ONLY_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k, clean_schema(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_schema).collect()),
        other => other,
    }
}

/// Build a plausible example value from a (ref-free) JSON schema.
#[must_use]
pub fn example_from_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return Value::Null;
    };

    if let Some(example) = obj.get("example") {
        return example.clone();
    }
    if let Some(first) = obj.get("examples").and_then(Value::as_array).and_then(|a| a.first()) {
        return first.clone();
    }
    if let Some(default) = obj.get("default") {
        return default.clone();
    }
    if let Some(first) = obj.get("enum").and_then(Value::as_array).and_then(|a| a.first()) {
        return first.clone();
    }
    for combinator in ["allOf", "anyOf", "oneOf"] {
        if let Some(first) = obj.get(combinator).and_then(Value::as_array).and_then(|a| a.first()) {
            if combinator == "allOf" {
                return merge_all_of_examples(obj.get(combinator));
            }
            return example_from_schema(first);
        }
    }

    match schema_type(obj) {
        Some("object") => {
            let mut out = Map::new();
            if let Some(props) = obj.get("properties").and_then(Value::as_object) {
                for (name, prop) in props {
                    out.insert(name.clone(), example_from_schema(prop));
                }
            }
            Value::Object(out)
        }
        Some("array") => match obj.get("items") {
            Some(items) => json!([example_from_schema(items)]),
            None => json!([]),
        },
        Some("string") => match obj.get("format").and_then(Value::as_str) {
            Some("date-time") => json!("2024-01-01T00:00:00Z"),
            Some("date") => json!("2024-01-01"),
            Some("email") => json!("user@example.com"),
            Some("uri" | "url") => json!("https://example.com"),
            Some("uuid") => json!("00000000-0000-0000-0000-000000000000"),
            _ => json!("string"),
        },
        Some("integer") => json!(1),
        Some("number") => json!(1.0),
        Some("boolean") => json!(true),
        _ if obj.contains_key("properties") => {
            let mut without_type = obj.clone();
            without_type.insert("type".to_string(), json!("object"));
            example_from_schema(&Value::Object(without_type))
        }
        _ => Value::Null,
    }
}

fn merge_all_of_examples(parts: Option<&Value>) -> Value {
    let mut out = Map::new();
    for part in parts.and_then(Value::as_array).into_iter().flatten() {
        match example_from_schema(part) {
            Value::Object(m) => out.extend(m),
            other if out.is_empty() => return other,
            _ => {}
        }
    }
    Value::Object(out)
}

/// The first non-null `type` of a schema (`"type": ["string", "null"]` is allowed in 3.1).
fn schema_type(obj: &Map<String, Value>) -> Option<&str> {
    match obj.get("type")? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

/// `item_id` -> `Item Id`.
#[must_use]
pub fn title_case(name: &str) -> String {
    name.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_schema_strips_display_keys_recursively() {
        let cleaned = clean_schema(json!({
            "type": "object",
            "xml": {"name": "item"},
            "properties": {
                "tags": {"type": "array", "items": {"type": "string", "externalDocs": {"url": "x"}}}
            }
        }));
        assert_eq!(
            cleaned,
            json!({"type": "object", "properties": {"tags": {"type": "array", "items": {"type": "string"}}}})
        );
    }

    #[test]
    fn example_prefers_explicit_example() {
        let explicit = json!({"type": "integer", "example": 42});
        assert_eq!(example_from_schema(&explicit), json!(42));
        let enumerated = json!({"type": "string", "enum": ["a", "b"]});
        assert_eq!(example_from_schema(&enumerated), json!("a"));
    }

    #[test]
    fn example_for_nested_object() {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string"},
                "price": {"type": "number"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "created": {"type": "string", "format": "date-time"}
            }
        });
        assert_eq!(
            example_from_schema(&schema),
            json!({
                "id": 1,
                "name": "string",
                "price": 1.0,
                "tags": ["string"],
                "created": "2024-01-01T00:00:00Z"
            })
        );
    }

    #[test]
    fn example_merges_all_of() {
        let schema = json!({"allOf": [
            {"type": "object", "properties": {"a": {"type": "boolean"}}},
            {"type": "object", "properties": {"b": {"type": "integer"}}}
        ]});
        assert_eq!(example_from_schema(&schema), json!({"a": true, "b": 1}));
    }

    #[test]
    fn nullable_type_lists_use_the_concrete_type() {
        assert_eq!(example_from_schema(&json!({"type": ["null", "integer"]})), json!(1));
    }

    #[test]
    fn title_case_splits_separators() {
        assert_eq!(title_case("item_id"), "Item Id");
        assert_eq!(title_case("X-Request-ID"), "X Request Id");
        assert_eq!(title_case("skip"), "Skip");
    }
}
