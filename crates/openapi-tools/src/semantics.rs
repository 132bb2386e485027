//! Tool annotations derived from HTTP method semantics (RFC 9110).

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Methods that become tools, in the order they are visited within a path item.
pub const TOOL_METHODS: [Method; 5] = [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH];

/// Build annotations for an operation.
///
/// Every generated tool talks to an external API, so `openWorldHint` is always set.
/// The operation summary, when present, becomes the annotation title.
#[must_use]
pub fn annotations_for_method(method: &Method, summary: Option<&str>) -> ToolAnnotations {
    // (read_only, destructive, idempotent)
    let (read_only, destructive, idempotent) = match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" => (Some(true), Some(false), Some(true)),
        "POST" => (Some(false), Some(false), Some(false)),
        "PUT" | "DELETE" => (Some(false), Some(true), Some(true)),
        // PATCH may or may not be idempotent.
        "PATCH" => (Some(false), Some(true), None),
        _ => (None, None, None),
    };

    ToolAnnotations {
        title: summary.map(str::to_string),
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}

/// Whether arguments left over after parameter substitution are sent as a JSON body.
#[must_use]
pub fn method_accepts_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_method_is_open_world() {
        for m in &TOOL_METHODS {
            assert_eq!(annotations_for_method(m, None).open_world_hint, Some(true));
        }
    }

    #[test]
    fn get_is_read_only() {
        let a = annotations_for_method(&Method::GET, Some("List Items"));
        assert_eq!(a.title.as_deref(), Some("List Items"));
        assert_eq!(a.read_only_hint, Some(true));
        assert_eq!(a.destructive_hint, Some(false));
        assert_eq!(a.idempotent_hint, Some(true));
    }

    #[test]
    fn delete_is_destructive_and_idempotent() {
        let a = annotations_for_method(&Method::DELETE, None);
        assert_eq!(a.read_only_hint, Some(false));
        assert_eq!(a.destructive_hint, Some(true));
        assert_eq!(a.idempotent_hint, Some(true));
    }

    #[test]
    fn patch_leaves_idempotence_unknown() {
        let a = annotations_for_method(&Method::PATCH, None);
        assert_eq!(a.destructive_hint, Some(true));
        assert_eq!(a.idempotent_hint, None);
    }

    #[test]
    fn only_write_methods_carry_a_body() {
        assert!(method_accepts_body(&Method::POST));
        assert!(method_accepts_body(&Method::PUT));
        assert!(method_accepts_body(&Method::PATCH));
        assert!(!method_accepts_body(&Method::GET));
        assert!(!method_accepts_body(&Method::DELETE));
    }
}
