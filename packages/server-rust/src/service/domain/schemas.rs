//! JSON Schemas advertised in the discovery document.
//!
//! Schemas are opaque to the dispatcher; arguments are validated by the typed
//! `FromArgs` decoders in the sibling modules, and these values only describe
//! the same shapes to clients.

use serde_json::{json, Value};

use crate::storage::media::{ACCEPTED_MEDIA_TYPES, MAX_MEDIA_BYTES};

/// Closed object schema with the given properties.
fn object(properties: Value, required: &[&str]) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema["additionalProperties"] = json!(false);
    schema
}

fn string_array() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

fn page_limit() -> Value {
    json!({ "type": "integer", "minimum": 1, "maximum": 100, "default": 20 })
}

fn only_id() -> Value {
    object(json!({ "id": { "type": "string" } }), &["id"])
}

// ---------------------------------------------------------------------------
// Shared shapes
// ---------------------------------------------------------------------------

#[must_use]
pub fn todo() -> Value {
    let location = object(
        json!({
            "uri": { "type": "string" },
            "method": { "type": "string" },
            "headers": {
                "type": "object",
                "additionalProperties": { "type": "string" },
            },
        }),
        &["uri"],
    );
    object(
        json!({
            "id": { "type": "string" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "dueDate": { "type": "string" },
            "labels": string_array(),
            "completed": { "type": "boolean" },
            "completedAt": { "type": ["string", "null"] },
            "createdAt": { "type": "string" },
            "updatedAt": { "type": "string" },
            "attachmentId": { "type": "string" },
            "location": location,
        }),
        &["id", "title", "completed", "createdAt", "updatedAt"],
    )
}

#[must_use]
pub fn todo_page() -> Value {
    object(
        json!({
            "items": { "type": "array", "items": todo() },
            "cursor": { "type": ["string", "null"] },
            "total": { "type": "integer" },
        }),
        &["items", "cursor", "total"],
    )
}

/// Shape of each frame pushed to `v1:todos.watch` listeners.
#[must_use]
pub fn watch_frame() -> Value {
    object(
        json!({
            "event": {
                "type": "string",
                "enum": ["created", "updated", "deleted", "completed"],
            },
            "todo": todo(),
            "todoId": { "type": "string" },
            "timestamp": { "type": "string" },
        }),
        &["event", "timestamp"],
    )
}

// ---------------------------------------------------------------------------
// Per-operation arguments and results
// ---------------------------------------------------------------------------

#[must_use]
pub fn create_args() -> Value {
    object(
        json!({
            "title": { "type": "string" },
            "description": { "type": "string" },
            "dueDate": { "type": "string" },
            "labels": string_array(),
        }),
        &["title"],
    )
}

#[must_use]
pub fn get_args() -> Value {
    only_id()
}

#[must_use]
pub fn list_args() -> Value {
    object(
        json!({
            "cursor": { "type": "string" },
            "limit": page_limit(),
            "completed": { "type": "boolean" },
            "label": { "type": "string" },
        }),
        &[],
    )
}

#[must_use]
pub fn update_args() -> Value {
    object(
        json!({
            "id": { "type": "string" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "dueDate": { "type": "string" },
            "labels": string_array(),
            "completed": { "type": "boolean" },
        }),
        &["id"],
    )
}

#[must_use]
pub fn delete_args() -> Value {
    only_id()
}

#[must_use]
pub fn delete_result() -> Value {
    object(json!({ "deleted": { "type": "boolean" } }), &["deleted"])
}

#[must_use]
pub fn complete_args() -> Value {
    only_id()
}

#[must_use]
pub fn search_args() -> Value {
    object(
        json!({
            "query": { "type": "string" },
            "limit": page_limit(),
        }),
        &["query"],
    )
}

#[must_use]
pub fn export_args() -> Value {
    object(
        json!({
            "format": { "type": "string", "enum": ["csv", "json"], "default": "csv" },
        }),
        &[],
    )
}

#[must_use]
pub fn export_result() -> Value {
    object(
        json!({
            "format": { "type": "string" },
            "data": { "type": "string" },
            "count": { "type": "integer" },
        }),
        &["format", "data", "count"],
    )
}

#[must_use]
pub fn report_args() -> Value {
    object(
        json!({
            "type": { "type": "string", "enum": ["summary", "detailed"], "default": "summary" },
        }),
        &[],
    )
}

#[must_use]
pub fn report_result() -> Value {
    object(
        json!({
            "type": { "type": "string" },
            "totalTodos": { "type": "integer" },
            "completedTodos": { "type": "integer" },
            "pendingTodos": { "type": "integer" },
            "generatedAt": { "type": "string" },
        }),
        &["type", "totalTodos", "completedTodos", "pendingTodos", "generatedAt"],
    )
}

#[must_use]
pub fn simulate_error_args() -> Value {
    object(
        json!({
            "statusCode": { "type": "integer" },
            "code": { "type": "string", "default": "SIMULATED_ERROR" },
            "message": { "type": "string", "default": "Simulated error for testing" },
        }),
        &["statusCode"],
    )
}

#[must_use]
pub fn simulate_error_result() -> Value {
    object(json!({ "simulated": { "type": "boolean" } }), &["simulated"])
}

#[must_use]
pub fn watch_args() -> Value {
    object(
        json!({
            "filter": {
                "type": "string",
                "enum": ["all", "completed", "pending"],
                "default": "all",
            },
        }),
        &[],
    )
}

#[must_use]
pub fn attach_args() -> Value {
    object(
        json!({
            "todoId": { "type": "string" },
            "ref": { "type": "string" },
        }),
        &["todoId"],
    )
}

#[must_use]
pub fn attach_result() -> Value {
    object(
        json!({
            "todoId": { "type": "string" },
            "attachmentId": { "type": "string" },
            "contentType": { "type": "string" },
            "filename": { "type": "string" },
        }),
        &["todoId", "attachmentId", "contentType", "filename"],
    )
}

/// The `mediaSchema` of `v1:todos.attach`: one optional part named `file`.
#[must_use]
pub fn attach_media() -> Value {
    json!({
        "name": "file",
        "required": false,
        "acceptedTypes": ACCEPTED_MEDIA_TYPES,
        "maxBytes": MAX_MEDIA_BYTES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_schemas_are_closed() {
        for schema in [todo(), todo_page(), watch_frame(), create_args(), list_args()] {
            assert_eq!(schema["type"], "object");
            assert_eq!(schema["additionalProperties"], false);
        }
    }

    #[test]
    fn optional_only_schemas_omit_required() {
        assert!(list_args().get("required").is_none());
        assert!(export_args().get("required").is_none());
        assert_eq!(get_args()["required"], json!(["id"]));
    }

    #[test]
    fn todo_nests_a_closed_location() {
        let location = &todo()["properties"]["location"];
        assert_eq!(location["required"], json!(["uri"]));
        assert_eq!(location["additionalProperties"], false);
        assert_eq!(
            location["properties"]["headers"]["additionalProperties"],
            json!({ "type": "string" })
        );
    }

    #[test]
    fn attach_media_advertises_limits() {
        let media = attach_media();
        assert_eq!(media["maxBytes"], 10_485_760);
        assert_eq!(media["acceptedTypes"].as_array().map(Vec::len), Some(4));
    }
}
