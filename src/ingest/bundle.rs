//! Unpacking of resource documents: a single resource or a `Bundle` of them.

use serde_json::Value;
use uuid::Uuid;

use crate::graph::{parse_reference, ParsedReference};
use crate::{RelgraphError, Result};

/// Resources contained in one JSON document, each guaranteed an `id`.
///
/// Bundle entries without an id take the UUID from a `urn:uuid:` `fullUrl`,
/// so in-bundle URN references resolve once loaded. Anything else without an
/// id gets a fresh v4 UUID.
pub fn resources_from_document(document: Value) -> Result<Vec<Value>> {
    let resource_type = document
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| RelgraphError::InvalidInput("document has no resourceType".to_string()))?;

    if resource_type != "Bundle" {
        return Ok(vec![ensure_id(document, None)]);
    }

    let Some(Value::Array(entries)) = document.get("entry").cloned() else {
        return Ok(Vec::new());
    };

    let mut resources = Vec::with_capacity(entries.len());
    for entry in entries {
        let full_url = entry.get("fullUrl").and_then(Value::as_str).map(str::to_string);
        match entry.get("resource").cloned() {
            Some(resource @ Value::Object(_)) => {
                resources.push(ensure_id(resource, full_url.as_deref()));
            }
            _ => log::debug!("Skipping bundle entry without a resource"),
        }
    }
    Ok(resources)
}

fn ensure_id(mut resource: Value, full_url: Option<&str>) -> Value {
    let has_id = resource
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if has_id {
        return resource;
    }

    let id = match full_url.map(parse_reference) {
        Some(ParsedReference::Urn(id)) => id,
        _ => Uuid::new_v4().to_string(),
    };
    if let Value::Object(fields) = &mut resource {
        fields.insert("id".to_string(), Value::String(id));
    }
    resource
}
