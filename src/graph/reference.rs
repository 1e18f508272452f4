//! Reference normalization shared by discovery and path search.
//!
//! Turns a resource field value into existence-confirmed targets. Nothing here
//! fails: malformed strings, unresolvable URNs and dangling targets are logged
//! at debug level and dropped.

use serde_json::Value;

use super::{fetch, NodeId, Referrer, ResourceResolver};
use crate::schema::{ReferenceField, RelationshipSchema};

const URN_UUID_PREFIX: &str = "urn:uuid:";

/// Shape of a reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReference {
    /// `Type/id`
    Typed(NodeId),
    /// `urn:uuid:<id>`; the target type has to be probed.
    Urn(String),
    Malformed,
}

pub fn parse_reference(reference: &str) -> ParsedReference {
    if let Some(id) = reference.strip_prefix(URN_UUID_PREFIX) {
        return if id.is_empty() {
            ParsedReference::Malformed
        } else {
            ParsedReference::Urn(id.to_string())
        };
    }

    let segments: Vec<&str> = reference.split('/').collect();
    match segments.as_slice() {
        [resource_type, id] if !resource_type.is_empty() && !id.is_empty() => {
            ParsedReference::Typed(NodeId::new(*resource_type, *id))
        }
        _ => ParsedReference::Malformed,
    }
}

/// The `reference` strings held by a field value, scalar or array.
pub(crate) fn reference_strings(value: &Value) -> Vec<&str> {
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    entries
        .into_iter()
        .filter_map(|entry| entry.get("reference").and_then(Value::as_str))
        .collect()
}

/// The `reference` strings under a dotted field path such as
/// `participant.individual`. Arrays are flattened at every step.
pub(crate) fn field_references<'v>(resource: &'v Value, path: &str) -> Vec<&'v str> {
    let mut values = vec![resource];
    for segment in path.split('.') {
        values = values
            .into_iter()
            .filter_map(|value| value.get(segment))
            .flat_map(|value| match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            })
            .collect();
    }
    values.into_iter().flat_map(reference_strings).collect()
}

/// A reference whose target was found in the store.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub target: NodeId,
    pub resource: Value,
}

/// Resolve every reference in `resource[field]`, keeping only targets that exist.
pub(crate) fn resolve_field<R: ResourceResolver>(
    resolver: &R,
    owner: &NodeId,
    field: &ReferenceField,
    resource: &Value,
) -> Vec<ResolvedReference> {
    let mut resolved = Vec::new();
    for reference in field_references(resource, &field.name) {
        match parse_reference(reference) {
            ParsedReference::Typed(target) => match fetch(resolver, &target) {
                Some(found) => resolved.push(ResolvedReference {
                    target,
                    resource: found,
                }),
                None => log::debug!(
                    "{}.{} points at missing {}, dropping",
                    owner,
                    field.name,
                    target
                ),
            },
            ParsedReference::Urn(id) => match probe_urn(resolver, field, &id) {
                Some(found) => resolved.push(found),
                None => log::debug!(
                    "{}.{} URN {} matched none of {:?}, dropping",
                    owner,
                    field.name,
                    id,
                    field.config.candidate_target_types
                ),
            },
            ParsedReference::Malformed => {
                log::debug!("{}.{} has malformed reference {:?}", owner, field.name, reference)
            }
        }
    }
    resolved
}

/// Whether an index row still holds: the referrer's field must resolve to
/// `current` the same way forward expansion would resolve it. A URN is only
/// indexed per candidate type, so the row for a shadowed candidate fails here.
pub(crate) fn referrer_points_at<R: ResourceResolver>(
    resolver: &R,
    schema: &RelationshipSchema,
    referrer: &Referrer,
    resource: &Value,
    current: &NodeId,
) -> bool {
    field_references(resource, &referrer.field_path)
        .into_iter()
        .any(|reference| match parse_reference(reference) {
            ParsedReference::Typed(target) => target == *current,
            ParsedReference::Urn(id) if id == current.id => schema
                .fields_for(&referrer.source.resource_type)
                .iter()
                .find(|field| field.name == referrer.field_path)
                .and_then(|field| probe_urn(resolver, field, &id))
                .is_some_and(|found| found.target == *current),
            _ => false,
        })
}

/// First candidate type, in declared order, under which `id` exists.
fn probe_urn<R: ResourceResolver>(
    resolver: &R,
    field: &ReferenceField,
    id: &str,
) -> Option<ResolvedReference> {
    for candidate in &field.config.candidate_target_types {
        let target = NodeId::new(candidate.as_str(), id);
        if let Some(found) = fetch(resolver, &target) {
            return Some(ResolvedReference {
                target,
                resource: found,
            });
        }
    }
    None
}
