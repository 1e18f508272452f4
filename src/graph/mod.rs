//! Relationship graph: bounded discovery around a resource and path search
//! between two resources.
//!
//! Both traversals walk the same implicit graph. Forward edges come from the
//! reference fields declared in the [`RelationshipSchema`](crate::schema::RelationshipSchema),
//! backward edges from a [`ReverseIndex`]. Neither owns any storage; callers
//! hand in a [`ResourceResolver`] and a [`ReverseIndex`] scoped to one request.

mod discover;
mod display;
mod paths;
mod reference;
#[cfg(test)]
pub(crate) mod testutil;

pub use discover::{GraphBuilder, DEFAULT_REVERSE_LIMIT};
pub use display::display_label;
pub use paths::{PathFinder, DEFAULT_RESULT_CAP};
pub use reference::{parse_reference, ParsedReference, ResolvedReference};
pub(crate) use reference::field_references;

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Cardinality;
use crate::Result;

/// Vertex key: `(resourceType, resourceId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeId {
    pub resource_type: String,
    pub id: String,
}

impl NodeId {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Parse `Type/id`. Anything else is `None`.
    pub fn parse(key: &str) -> Option<Self> {
        match parse_reference(key) {
            ParsedReference::Typed(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub display_label: String,
    /// Hop distance from the origin at which the node was first reached.
    pub depth: usize,
}

/// Edge kind: the declared cardinality of a forward field, or a backlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    Forward(Cardinality),
    Reverse,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Forward(c) => c.as_str(),
            RelationType::Reverse => "reverse",
        }
    }
}

impl Serialize for RelationType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// `source` always holds the reference; for reverse edges that is the referrer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub field: String,
    pub relation_type: RelationType,
}

/// Discovery result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// The deadline expired before the bounded traversal finished.
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hop {
    pub from: NodeId,
    pub to: NodeId,
    /// 1-based position in the path.
    pub step: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Path {
    pub hops: Vec<Hop>,
}

impl Path {
    pub(crate) fn from_nodes(nodes: &[NodeId]) -> Self {
        let hops = nodes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Hop {
                from: pair[0].clone(),
                to: pair[1].clone(),
                step: i + 1,
            })
            .collect();
        Self { hops }
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

/// Path search result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathSet {
    pub paths: Vec<Path>,
    pub truncated: bool,
}

/// One row of the reverse index: `source_id` holds a reference at `field_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer {
    pub source: NodeId,
    pub field_path: String,
}

/// Fetches live resources by key.
pub trait ResourceResolver {
    /// `Ok(None)` when the resource does not exist (or is deleted).
    fn get(&self, resource_type: &str, id: &str) -> Result<Option<Value>>;
}

/// Answers "who references this resource?".
pub trait ReverseIndex {
    /// At most `limit` live referrers of `(target_type, target_id)`.
    fn find_referrers(&self, target_type: &str, target_id: &str, limit: usize) -> Result<Vec<Referrer>>;

    /// Uncapped referrer count.
    fn count_referrers(&self, target_type: &str, target_id: &str) -> Result<usize> {
        Ok(self.find_referrers(target_type, target_id, usize::MAX)?.len())
    }
}

impl<T: ResourceResolver + ?Sized> ResourceResolver for &T {
    fn get(&self, resource_type: &str, id: &str) -> Result<Option<Value>> {
        (**self).get(resource_type, id)
    }
}

impl<T: ReverseIndex + ?Sized> ReverseIndex for &T {
    fn find_referrers(&self, target_type: &str, target_id: &str, limit: usize) -> Result<Vec<Referrer>> {
        (**self).find_referrers(target_type, target_id, limit)
    }

    fn count_referrers(&self, target_type: &str, target_id: &str) -> Result<usize> {
        (**self).count_referrers(target_type, target_id)
    }
}

/// Wall-clock budget for a single traversal call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now().checked_add(budget))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

/// Fetch a resource, treating resolver errors as absence.
pub(crate) fn fetch<R: ResourceResolver>(resolver: &R, node: &NodeId) -> Option<Value> {
    match resolver.get(&node.resource_type, &node.id) {
        Ok(found) => found,
        Err(e) => {
            log::debug!("Lookup of {} failed, treating as absent: {}", node, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse_and_display() {
        let id = NodeId::parse("Patient/P1").unwrap();
        assert_eq!(id, NodeId::new("Patient", "P1"));
        assert_eq!(id.to_string(), "Patient/P1");
        assert!(NodeId::parse("urn:uuid:abc").is_none());
        assert!(NodeId::parse("Patient").is_none());
        assert!(NodeId::parse("Patient/P1/_history/2").is_none());
    }

    #[test]
    fn test_path_from_nodes() {
        let nodes = vec![
            NodeId::new("Encounter", "E1"),
            NodeId::new("Patient", "P1"),
            NodeId::new("Organization", "O1"),
        ];
        let path = Path::from_nodes(&nodes);
        assert_eq!(path.len(), 2);
        assert_eq!(path.hops[0].step, 1);
        assert_eq!(path.hops[1].from, NodeId::new("Patient", "P1"));
        assert_eq!(path.hops[1].step, 2);
        assert!(Path::from_nodes(&nodes[..1]).is_empty());
    }

    #[test]
    fn test_relation_type_serializes_as_string() {
        let forward = serde_json::to_value(RelationType::Forward(Cardinality::ManyToMany)).unwrap();
        assert_eq!(forward, "many-to-many");
        let reverse = serde_json::to_value(RelationType::Reverse).unwrap();
        assert_eq!(reverse, "reverse");
    }

    #[test]
    fn test_deadline() {
        assert!(!Deadline::none().expired());
        assert!(Deadline::after(Duration::ZERO).expired());
        assert!(!Deadline::after(Duration::from_secs(60)).expired());
    }
}
