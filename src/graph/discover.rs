//! Bounded discovery of everything reachable from one resource.
//!
//! Breadth-first over an explicit work queue of `(NodeId, resource, depth)`, so the depth
//! bound never depends on the call stack. Nodes are added up to `max_depth`
//! hops from the root; nodes at `max_depth` are leaves and are never expanded.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;

use super::reference::{referrer_points_at, resolve_field};
use super::{
    display_label, fetch, Deadline, Edge, Graph, Node, NodeId, RelationType, ResourceResolver,
    ReverseIndex,
};
use crate::schema::RelationshipSchema;
use crate::{RelgraphError, Result};

/// Referrers fetched per node in the reverse pass unless configured otherwise.
pub const DEFAULT_REVERSE_LIMIT: usize = 200;

pub const MAX_DISCOVER_DEPTH: usize = 3;

pub struct GraphBuilder<'a, R, I> {
    schema: &'a RelationshipSchema,
    resolver: R,
    index: I,
    reverse_limit: usize,
    deadline: Deadline,
}

/// Per-call traversal state. Never shared between calls.
struct Discovery {
    graph: Graph,
    visited: HashSet<NodeId>,
    queue: VecDeque<(NodeId, Value, usize)>,
    max_depth: usize,
}

impl Discovery {
    /// Record a newly reached resource; already visited ones only get their edge.
    fn reach(&mut self, id: NodeId, resource: Value, depth: usize) {
        if !self.visited.insert(id.clone()) {
            return;
        }
        self.graph.nodes.push(Node {
            id: id.clone(),
            display_label: display_label(&resource),
            depth,
        });
        if depth < self.max_depth {
            self.queue.push_back((id, resource, depth));
        }
    }
}

impl<'a, R: ResourceResolver, I: ReverseIndex> GraphBuilder<'a, R, I> {
    pub fn new(schema: &'a RelationshipSchema, resolver: R, index: I) -> Self {
        Self {
            schema,
            resolver,
            index,
            reverse_limit: DEFAULT_REVERSE_LIMIT,
            deadline: Deadline::none(),
        }
    }

    pub fn with_reverse_limit(mut self, limit: usize) -> Self {
        self.reverse_limit = limit;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Build the graph around `root_type/root_id`.
    ///
    /// Fails with `NotFound` when the root does not exist. Every other lookup
    /// failure only removes the affected relationship from the result.
    pub fn discover(
        &self,
        root_type: &str,
        root_id: &str,
        max_depth: usize,
        include_reverse: bool,
    ) -> Result<Graph> {
        if !(1..=MAX_DISCOVER_DEPTH).contains(&max_depth) {
            return Err(RelgraphError::InvalidInput(format!(
                "depth must be between 1 and {}, got {}",
                MAX_DISCOVER_DEPTH, max_depth
            )));
        }

        let root = NodeId::new(root_type, root_id);
        let root_resource = self
            .resolver
            .get(root_type, root_id)?
            .ok_or_else(|| RelgraphError::NotFound(root.to_string()))?;

        let mut state = Discovery {
            graph: Graph::default(),
            visited: HashSet::new(),
            queue: VecDeque::new(),
            max_depth,
        };
        state.reach(root, root_resource, 0);

        while let Some((current, resource, depth)) = state.queue.pop_front() {
            if self.deadline.expired() {
                log::warn!(
                    "Discovery from {}/{} hit its deadline with {} nodes, returning partial graph",
                    root_type,
                    root_id,
                    state.graph.nodes.len()
                );
                state.graph.truncated = true;
                break;
            }

            self.expand_forward(&mut state, &current, &resource, depth);
            if include_reverse {
                self.expand_reverse(&mut state, &current, depth);
            }
        }

        log::debug!(
            "Discovered {} nodes / {} edges from {}/{} (depth {})",
            state.graph.nodes.len(),
            state.graph.edges.len(),
            root_type,
            root_id,
            max_depth
        );
        Ok(state.graph)
    }

    fn expand_forward(&self, state: &mut Discovery, current: &NodeId, resource: &Value, depth: usize) {
        for field in self.schema.fields_for(&current.resource_type) {
            for resolved in resolve_field(&self.resolver, current, field, resource) {
                state.graph.edges.push(Edge {
                    source: current.clone(),
                    target: resolved.target.clone(),
                    field: field.name.clone(),
                    relation_type: RelationType::Forward(field.config.cardinality),
                });
                state.reach(resolved.target, resolved.resource, depth + 1);
            }
        }
    }

    fn expand_reverse(&self, state: &mut Discovery, current: &NodeId, depth: usize) {
        let referrers = match self.index.find_referrers(
            &current.resource_type,
            &current.id,
            self.reverse_limit,
        ) {
            Ok(referrers) => referrers,
            Err(e) => {
                log::debug!("Reverse lookup for {} failed: {}", current, e);
                return;
            }
        };

        for referrer in referrers {
            // The index can lag behind deletes.
            let Some(resource) = fetch(&self.resolver, &referrer.source) else {
                log::debug!("Stale referrer {} of {}, skipping", referrer.source, current);
                continue;
            };
            if !referrer_points_at(&self.resolver, self.schema, &referrer, &resource, current) {
                log::debug!(
                    "{}.{} does not resolve to {}, skipping",
                    referrer.source,
                    referrer.field_path,
                    current
                );
                continue;
            }
            state.graph.edges.push(Edge {
                source: referrer.source.clone(),
                target: current.clone(),
                field: referrer.field_path,
                relation_type: RelationType::Reverse,
            });
            state.reach(referrer.source, resource, depth + 1);
        }
    }
}
