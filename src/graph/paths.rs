//! Bounded breadth-first path search between two resources.
//!
//! Two guards keep the search finite. A node is expanded at most once per run
//! (whichever path reaches it first wins), and a path never revisits one of its
//! own nodes. The same node can still appear in several returned paths.

use std::collections::{HashSet, VecDeque};

use super::reference::{referrer_points_at, resolve_field};
use super::{fetch, Deadline, NodeId, Path, PathSet, ResourceResolver, ReverseIndex};
use crate::graph::DEFAULT_REVERSE_LIMIT;
use crate::schema::RelationshipSchema;
use crate::{RelgraphError, Result};

pub const DEFAULT_RESULT_CAP: usize = 10;

pub const MAX_PATH_DEPTH: usize = 5;

pub struct PathFinder<'a, R, I> {
    schema: &'a RelationshipSchema,
    resolver: R,
    index: I,
    reverse_limit: usize,
    result_cap: usize,
    deadline: Deadline,
}

impl<'a, R: ResourceResolver, I: ReverseIndex> PathFinder<'a, R, I> {
    pub fn new(schema: &'a RelationshipSchema, resolver: R, index: I) -> Self {
        Self {
            schema,
            resolver,
            index,
            reverse_limit: DEFAULT_REVERSE_LIMIT,
            result_cap: DEFAULT_RESULT_CAP,
            deadline: Deadline::none(),
        }
    }

    pub fn with_reverse_limit(mut self, limit: usize) -> Self {
        self.reverse_limit = limit;
        self
    }

    pub fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = cap;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// All paths of at most `max_depth` hops from `source` to `target`,
    /// shortest first, capped at the configured result count.
    pub fn find_paths(&self, source: &NodeId, target: &NodeId, max_depth: usize) -> Result<PathSet> {
        if !(1..=MAX_PATH_DEPTH).contains(&max_depth) {
            return Err(RelgraphError::InvalidInput(format!(
                "maxDepth must be between 1 and {}, got {}",
                MAX_PATH_DEPTH, max_depth
            )));
        }
        if self.result_cap == 0 {
            return Err(RelgraphError::InvalidInput(
                "result cap must be greater than 0".to_string(),
            ));
        }

        for endpoint in [source, target] {
            if self.resolver.get(&endpoint.resource_type, &endpoint.id)?.is_none() {
                return Err(RelgraphError::NotFound(endpoint.to_string()));
            }
        }

        let mut found = PathSet::default();
        let mut expanded: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<(NodeId, Vec<NodeId>)> = VecDeque::new();
        queue.push_back((source.clone(), vec![source.clone()]));

        while let Some((current, path)) = queue.pop_front() {
            if found.paths.len() >= self.result_cap {
                break;
            }
            if self.deadline.expired() {
                log::warn!(
                    "Path search {} -> {} hit its deadline with {} paths",
                    source,
                    target,
                    found.paths.len()
                );
                found.truncated = true;
                break;
            }

            let hops = path.len() - 1;
            if hops > max_depth {
                continue;
            }

            if current == *target {
                found.paths.push(Path::from_nodes(&path));
                continue;
            }

            if !expanded.insert(current.clone()) || hops == max_depth {
                continue;
            }

            for neighbor in self.neighbors(&current) {
                if path.contains(&neighbor) {
                    continue;
                }
                let mut next = path.clone();
                next.push(neighbor.clone());
                queue.push_back((neighbor, next));
            }
        }

        log::debug!(
            "Found {} paths {} -> {} (max depth {})",
            found.paths.len(),
            source,
            target,
            max_depth
        );
        Ok(found)
    }

    /// Existing forward targets then verified referrers, each listed once.
    fn neighbors(&self, current: &NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        if let Some(resource) = fetch(&self.resolver, current) {
            for field in self.schema.fields_for(&current.resource_type) {
                for resolved in resolve_field(&self.resolver, current, field, &resource) {
                    if seen.insert(resolved.target.clone()) {
                        out.push(resolved.target);
                    }
                }
            }
        }

        match self
            .index
            .find_referrers(&current.resource_type, &current.id, self.reverse_limit)
        {
            Ok(referrers) => {
                for referrer in referrers {
                    if seen.contains(&referrer.source) {
                        continue;
                    }
                    let Some(resource) = fetch(&self.resolver, &referrer.source) else {
                        log::debug!("Stale referrer {} of {}, skipping", referrer.source, current);
                        continue;
                    };
                    if !referrer_points_at(&self.resolver, self.schema, &referrer, &resource, current) {
                        continue;
                    }
                    seen.insert(referrer.source.clone());
                    out.push(referrer.source);
                }
            }
            Err(e) => log::debug!("Reverse lookup for {} failed: {}", current, e),
        }

        out
    }
}
