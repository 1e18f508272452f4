//! In-memory resolver and reverse index for engine tests.

use std::cell::Cell;
use std::collections::HashSet;

use serde_json::Value;

use super::reference::{parse_reference, reference_strings, ParsedReference};
use super::{NodeId, Referrer, ResourceResolver, ReverseIndex};
use crate::{RelgraphError, Result};

#[derive(Default)]
pub(crate) struct MemoryStore {
    resources: Vec<(NodeId, Value)>,
    /// Extra index rows, e.g. stale entries for resources that no longer exist.
    extra_referrers: Vec<(NodeId, Referrer)>,
    failing_gets: HashSet<NodeId>,
    failing_index: bool,
    gets: Cell<usize>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, resource: Value) -> Self {
        let key = NodeId::new(
            resource["resourceType"].as_str().unwrap_or_default(),
            resource["id"].as_str().unwrap_or_default(),
        );
        self.resources.push((key, resource));
        self
    }

    pub(crate) fn with_stale_referrer(mut self, target: NodeId, source: NodeId, field: &str) -> Self {
        self.extra_referrers.push((
            target,
            Referrer {
                source,
                field_path: field.to_string(),
            },
        ));
        self
    }

    pub(crate) fn failing_get(mut self, resource_type: &str, id: &str) -> Self {
        self.failing_gets.insert(NodeId::new(resource_type, id));
        self
    }

    pub(crate) fn failing_index(mut self) -> Self {
        self.failing_index = true;
        self
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.gets.get()
    }
}

impl ResourceResolver for MemoryStore {
    fn get(&self, resource_type: &str, id: &str) -> Result<Option<Value>> {
        self.gets.set(self.gets.get() + 1);
        let key = NodeId::new(resource_type, id);
        if self.failing_gets.contains(&key) {
            return Err(RelgraphError::InvalidInput(format!("injected failure for {}", key)));
        }
        Ok(self
            .resources
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone()))
    }
}

impl ReverseIndex for MemoryStore {
    fn find_referrers(&self, target_type: &str, target_id: &str, limit: usize) -> Result<Vec<Referrer>> {
        if self.failing_index {
            return Err(RelgraphError::InvalidInput("index offline".to_string()));
        }
        let target = NodeId::new(target_type, target_id);
        let mut out = Vec::new();
        for (source, resource) in &self.resources {
            let Some(fields) = resource.as_object() else {
                continue;
            };
            for (field, value) in fields {
                // URNs match any target type, like an index that fans them out
                // to every candidate.
                let points_here = reference_strings(value).into_iter().any(|r| match parse_reference(r) {
                    ParsedReference::Typed(t) => t == target,
                    ParsedReference::Urn(id) => id == target.id,
                    ParsedReference::Malformed => false,
                });
                if points_here {
                    out.push(Referrer {
                        source: source.clone(),
                        field_path: field.clone(),
                    });
                }
            }
        }
        for (t, referrer) in &self.extra_referrers {
            if *t == target {
                out.push(referrer.clone());
            }
        }
        out.truncate(limit);
        Ok(out)
    }
}
