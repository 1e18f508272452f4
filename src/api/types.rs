use serde::{Deserialize, Serialize};

use crate::graph::{Edge, Graph, Node, NodeId, Path, PathSet};

/// `GET /relationships/discover/{type}/{id}` query string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverQuery {
    pub depth: Option<usize>,
    #[serde(default)]
    pub include_counts: bool,
    pub include_reverse: Option<bool>,
}

/// `GET /relationships/paths` query string
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsQuery {
    pub source: String,
    pub target: String,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    #[serde(flatten)]
    pub node: Node,
    /// Uncapped number of live referrers, only with `includeCounts=true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub source: NodeId,
    pub nodes: Vec<NodeView>,
    pub links: Vec<Edge>,
    pub truncated: bool,
}

impl DiscoverResponse {
    pub fn new(source: NodeId, graph: Graph, counts: Option<Vec<Option<usize>>>) -> Self {
        let counts = counts.unwrap_or_default();
        let nodes = graph
            .nodes
            .into_iter()
            .enumerate()
            .map(|(i, node)| NodeView {
                node,
                reference_count: counts.get(i).copied().flatten(),
            })
            .collect();
        Self {
            source,
            nodes,
            links: graph.edges,
            truncated: graph.truncated,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsResponse {
    pub source: NodeId,
    pub target: NodeId,
    pub paths: Vec<Path>,
    pub path_count: usize,
    pub truncated: bool,
}

impl PathsResponse {
    pub fn new(source: NodeId, target: NodeId, found: PathSet) -> Self {
        Self {
            source,
            target,
            path_count: found.paths.len(),
            paths: found.paths,
            truncated: found.truncated,
        }
    }
}
