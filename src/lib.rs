pub mod config;
pub mod error;
pub mod db;
pub mod schema;
pub mod graph;
pub mod cache;
pub mod store;
pub mod ingest;
pub mod api;

pub use config::Config;
pub use error::{RelgraphError, Result};
pub use graph::{Graph, GraphBuilder, NodeId, PathFinder, PathSet};
pub use schema::RelationshipSchema;
