pub mod bundle;
pub mod walker;

pub use bundle::resources_from_document;
pub use walker::discover_files;

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::schema::RelationshipSchema;

/// Load one JSON file into the store, returning how many resources it held.
pub fn ingest_file(conn: &mut Connection, schema: &RelationshipSchema, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let document = serde_json::from_str(&content)?;
    let resources = resources_from_document(document)?;
    crate::store::put_resources(conn, schema, &resources)?;
    Ok(resources.len())
}
