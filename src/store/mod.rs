//! SQLite-backed resource store: the live `resources` table plus the
//! `resource_links` forward-link index that answers reverse lookups.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

use crate::graph::{
    field_references, parse_reference, NodeId, ParsedReference, Referrer, ResourceResolver,
    ReverseIndex,
};
use crate::schema::RelationshipSchema;
use crate::{RelgraphError, Result};

/// Read side of the store over one borrowed connection.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn sql_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

/// Link rows that forward resolution agrees with. A URN row holds only when
/// its target is live and no lower-ranked candidate for the same id is.
const RESOLVED_LINK: &str = "(l.urn_rank < 0 OR ( \
     EXISTS (SELECT 1 FROM resources t \
             WHERE t.resource_type = l.target_type AND t.resource_id = l.target_id AND t.deleted = 0) \
     AND NOT EXISTS (SELECT 1 FROM resource_links e \
             JOIN resources t ON t.resource_type = e.target_type AND t.resource_id = e.target_id AND t.deleted = 0 \
             WHERE e.source_type = l.source_type AND e.source_id = l.source_id \
               AND e.field_path = l.field_path AND e.target_id = l.target_id \
               AND e.urn_rank >= 0 AND e.urn_rank < l.urn_rank)))";

impl ResourceResolver for SqliteStore<'_> {
    fn get(&self, resource_type: &str, id: &str) -> Result<Option<Value>> {
        let content: Option<String> = self
            .conn
            .query_row(
                "SELECT content FROM resources \
                 WHERE resource_type = ?1 AND resource_id = ?2 AND deleted = 0",
                params![resource_type, id],
                |row| row.get(0),
            )
            .optional()?;

        match content {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

impl ReverseIndex for SqliteStore<'_> {
    fn find_referrers(&self, target_type: &str, target_id: &str, limit: usize) -> Result<Vec<Referrer>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT DISTINCT l.source_type, l.source_id, l.field_path \
             FROM resource_links l \
             JOIN resources r ON r.resource_type = l.source_type AND r.resource_id = l.source_id \
             WHERE l.target_type = ?1 AND l.target_id = ?2 AND r.deleted = 0 AND {} \
             ORDER BY l.source_type, l.source_id, l.field_path \
             LIMIT ?3",
            RESOLVED_LINK
        ))?;
        let rows = stmt.query_map(params![target_type, target_id, sql_limit(limit)], |row| {
            Ok(Referrer {
                source: NodeId::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                field_path: row.get(2)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn count_referrers(&self, target_type: &str, target_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM ( \
                     SELECT DISTINCT l.source_type, l.source_id, l.field_path \
                     FROM resource_links l \
                     JOIN resources r ON r.resource_type = l.source_type AND r.resource_id = l.source_id \
                     WHERE l.target_type = ?1 AND l.target_id = ?2 AND r.deleted = 0 AND {})",
                RESOLVED_LINK
            ),
            params![target_type, target_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// One row of the forward-link index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedLink {
    pub field: String,
    pub target: NodeId,
    /// Position in the field's candidate list for URN references.
    pub urn_rank: Option<usize>,
}

/// Links to index for a resource. URN references fan out to every candidate
/// type of their field, ranked in declared order.
pub fn extract_links(schema: &RelationshipSchema, resource_type: &str, resource: &Value) -> Vec<IndexedLink> {
    let mut links = Vec::new();
    for field in schema.fields_for(resource_type) {
        for reference in field_references(resource, &field.name) {
            match parse_reference(reference) {
                ParsedReference::Typed(target) => links.push(IndexedLink {
                    field: field.name.clone(),
                    target,
                    urn_rank: None,
                }),
                ParsedReference::Urn(id) => {
                    for (rank, candidate) in field.config.candidate_target_types.iter().enumerate() {
                        links.push(IndexedLink {
                            field: field.name.clone(),
                            target: NodeId::new(candidate.as_str(), id.as_str()),
                            urn_rank: Some(rank),
                        });
                    }
                }
                ParsedReference::Malformed => {
                    log::debug!("Not indexing malformed reference {:?} in {}.{}", reference, resource_type, field.name);
                }
            }
        }
    }
    links
}

fn resource_key(resource: &Value) -> Result<NodeId> {
    let resource_type = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RelgraphError::InvalidInput("resource has no resourceType".to_string()))?;
    let id = resource
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty() && !s.contains('/'))
        .ok_or_else(|| {
            RelgraphError::InvalidInput(format!("{} resource has no usable id", resource_type))
        })?;
    Ok(NodeId::new(resource_type, id))
}

fn write_resource(conn: &Connection, schema: &RelationshipSchema, resource: &Value) -> Result<NodeId> {
    let key = resource_key(resource)?;
    let content = serde_json::to_string(resource)?;

    conn.execute(
        "INSERT INTO resources (resource_type, resource_id, content, deleted, last_updated) \
         VALUES (?1, ?2, ?3, 0, ?4) \
         ON CONFLICT(resource_type, resource_id) DO UPDATE SET \
             content = excluded.content, deleted = 0, last_updated = excluded.last_updated",
        params![key.resource_type, key.id, content, Utc::now().to_rfc3339()],
    )?;

    conn.execute(
        "DELETE FROM resource_links WHERE source_type = ?1 AND source_id = ?2",
        params![key.resource_type, key.id],
    )?;

    let mut insert = conn.prepare_cached(
        "INSERT OR IGNORE INTO resource_links \
             (source_type, source_id, field_path, target_type, target_id, urn_rank) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for link in extract_links(schema, &key.resource_type, resource) {
        let rank = link.urn_rank.map_or(-1, |r| i64::try_from(r).unwrap_or(i64::MAX));
        insert.execute(params![
            key.resource_type,
            key.id,
            link.field,
            link.target.resource_type,
            link.target.id,
            rank
        ])?;
    }

    Ok(key)
}

/// Insert or replace a resource and rebuild its forward links.
pub fn put_resource(conn: &mut Connection, schema: &RelationshipSchema, resource: &Value) -> Result<NodeId> {
    let tx = conn.transaction()?;
    let key = write_resource(&tx, schema, resource)?;
    tx.commit()?;
    Ok(key)
}

/// Load a batch in one transaction. Any invalid resource aborts the batch.
pub fn put_resources(conn: &mut Connection, schema: &RelationshipSchema, resources: &[Value]) -> Result<Vec<NodeId>> {
    let tx = conn.transaction()?;
    let mut keys = Vec::with_capacity(resources.len());
    for resource in resources {
        keys.push(write_resource(&tx, schema, resource)?);
    }
    tx.commit()?;
    Ok(keys)
}

/// Soft delete. Links stay in the index; reverse lookups filter on `deleted`.
pub fn delete_resource(conn: &Connection, resource_type: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE resources SET deleted = 1, last_updated = ?3 \
         WHERE resource_type = ?1 AND resource_id = ?2 AND deleted = 0",
        params![resource_type, id, Utc::now().to_rfc3339()],
    )?;
    Ok(changed > 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    pub resource_type: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCount {
    pub source_type: String,
    pub field: String,
    pub target_type: String,
    pub count: u64,
}

/// Aggregate counts over live resources and their indexed links.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatistics {
    pub total_resources: u64,
    pub total_links: u64,
    pub resources: Vec<TypeCount>,
    pub links: Vec<LinkCount>,
}

pub fn link_statistics(conn: &Connection) -> Result<LinkStatistics> {
    let mut stmt = conn.prepare(
        "SELECT resource_type, COUNT(*) FROM resources WHERE deleted = 0 \
         GROUP BY resource_type ORDER BY COUNT(*) DESC, resource_type",
    )?;
    let resources = stmt
        .query_map([], |row| {
            Ok(TypeCount {
                resource_type: row.get(0)?,
                count: sql_count(row.get(1)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT l.source_type, l.field_path, l.target_type, COUNT(*) \
         FROM resource_links l \
         JOIN resources r ON r.resource_type = l.source_type AND r.resource_id = l.source_id \
         WHERE r.deleted = 0 AND {} \
         GROUP BY l.source_type, l.field_path, l.target_type \
         ORDER BY COUNT(*) DESC, l.source_type, l.field_path, l.target_type",
        RESOLVED_LINK
    ))?;
    let links = stmt
        .query_map([], |row| {
            Ok(LinkCount {
                source_type: row.get(0)?,
                field: row.get(1)?,
                target_type: row.get(2)?,
                count: sql_count(row.get(3)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(LinkStatistics {
        total_resources: resources.iter().map(|r| r.count).sum(),
        total_links: links.iter().map(|l| l.count).sum(),
        resources,
        links,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::migrate;
    use crate::graph::{GraphBuilder, PathFinder, DEFAULT_REVERSE_LIMIT};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    pub(crate) fn migrated_conn(dir: &TempDir) -> Connection {
        let mut conn = Connection::open(dir.path().join("test.db")).unwrap();
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        migrate::run_migrations(&mut conn, &migrations_dir).unwrap();
        conn
    }

    fn schema() -> RelationshipSchema {
        RelationshipSchema::builtin().unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();

        let key = put_resource(&mut conn, &schema, &json!({"resourceType": "Patient", "id": "P1", "gender": "female"})).unwrap();
        assert_eq!(key, NodeId::new("Patient", "P1"));

        let store = SqliteStore::new(&conn);
        let found = store.get("Patient", "P1").unwrap().unwrap();
        assert_eq!(found["gender"], "female");
        assert!(store.get("Patient", "P2").unwrap().is_none());
        assert!(store.get("Encounter", "P1").unwrap().is_none());
    }

    #[test]
    fn test_rejects_resource_without_key() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();
        assert!(matches!(
            put_resource(&mut conn, &schema, &json!({"id": "x"})),
            Err(RelgraphError::InvalidInput(_))
        ));
        assert!(matches!(
            put_resource(&mut conn, &schema, &json!({"resourceType": "Patient", "id": "a/b"})),
            Err(RelgraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_referrers_and_soft_delete() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();
        put_resources(
            &mut conn,
            &schema,
            &[
                json!({"resourceType": "Patient", "id": "P1"}),
                json!({"resourceType": "Encounter", "id": "E1", "subject": {"reference": "Patient/P1"}}),
                json!({"resourceType": "Encounter", "id": "E2", "subject": {"reference": "Patient/P1"}}),
                json!({"resourceType": "Condition", "id": "C1", "subject": {"reference": "Patient/P1"}}),
            ],
        )
        .unwrap();

        {
            let store = SqliteStore::new(&conn);
            let referrers = store.find_referrers("Patient", "P1", 10).unwrap();
            let sources: Vec<_> = referrers.iter().map(|r| r.source.to_string()).collect();
            assert_eq!(sources, vec!["Condition/C1", "Encounter/E1", "Encounter/E2"]);
            assert!(referrers.iter().all(|r| r.field_path == "subject"));
            assert_eq!(store.find_referrers("Patient", "P1", 2).unwrap().len(), 2);
            assert_eq!(store.count_referrers("Patient", "P1").unwrap(), 3);
        }

        assert!(delete_resource(&conn, "Encounter", "E1").unwrap());
        assert!(!delete_resource(&conn, "Encounter", "E1").unwrap());

        let store = SqliteStore::new(&conn);
        assert!(store.get("Encounter", "E1").unwrap().is_none());
        assert_eq!(store.count_referrers("Patient", "P1").unwrap(), 2);
    }

    #[test]
    fn test_reput_replaces_links() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();
        put_resource(&mut conn, &schema, &json!({"resourceType": "Encounter", "id": "E1", "subject": {"reference": "Patient/P1"}})).unwrap();
        put_resource(&mut conn, &schema, &json!({"resourceType": "Encounter", "id": "E1", "subject": {"reference": "Patient/P2"}})).unwrap();

        let store = SqliteStore::new(&conn);
        assert_eq!(store.count_referrers("Patient", "P1").unwrap(), 0);
        assert_eq!(store.count_referrers("Patient", "P2").unwrap(), 1);
    }

    #[test]
    fn test_urn_indexed_per_candidate() {
        let schema = schema();
        let links = extract_links(
            &schema,
            "Observation",
            &json!({"resourceType": "Observation", "id": "O1", "subject": {"reference": "urn:uuid:X"}, "encounter": {"reference": "bad"}}),
        );
        let targets: Vec<_> = links.iter().map(|l| l.target.to_string()).collect();
        assert_eq!(targets, vec!["Patient/X", "Group/X", "Device/X", "Location/X"]);
        let ranks: Vec<_> = links.iter().map(|l| l.urn_rank).collect();
        assert_eq!(ranks, vec![Some(0), Some(1), Some(2), Some(3)]);
        assert!(links.iter().all(|l| l.field == "subject"));
    }

    #[test]
    fn test_urn_referrer_only_for_resolved_candidate() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();
        put_resources(
            &mut conn,
            &schema,
            &[
                json!({"resourceType": "Patient", "id": "X"}),
                json!({"resourceType": "Device", "id": "X"}),
                json!({"resourceType": "Observation", "id": "O1", "subject": {"reference": "urn:uuid:X"}}),
            ],
        )
        .unwrap();

        {
            let store = SqliteStore::new(&conn);
            assert_eq!(store.count_referrers("Patient", "X").unwrap(), 1);
            assert_eq!(store.count_referrers("Device", "X").unwrap(), 0);
            assert!(store.find_referrers("Device", "X", 10).unwrap().is_empty());

            let graph = GraphBuilder::new(&schema, &store, &store)
                .discover("Device", "X", 1, true)
                .unwrap();
            assert_eq!(graph.nodes.len(), 1);
            assert!(graph.edges.is_empty());

            let stats = link_statistics(&conn).unwrap();
            assert_eq!(stats.total_links, 1);
            assert_eq!(stats.links[0].target_type, "Patient");
        }

        // Once the Patient is gone the URN falls through to the Device.
        assert!(delete_resource(&conn, "Patient", "X").unwrap());
        let store = SqliteStore::new(&conn);
        assert_eq!(store.count_referrers("Device", "X").unwrap(), 1);
        let graph = GraphBuilder::new(&schema, &store, &store)
            .discover("Device", "X", 1, true)
            .unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, NodeId::new("Observation", "O1"));
    }

    #[test]
    fn test_nested_participant_references_are_indexed() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();
        put_resources(
            &mut conn,
            &schema,
            &[
                json!({"resourceType": "Practitioner", "id": "Pr1"}),
                json!({
                    "resourceType": "Encounter", "id": "E1",
                    "participant": [{"individual": {"reference": "Practitioner/Pr1"}}]
                }),
            ],
        )
        .unwrap();

        let store = SqliteStore::new(&conn);
        let referrers = store.find_referrers("Practitioner", "Pr1", 10).unwrap();
        assert_eq!(referrers.len(), 1);
        assert_eq!(referrers[0].field_path, "participant.individual");

        let graph = GraphBuilder::new(&schema, &store, &store)
            .discover("Practitioner", "Pr1", 1, true)
            .unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].field, "participant.individual");
    }

    #[test]
    fn test_link_statistics() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();
        put_resources(
            &mut conn,
            &schema,
            &[
                json!({"resourceType": "Patient", "id": "P1"}),
                json!({"resourceType": "Encounter", "id": "E1", "subject": {"reference": "Patient/P1"}}),
                json!({"resourceType": "Encounter", "id": "E2", "subject": {"reference": "Patient/P1"}}),
            ],
        )
        .unwrap();

        let stats = link_statistics(&conn).unwrap();
        assert_eq!(stats.total_resources, 3);
        assert_eq!(stats.total_links, 2);
        assert_eq!(stats.resources[0], TypeCount { resource_type: "Encounter".into(), count: 2 });
        assert_eq!(
            stats.links,
            vec![LinkCount {
                source_type: "Encounter".into(),
                field: "subject".into(),
                target_type: "Patient".into(),
                count: 2
            }]
        );
    }

    #[test]
    fn test_discovery_over_sqlite_caps_reverse_fan_out() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();
        let mut batch = vec![json!({"resourceType": "Organization", "id": "Org1", "name": "General"})];
        for i in 0..250 {
            batch.push(json!({
                "resourceType": "Patient", "id": format!("P{i:03}"),
                "managingOrganization": {"reference": "Organization/Org1"}
            }));
        }
        put_resources(&mut conn, &schema, &batch).unwrap();

        let store = SqliteStore::new(&conn);
        let graph = GraphBuilder::new(&schema, &store, &store)
            .discover("Organization", "Org1", 1, true)
            .unwrap();
        assert_eq!(graph.nodes[0].display_label, "General");
        assert_eq!(graph.nodes.len(), 1 + DEFAULT_REVERSE_LIMIT);
        assert_eq!(store.count_referrers("Organization", "Org1").unwrap(), 250);
    }

    #[test]
    fn test_paths_over_sqlite() {
        let dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&dir);
        let schema = schema();
        put_resources(
            &mut conn,
            &schema,
            &[
                json!({"resourceType": "Patient", "id": "P1"}),
                json!({"resourceType": "Encounter", "id": "E1", "subject": {"reference": "Patient/P1"}}),
            ],
        )
        .unwrap();

        let store = SqliteStore::new(&conn);
        let found = PathFinder::new(&schema, &store, &store)
            .find_paths(&NodeId::new("Encounter", "E1"), &NodeId::new("Patient", "P1"), 2)
            .unwrap();
        assert_eq!(found.paths.len(), 1);
        assert_eq!(found.paths[0].len(), 1);
    }
}
