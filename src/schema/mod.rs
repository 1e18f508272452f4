//! Relationship schema: which fields on which resource types reference which
//! other resource types.
//!
//! Loaded once at startup (built-in catalog or a JSON file) and shared read-only.
//! Field order from the source document is preserved and drives edge order.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{RelgraphError, Result};

const DEFAULT_SCHEMA: &str = include_str!("default_schema.json");

/// Declared multiplicity of a reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "one-to-one",
            Cardinality::ManyToOne => "many-to-one",
            Cardinality::OneToMany => "one-to-many",
            Cardinality::ManyToMany => "many-to-many",
        }
    }
}

/// Configuration of one reference field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Types the field may point at, in probe order for URN references.
    #[serde(rename = "target")]
    pub candidate_target_types: Vec<String>,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
}

/// A named reference field of a resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceField {
    pub name: String,
    pub config: FieldConfig,
}

/// Immutable catalog of reference fields per resource type.
#[derive(Debug, Clone, Default)]
pub struct RelationshipSchema {
    fields: HashMap<String, Vec<ReferenceField>>,
    type_order: Vec<String>,
}

impl RelationshipSchema {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(DEFAULT_SCHEMA)
    }

    /// Load a schema file in `{Type: {field: {target: [...], type: ...}}}` form.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw).map_err(|e| {
            RelgraphError::Schema(format!("{}: {}", path.display(), e))
        })
    }

    /// Load from `path` when given, otherwise fall back to the built-in catalog.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(types) = value else {
            return Err(RelgraphError::Schema(
                "schema root must be an object keyed by resource type".to_string(),
            ));
        };

        let mut schema = RelationshipSchema::default();
        for (resource_type, fields) in types {
            let Value::Object(fields) = fields else {
                return Err(RelgraphError::Schema(format!(
                    "fields of {} must be an object",
                    resource_type
                )));
            };

            let mut parsed = Vec::with_capacity(fields.len());
            for (name, config) in fields {
                let config: FieldConfig = serde_json::from_value(config).map_err(|e| {
                    RelgraphError::Schema(format!("{}.{}: {}", resource_type, name, e))
                })?;
                parsed.push(ReferenceField { name, config });
            }

            schema.type_order.push(resource_type.clone());
            schema.fields.insert(resource_type, parsed);
        }

        Ok(schema)
    }

    /// Reference fields declared for a type, in declaration order.
    /// Unknown types have none.
    pub fn fields_for(&self, resource_type: &str) -> &[ReferenceField] {
        self.fields
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn field(&self, resource_type: &str, field: &str) -> Option<&FieldConfig> {
        self.fields_for(resource_type)
            .iter()
            .find(|f| f.name == field)
            .map(|f| &f.config)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.type_order.iter().map(String::as_str)
    }

    /// Serialize back to the configuration format.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for resource_type in &self.type_order {
            let mut fields = Map::new();
            for field in self.fields_for(resource_type) {
                fields.insert(
                    field.name.clone(),
                    serde_json::to_value(&field.config).unwrap_or(Value::Null),
                );
            }
            root.insert(resource_type.clone(), Value::Object(fields));
        }
        Value::Object(root)
    }
}
