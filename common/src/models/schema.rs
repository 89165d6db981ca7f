//! Introspection models.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One column as reported by the backend's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ColumnInfo {
    pub name: String,

    /// Backend-native type name; not unified across backends.
    #[serde(rename = "type")]
    pub data_type: String,

    /// Declared length (DB2 only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub length: Option<i64>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            length: None,
        }
    }

    pub fn with_length(mut self, length: Option<i64>) -> Self {
        self.length = length;
        self
    }

    /// The same column without its length, as `/listschema` reports it.
    pub fn without_length(&self) -> Self {
        Self {
            length: None,
            ..self.clone()
        }
    }
}

/// Ordered map of `"database:schema"` → table name → columns.
///
/// Serializes as a plain JSON object with insertion order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(value_type = Object)]
pub struct SchemaMapping(pub IndexMap<String, IndexMap<String, Vec<ColumnInfo>>>);

impl SchemaMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key under which a schema is reported.
    pub fn qualified_name(database: &str, schema: &str) -> String {
        format!("{}:{}", database, schema)
    }

    pub fn insert(
        &mut self,
        database: &str,
        schema: &str,
        tables: IndexMap<String, Vec<ColumnInfo>>,
    ) {
        self.0.insert(Self::qualified_name(database, schema), tables);
    }

    pub fn get(&self, database: &str, schema: &str) -> Option<&IndexMap<String, Vec<ColumnInfo>>> {
        self.0.get(&Self::qualified_name(database, schema))
    }

    /// Qualified names in order.
    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Bounded table preview.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PreviewResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// A table and its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Full metadata for the DB2 database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatabaseMetadata {
    /// Name reported by `CURRENT SERVER`.
    pub database: String,
    pub tables: Vec<TableMetadata>,
}
