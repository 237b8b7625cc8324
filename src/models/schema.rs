//! Schema metadata models.
//!
//! A [`MetadataSnapshot`] is a point-in-time reflection of the tables visible
//! through the managed connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column information within a reflected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Declared type as reported by the database (may be empty on SQLite)
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            primary_key: false,
        }
    }

    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// None for SQLite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Names of the primary key columns, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Reflection of the database schema at `captured_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub tables: Vec<TableMetadata>,
    pub captured_at: DateTime<Utc>,
}

impl MetadataSnapshot {
    pub fn new(tables: Vec<TableMetadata>) -> Self {
        Self {
            tables,
            captured_at: Utc::now(),
        }
    }

    /// Look up a table by name, ignoring the schema.
    pub fn table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Group flat `(schema, table, column)` rows into tables, keeping row order.
///
/// Reflection queries return one row per column ordered by table; consecutive
/// rows with the same schema and table name belong to the same table.
pub fn group_columns(
    rows: impl IntoIterator<Item = (Option<String>, String, ColumnMetadata)>,
) -> Vec<TableMetadata> {
    let mut tables: Vec<TableMetadata> = Vec::new();
    for (schema, table, column) in rows {
        let same_table = tables
            .last()
            .is_some_and(|last| last.name == table && last.schema == schema);
        match tables.last_mut() {
            Some(last) if same_table => last.columns.push(column),
            _ => {
                let mut entry = TableMetadata::new(schema, table);
                entry.columns.push(column);
                tables.push(entry);
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_columns_keeps_order() {
        let rows = vec![
            (
                None,
                "orders".to_string(),
                ColumnMetadata::new("id", "INTEGER", false).with_primary_key(true),
            ),
            (None, "orders".to_string(), ColumnMetadata::new("total", "REAL", true)),
            (None, "users".to_string(), ColumnMetadata::new("name", "TEXT", true)),
        ];

        let tables = group_columns(rows);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "orders");
        assert_eq!(tables[0].columns.len(), 2);
        assert_eq!(tables[0].primary_key(), vec!["id"]);
        assert_eq!(tables[1].name, "users");
        assert!(tables[1].primary_key().is_empty());
    }

    #[test]
    fn test_group_columns_separates_schemas() {
        let rows = vec![
            (
                Some("public".to_string()),
                "items".to_string(),
                ColumnMetadata::new("id", "integer", false),
            ),
            (
                Some("archive".to_string()),
                "items".to_string(),
                ColumnMetadata::new("id", "integer", false),
            ),
        ];
        let tables = group_columns(rows);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].schema.as_deref(), Some("archive"));
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = MetadataSnapshot::new(group_columns(vec![(
            None,
            "users".to_string(),
            ColumnMetadata::new("email", "TEXT", false),
        )]));
        assert_eq!(snapshot.table_names(), vec!["users"]);
        let users = snapshot.table("users").unwrap();
        assert!(!users.column("email").unwrap().nullable);
        assert!(snapshot.table("missing").is_none());
    }

    #[test]
    fn test_schema_omitted_from_json_when_absent() {
        let table = TableMetadata::new(None, "t");
        let json = serde_json::to_value(&table).unwrap();
        assert!(json.get("schema").is_none());
        assert_eq!(json["name"], "t");
    }
}
