//! Data models for the resilient SQL core.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod schema;
pub mod statement;

pub use connection::{
    ConnectionConfig, ConnectionConfigError, DEFAULT_ACQUIRE_TIMEOUT_SECS, DatabaseType,
};
pub use schema::{ColumnMetadata, MetadataSnapshot, TableMetadata};
pub use statement::{Statement, StatementSource};

/// One result row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Ordered rows produced by one successful execution.
pub type ResultSet = Vec<Row>;
