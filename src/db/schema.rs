//! Schema reflection.
//!
//! Reads table and column metadata for the connected database through the
//! managed connection and folds it into a [`MetadataSnapshot`].
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with one constant per
//! database type. Each query returns one row per column, ordered by table and
//! ordinal position.

use crate::db::sqlx_driver::DbConnection;
use crate::error::{DriverError, classify_sqlx_error};
use crate::models::schema::group_columns;
use crate::models::{ColumnMetadata, MetadataSnapshot};
use sqlx::{Executor, Row};
use tracing::debug;

type ColumnRow = (Option<String>, String, ColumnMetadata);

/// Reflect every user table visible through the connection.
pub async fn reflect(conn: &mut DbConnection) -> Result<MetadataSnapshot, DriverError> {
    let db_type = conn.db_type();
    let columns = match conn {
        DbConnection::Postgres(c) => postgres::fetch_columns(&mut **c).await,
        DbConnection::MySql(c) => mysql::fetch_columns(&mut **c).await,
        DbConnection::SQLite(c) => sqlite::fetch_columns(&mut **c).await,
    }
    .map_err(|e| classify_sqlx_error(e, db_type))?;

    debug!(db_type = %db_type, columns = columns.len(), "Fetched column metadata");
    Ok(MetadataSnapshot::new(group_columns(columns)))
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub const POSTGRES_COLUMNS: &str = r#"
        SELECT
            c.table_schema::text AS table_schema,
            c.table_name::text AS table_name,
            c.column_name::text AS column_name,
            c.data_type::text AS data_type,
            (c.is_nullable = 'YES') AS nullable,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                    AND tc.table_name = kcu.table_name
                WHERE tc.constraint_type = 'PRIMARY KEY'
                AND kcu.table_schema = c.table_schema
                AND kcu.table_name = c.table_name
                AND kcu.column_name = c.column_name
            ) AS is_primary_key
        FROM information_schema.columns c
        JOIN information_schema.tables t
            ON t.table_schema = c.table_schema AND t.table_name = c.table_name
        WHERE t.table_type = 'BASE TABLE'
        AND c.table_schema NOT IN ('pg_catalog', 'information_schema')
        ORDER BY c.table_schema, c.table_name, c.ordinal_position
        "#;

    pub const MYSQL_COLUMNS: &str = r#"
        SELECT
            CONVERT(c.TABLE_SCHEMA USING utf8mb4) AS table_schema,
            CONVERT(c.TABLE_NAME USING utf8mb4) AS table_name,
            CONVERT(c.COLUMN_NAME USING utf8mb4) AS column_name,
            CONVERT(c.COLUMN_TYPE USING utf8mb4) AS data_type,
            CAST(c.IS_NULLABLE = 'YES' AS SIGNED) AS nullable,
            CAST(c.COLUMN_KEY = 'PRI' AS SIGNED) AS is_primary_key
        FROM information_schema.COLUMNS c
        JOIN information_schema.TABLES t
            ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
        WHERE t.TABLE_TYPE = 'BASE TABLE'
        AND c.TABLE_SCHEMA = DATABASE()
        ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION
        "#;

    pub const SQLITE_COLUMNS: &str = r#"
        SELECT
            m.name AS table_name,
            p.name AS column_name,
            p.type AS data_type,
            p."notnull" AS not_null,
            p.pk AS pk
        FROM sqlite_master m
        JOIN pragma_table_info(m.name) p
        WHERE m.type = 'table'
        AND m.name NOT LIKE 'sqlite_%'
        ORDER BY m.name, p.cid
        "#;
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::PgConnection;

    pub async fn fetch_columns(conn: &mut PgConnection) -> Result<Vec<ColumnRow>, sqlx::Error> {
        let rows = conn.fetch_all(queries::POSTGRES_COLUMNS).await?;
        rows.iter()
            .map(|row| -> Result<ColumnRow, sqlx::Error> {
                let schema: String = row.try_get("table_schema")?;
                let table: String = row.try_get("table_name")?;
                let column = ColumnMetadata::new(
                    row.try_get::<String, _>("column_name")?,
                    row.try_get::<String, _>("data_type")?,
                    row.try_get::<bool, _>("nullable")?,
                )
                .with_primary_key(row.try_get("is_primary_key")?);
                Ok((Some(schema), table, column))
            })
            .collect()
    }
}

mod mysql {
    use super::*;
    use sqlx::MySqlConnection;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_columns(conn: &mut MySqlConnection) -> Result<Vec<ColumnRow>, sqlx::Error> {
        let rows = conn.fetch_all(queries::MYSQL_COLUMNS).await?;
        rows.iter()
            .map(|row| -> Result<ColumnRow, sqlx::Error> {
                let schema = get_string(row, "table_schema");
                let table = get_string(row, "table_name");
                let column = ColumnMetadata::new(
                    get_string(row, "column_name"),
                    get_string(row, "data_type"),
                    row.try_get::<i64, _>("nullable")? != 0,
                )
                .with_primary_key(row.try_get::<i64, _>("is_primary_key")? != 0);
                Ok((Some(schema), table, column))
            })
            .collect()
    }

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqliteConnection;

    pub async fn fetch_columns(conn: &mut SqliteConnection) -> Result<Vec<ColumnRow>, sqlx::Error> {
        let rows = conn.fetch_all(queries::SQLITE_COLUMNS).await?;
        rows.iter()
            .map(|row| -> Result<ColumnRow, sqlx::Error> {
                let table: String = row.try_get("table_name")?;
                let not_null: i64 = row.try_get("not_null")?;
                let pk: i64 = row.try_get("pk")?;
                let column = ColumnMetadata::new(
                    row.try_get::<String, _>("column_name")?,
                    // columns declared without a type report an empty string
                    row.try_get::<Option<String>, _>("data_type")?
                        .unwrap_or_default(),
                    not_null == 0,
                )
                .with_primary_key(pk > 0);
                Ok((None, table, column))
            })
            .collect()
    }
}
