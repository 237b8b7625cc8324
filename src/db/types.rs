//! Row decoding: sqlx rows to JSON maps.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's type name into a logical category
//! 2. Database-specific decoders extract the value
//!
//! Statements run through the driver as plain text (no bind parameters), so
//! PostgreSQL and MySQL return values in their text encoding. That lets the
//! [`RawText`] wrapper read any column verbatim, which is how decimals, UUIDs,
//! dates and JSON are carried over without precision loss.
//!
//! SQLite expression columns (`SELECT 1 AS x`) have no declared type; for
//! those the runtime type of the value is used instead.

use crate::db::DatabaseType;
use crate::models::Row as JsonRow;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // checked first: "numeric" would otherwise fall through to float
    if lower.contains("decimal") || lower.contains("numeric") {
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower == "text" || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Type name used to decode a column: the declared type, or the runtime type
/// of the value when the column has none.
fn effective_type_name<R>(row: &R, idx: usize) -> Option<String>
where
    R: Row,
    usize: ColumnIndex<R>,
{
    let declared = row.column(idx).type_info();
    if !declared.is_null() {
        return Some(declared.name().to_string());
    }
    let value = row.try_get_raw(idx).ok()?;
    if value.is_null() {
        return None;
    }
    Some(value.type_info().name().to_string())
}

fn is_null_value<R>(row: &R, idx: usize) -> bool
where
    R: Row,
    usize: ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true)
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn json_or_string(text: String) -> JsonValue {
    serde_json::from_str::<JsonValue>(&text).unwrap_or(JsonValue::String(text))
}

// =============================================================================
// Raw Text Support
// =============================================================================

/// Any column value read verbatim from its text encoding.
#[derive(Debug)]
pub struct RawText(pub String);

impl Type<sqlx::MySql> for RawText {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(_ty: &MySqlTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawText {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawText(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawText {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawText(s.to_string()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Binary values become UTF-8 text when they decode cleanly, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow;
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decoder:path) => {
        impl RowToJson for $row {
            fn to_json_map(&self) -> JsonRow {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let value = if is_null_value(self, idx) {
                            JsonValue::Null
                        } else {
                            let category = effective_type_name(self, idx)
                                .map(|name| categorize_type(&name, $db))
                                .unwrap_or(TypeCategory::Unknown);
                            $decoder(self, idx, category)
                        };
                        (col.name().to_string(), value)
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, mysql::decode_column);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, postgres::decode_column);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<bool, _>(idx)
                .map(JsonValue::Bool)
                .unwrap_or_else(|_| decode_integer(row, idx)),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| decode_binary_value(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => decode_raw(row, idx).map_or(JsonValue::Null, json_or_string),
            _ => decode_raw(row, idx).map_or(JsonValue::Null, JsonValue::String),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return JsonValue::Number(v.into());
        }
        decode_raw(row, idx).map_or(JsonValue::Null, JsonValue::String)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return float_value(v);
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return float_value(v as f64);
        }
        decode_raw(row, idx).map_or(JsonValue::Null, JsonValue::String)
    }

    fn decode_raw(row: &MySqlRow, idx: usize) -> Option<String> {
        match row.try_get::<RawText, _>(idx) {
            Ok(v) => Some(v.0),
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to decode MySQL value");
                None
            }
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<bool, _>(idx)
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => row
                .try_get::<f64, _>(idx)
                .map(float_value)
                .or_else(|_| row.try_get::<f32, _>(idx).map(|v| float_value(v as f64)))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| decode_binary_value(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => decode_raw(row, idx).map_or(JsonValue::Null, json_or_string),
            _ => decode_raw(row, idx).map_or(JsonValue::Null, JsonValue::String),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return JsonValue::Number(v.into());
        }
        decode_raw(row, idx).map_or(JsonValue::Null, JsonValue::String)
    }

    fn decode_raw(row: &PgRow, idx: usize) -> Option<String> {
        match row.try_get::<RawText, _>(idx) {
            Ok(v) => Some(v.0),
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to decode PostgreSQL value");
                None
            }
        }
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx).unwrap_or_else(|| fallback(row, idx)),
            TypeCategory::Boolean => row
                .try_get::<bool, _>(idx)
                .map(JsonValue::Bool)
                .unwrap_or_else(|_| fallback(row, idx)),
            TypeCategory::Float | TypeCategory::Decimal => {
                decode_float(row, idx).unwrap_or_else(|| fallback(row, idx))
            }
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| decode_binary_value(&v))
                .unwrap_or_else(|_| fallback(row, idx)),
            _ => fallback(row, idx),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<i64, _>(idx)
            .ok()
            .map(|v| JsonValue::Number(v.into()))
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<f64, _>(idx).ok().map(float_value)
    }

    /// SQLite is dynamically typed: a column's declared type says little
    /// about what a given value holds, so try each storage class in turn.
    fn fallback(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return JsonValue::String(v);
        }
        if let Some(v) = decode_integer(row, idx) {
            return v;
        }
        if let Some(v) = decode_float(row, idx) {
            return v;
        }
        row.try_get::<Vec<u8>, _>(idx)
            .map(|v| decode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }
}
