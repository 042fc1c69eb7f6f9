//! Column value decoding.
//!
//! Statements are sent unprepared, so both engines answer in their text protocol.
//! Decoding is two-phase:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Engine-specific decoders extract the value as JSON
//!
//! MySQL rows are exposed column-keyed (`KeyedRow`); PostgreSQL rows are exposed
//! positionally together with their column descriptor (`PositionalRow`). Both paths
//! share the categorisation so equal values come out as equal JSON.

use crate::models::{Engine, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::{Column, Decode, Row as _, Type, TypeInfo};

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
    Binary,
    Json,
    Date,
    Time,
    DateTime,
    Timestamp,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, engine: Engine) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    // Interval types would otherwise match "int"
    if lower.contains("interval") || lower == "point" {
        return TypeCategory::Text;
    }

    if lower.contains("int") || lower.contains("serial") || lower == "year" {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
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

    match (lower.as_str(), engine) {
        ("date", _) => TypeCategory::Date,
        ("time", _) => TypeCategory::Time,
        ("datetime", Engine::MySql) | ("timestamp", Engine::Postgres) => TypeCategory::DateTime,
        ("timestamp", Engine::MySql) | ("timestamptz", Engine::Postgres) => {
            TypeCategory::Timestamp
        }
        // varchar, text, char, uuid, enum, inet, arrays, ... keep the server's text
        _ => TypeCategory::Text,
    }
}

// =============================================================================
// Raw Text Support
// =============================================================================

/// The server's textual representation of a value, whatever its type.
///
/// Used for DECIMAL/NUMERIC (to preserve exact digits) and as the fallback for
/// every type without a dedicated JSON mapping.
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
// Shared Value Encoding
// =============================================================================

/// Binary data as UTF-8 text when valid, base64 otherwise.
pub fn binary_to_json(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

/// Finite floats become numbers; NaN and infinities become strings.
pub fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

pub fn datetime_to_json(v: NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

pub fn timestamp_to_json(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn text_or_null(v: Option<RawText>) -> JsonValue {
    v.map(|t| JsonValue::String(t.0)).unwrap_or(JsonValue::Null)
}

// =============================================================================
// Row Shapes
// =============================================================================

/// Rows whose driver exposes values by column name.
pub trait KeyedRow {
    fn to_keyed(&self) -> Row;
}

/// Rows whose driver exposes values by position plus a column descriptor.
pub trait PositionalRow {
    /// Column names, in result order.
    fn descriptor(&self) -> Vec<String>;
    /// Values, in result order.
    fn to_positional(&self) -> Vec<JsonValue>;
}

impl KeyedRow for MySqlRow {
    fn to_keyed(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let category = categorize_type(col.type_info().name(), Engine::MySql);
                let value = mysql::decode_column(self, col.ordinal(), category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl PositionalRow for PgRow {
    fn descriptor(&self) -> Vec<String> {
        self.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect()
    }

    fn to_positional(&self) -> Vec<JsonValue> {
        (0..self.len())
            .map(|idx| {
                let category = categorize_type(self.column(idx).type_info().name(), Engine::Postgres);
                postgres::decode_column(self, idx, category)
            })
            .collect()
    }
}

// =============================================================================
// Engine-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::Row as _;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Date => decode_date(row, idx),
            TypeCategory::Time => decode_time(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            TypeCategory::Timestamp => decode_timestamp(row, idx),
            TypeCategory::Decimal | TypeCategory::Text => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // BIGINT UNSIGNED
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        decode_text(row, idx)
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<bool>, _>(idx) {
            Ok(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(float_to_json).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| float_to_json(f as f64)).unwrap_or(JsonValue::Null);
        }
        decode_text(row, idx)
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| binary_to_json(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<JsonValue>, _>(idx) {
            Ok(v) => v.unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_date(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<NaiveDate>, _>(idx) {
            Ok(v) => v
                .map(|d| JsonValue::String(d.to_string()))
                .unwrap_or(JsonValue::Null),
            // Zero dates ('0000-00-00') do not fit chrono
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_time(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<NaiveTime>, _>(idx) {
            Ok(v) => v
                .map(|t| JsonValue::String(t.to_string()))
                .unwrap_or(JsonValue::Null),
            // TIME values outside 00:00..24:00 are durations
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_datetime(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<NaiveDateTime>, _>(idx) {
            Ok(v) => v.map(datetime_to_json).unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            Ok(v) => v.map(timestamp_to_json).unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawText>, _>(idx) {
            Ok(v) => text_or_null(v),
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to decode MySQL column");
                JsonValue::Null
            }
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::Row as _;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Date => decode_date(row, idx),
            TypeCategory::Time => decode_time(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            TypeCategory::Timestamp => decode_timestamp(row, idx),
            TypeCategory::Decimal | TypeCategory::Text => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        decode_text(row, idx)
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<bool>, _>(idx) {
            Ok(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(float_to_json).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| float_to_json(f as f64)).unwrap_or(JsonValue::Null);
        }
        decode_text(row, idx)
    }

    fn decode_binary(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| binary_to_json(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<JsonValue>, _>(idx) {
            Ok(v) => v.unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_date(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<NaiveDate>, _>(idx) {
            Ok(v) => v
                .map(|d| JsonValue::String(d.to_string()))
                .unwrap_or(JsonValue::Null),
            // 'infinity' and BC dates
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_time(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<NaiveTime>, _>(idx) {
            Ok(v) => v
                .map(|t| JsonValue::String(t.to_string()))
                .unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_datetime(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<NaiveDateTime>, _>(idx) {
            Ok(v) => v.map(datetime_to_json).unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_timestamp(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            Ok(v) => v.map(timestamp_to_json).unwrap_or(JsonValue::Null),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawText>, _>(idx) {
            Ok(v) => text_or_null(v),
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to decode PostgreSQL column");
                JsonValue::Null
            }
        }
    }
}
