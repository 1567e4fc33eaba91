//! Row-to-JSON decoding for the SQL backends.
//!
//! Ad hoc `execute` results are normalized into JSON objects keyed by column
//! name. Decoding is category-driven: the column's declared type selects a
//! decode strategy, and NULLs always surface as JSON null. Binary columns are
//! base64-encoded.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Json,
    Binary,
    Text,
}

fn categorize(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower.contains("double") || lower.contains("real") {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower.contains("blob") || lower == "bytea" || lower.contains("binary") {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

/// Raw PostgreSQL NUMERIC value kept as a string to preserve the exact
/// database representation.
#[derive(Debug)]
struct RawNumeric(String);

impl Type<sqlx::Postgres> for RawNumeric {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawNumeric {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawNumeric(s.to_string()))
    }
}

fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Convert a PostgreSQL row into a JSON object.
pub fn pg_row_to_json(row: &PgRow) -> serde_json::Map<String, JsonValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let value = match categorize(col.type_info().name()) {
                TypeCategory::Decimal => match row.try_get::<Option<RawNumeric>, _>(idx) {
                    Ok(Some(v)) => JsonValue::String(v.0),
                    _ => JsonValue::Null,
                },
                TypeCategory::Integer => decode_pg_integer(row, idx),
                TypeCategory::Boolean => row
                    .try_get::<Option<bool>, _>(idx)
                    .ok()
                    .flatten()
                    .map(JsonValue::Bool)
                    .unwrap_or(JsonValue::Null),
                TypeCategory::Float => row
                    .try_get::<Option<f64>, _>(idx)
                    .ok()
                    .flatten()
                    .map(float_to_json)
                    .unwrap_or(JsonValue::Null),
                TypeCategory::Json => row
                    .try_get::<Option<JsonValue>, _>(idx)
                    .ok()
                    .flatten()
                    .unwrap_or(JsonValue::Null),
                TypeCategory::Binary => row
                    .try_get::<Option<Vec<u8>>, _>(idx)
                    .ok()
                    .flatten()
                    .map(|v| JsonValue::String(STANDARD.encode(v)))
                    .unwrap_or(JsonValue::Null),
                TypeCategory::Text => decode_pg_text(row, idx),
            };
            (col.name().to_string(), value)
        })
        .collect()
}

fn decode_pg_integer(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    JsonValue::Null
}

fn decode_pg_text(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return JsonValue::String(v);
    }
    // Timestamps and other non-string text-category types
    if let Ok(Some(v)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return JsonValue::String(v.to_rfc3339());
    }
    JsonValue::Null
}

/// Convert a SQLite row into a JSON object.
pub fn sqlite_row_to_json(row: &SqliteRow) -> serde_json::Map<String, JsonValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let value = match categorize(col.type_info().name()) {
                TypeCategory::Integer => row
                    .try_get::<Option<i64>, _>(idx)
                    .ok()
                    .flatten()
                    .map(|v| JsonValue::Number(v.into()))
                    .unwrap_or(JsonValue::Null),
                TypeCategory::Boolean => row
                    .try_get::<Option<bool>, _>(idx)
                    .ok()
                    .flatten()
                    .map(JsonValue::Bool)
                    .unwrap_or(JsonValue::Null),
                // SQLite NUMERIC affinity is a float
                TypeCategory::Float | TypeCategory::Decimal => row
                    .try_get::<Option<f64>, _>(idx)
                    .ok()
                    .flatten()
                    .map(float_to_json)
                    .unwrap_or(JsonValue::Null),
                TypeCategory::Binary => row
                    .try_get::<Option<Vec<u8>>, _>(idx)
                    .ok()
                    .flatten()
                    .map(|v| JsonValue::String(STANDARD.encode(v)))
                    .unwrap_or(JsonValue::Null),
                // SQLite has no JSON column type; stored as text
                TypeCategory::Json | TypeCategory::Text => row
                    .try_get::<Option<String>, _>(idx)
                    .ok()
                    .flatten()
                    .map(JsonValue::String)
                    .unwrap_or(JsonValue::Null),
            };
            (col.name().to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_integer() {
        assert_eq!(categorize("INTEGER"), TypeCategory::Integer);
        assert_eq!(categorize("BIGINT"), TypeCategory::Integer);
        assert_eq!(categorize("int8"), TypeCategory::Integer);
        assert_eq!(categorize("serial"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_decimal_before_numeric_overlap() {
        assert_eq!(categorize("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize("DECIMAL(10,2)"), TypeCategory::Decimal);
    }

    #[test]
    fn test_categorize_misc() {
        assert_eq!(categorize("BOOLEAN"), TypeCategory::Boolean);
        assert_eq!(categorize("double precision"), TypeCategory::Float);
        assert_eq!(categorize("REAL"), TypeCategory::Float);
        assert_eq!(categorize("jsonb"), TypeCategory::Json);
        assert_eq!(categorize("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize("BLOB"), TypeCategory::Binary);
        assert_eq!(categorize("TEXT"), TypeCategory::Text);
        assert_eq!(categorize("TIMESTAMPTZ"), TypeCategory::Text);
    }

    #[test]
    fn test_float_to_json_non_finite_falls_back_to_string() {
        assert_eq!(float_to_json(1.5), serde_json::json!(1.5));
        assert_eq!(
            float_to_json(f64::INFINITY),
            JsonValue::String("inf".to_string())
        );
    }
}
