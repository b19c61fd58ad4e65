//! Row materialization: database values become plain JSON scalars so no
//! driver-specific wrapper types leak to callers.

use serde_json::{Map, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::{AppError, AppResult};

fn number(v: f64) -> Value {
    // NaN/inf have no JSON representation
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn decode_err(column: &str, type_name: &str, err: impl std::fmt::Display) -> AppError {
    AppError::QueryFailed(format!(
        "failed to decode column '{}' ({}): {}",
        column, type_name, err
    ))
}

pub fn mysql_row_to_object(row: &MySqlRow) -> AppResult<Map<String, Value>> {
    let mut object = Map::new();

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row
            .try_get_raw(index)
            .map_err(|e| decode_err(name, "?", e))?;
        if raw.is_null() {
            object.insert(name.to_string(), Value::Null);
            continue;
        }

        let type_name = raw.type_info().name().to_uppercase();
        let unsigned = type_name.contains("UNSIGNED");
        let value = match type_name.trim_end_matches(" UNSIGNED") {
            "BOOLEAN" | "BOOL" => Value::Bool(
                row.try_get::<bool, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "TINYINT" => {
                // TINYINT(1) doubles as MySQL's boolean
                match row.try_get::<bool, _>(index) {
                    Ok(b) => Value::Bool(b),
                    Err(_) => Value::from(
                        row.try_get::<i16, _>(index)
                            .map_err(|e| decode_err(name, &type_name, e))?,
                    ),
                }
            }
            "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "YEAR" => {
                if unsigned {
                    Value::from(
                        row.try_get::<u32, _>(index)
                            .map_err(|e| decode_err(name, &type_name, e))?,
                    )
                } else {
                    Value::from(
                        row.try_get::<i32, _>(index)
                            .map_err(|e| decode_err(name, &type_name, e))?,
                    )
                }
            }
            "BIGINT" => {
                if unsigned {
                    Value::from(
                        row.try_get::<u64, _>(index)
                            .map_err(|e| decode_err(name, &type_name, e))?,
                    )
                } else {
                    Value::from(
                        row.try_get::<i64, _>(index)
                            .map_err(|e| decode_err(name, &type_name, e))?,
                    )
                }
            }
            "FLOAT" => number(
                row.try_get::<f32, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))? as f64,
            ),
            "DOUBLE" | "REAL" => number(
                row.try_get::<f64, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "DECIMAL" | "NUMERIC" | "NEWDECIMAL" => {
                let numeric: rust_decimal::Decimal = row
                    .try_get(index)
                    .map_err(|e| decode_err(name, &type_name, e))?;
                let float: f64 = numeric
                    .try_into()
                    .map_err(|e| decode_err(name, &type_name, e))?;
                number(float)
            }
            "DATE" => Value::String(
                row.try_get::<chrono::NaiveDate, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_string(),
            ),
            "TIME" => Value::String(
                row.try_get::<chrono::NaiveTime, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_string(),
            ),
            "DATETIME" => Value::String(
                row.try_get::<chrono::NaiveDateTime, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_string(),
            ),
            "TIMESTAMP" => Value::String(
                row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_rfc3339(),
            ),
            "JSON" => row
                .try_get::<serde_json::Value, _>(index)
                .map_err(|e| decode_err(name, &type_name, e))?,
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB"
            | "GEOMETRY" => {
                let bytes: Vec<u8> = row
                    .try_get(index)
                    .map_err(|e| decode_err(name, &type_name, e))?;
                Value::Array(bytes.into_iter().map(Value::from).collect())
            }
            // CHAR, VARCHAR, TEXT family, ENUM, SET and anything unknown
            _ => match row.try_get::<String, _>(index) {
                Ok(s) => Value::String(s),
                Err(e) => return Err(decode_err(name, &type_name, e)),
            },
        };

        object.insert(name.to_string(), value);
    }

    Ok(object)
}

pub fn pg_row_to_object(row: &PgRow) -> AppResult<Map<String, Value>> {
    let mut object = Map::new();

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row
            .try_get_raw(index)
            .map_err(|e| decode_err(name, "?", e))?;
        if raw.is_null() {
            object.insert(name.to_string(), Value::Null);
            continue;
        }

        let type_name = raw.type_info().name().to_uppercase();
        let value = match type_name.as_str() {
            "BOOL" => Value::Bool(
                row.try_get::<bool, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "INT2" | "SMALLINT" => Value::from(
                row.try_get::<i16, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "INT4" | "INT" | "INTEGER" => Value::from(
                row.try_get::<i32, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "INT8" | "BIGINT" => Value::from(
                row.try_get::<i64, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "FLOAT4" => number(
                row.try_get::<f32, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))? as f64,
            ),
            "FLOAT8" => number(
                row.try_get::<f64, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "NUMERIC" => {
                let numeric: rust_decimal::Decimal = row
                    .try_get(index)
                    .map_err(|e| decode_err(name, &type_name, e))?;
                let float: f64 = numeric
                    .try_into()
                    .map_err(|e| decode_err(name, &type_name, e))?;
                number(float)
            }
            "DATE" => Value::String(
                row.try_get::<chrono::NaiveDate, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_string(),
            ),
            "TIME" => Value::String(
                row.try_get::<chrono::NaiveTime, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_string(),
            ),
            "TIMESTAMP" => Value::String(
                row.try_get::<chrono::NaiveDateTime, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_string(),
            ),
            "TIMESTAMPTZ" => Value::String(
                row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_rfc3339(),
            ),
            "UUID" => Value::String(
                row.try_get::<uuid::Uuid, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?
                    .to_string(),
            ),
            "JSON" | "JSONB" => row
                .try_get::<serde_json::Value, _>(index)
                .map_err(|e| decode_err(name, &type_name, e))?,
            "BYTEA" => {
                let bytes: Vec<u8> = row
                    .try_get(index)
                    .map_err(|e| decode_err(name, &type_name, e))?;
                Value::Array(bytes.into_iter().map(Value::from).collect())
            }
            // TEXT, VARCHAR, BPCHAR, NAME, CHAR and anything unknown
            _ => match row.try_get::<String, _>(index) {
                Ok(s) => Value::String(s),
                Err(e) => return Err(decode_err(name, &type_name, e)),
            },
        };

        object.insert(name.to_string(), value);
    }

    Ok(object)
}

pub fn sqlite_row_to_object(row: &SqliteRow) -> AppResult<Map<String, Value>> {
    let mut object = Map::new();

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row
            .try_get_raw(index)
            .map_err(|e| decode_err(name, "?", e))?;
        if raw.is_null() {
            object.insert(name.to_string(), Value::Null);
            continue;
        }

        let type_name = raw.type_info().name().to_uppercase();
        let value = match type_name.as_str() {
            "BOOLEAN" => Value::Bool(
                row.try_get::<bool, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" => Value::from(
                row.try_get::<i64, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "REAL" => number(
                row.try_get::<f64, _>(index)
                    .map_err(|e| decode_err(name, &type_name, e))?,
            ),
            "BLOB" => {
                let bytes: Vec<u8> = row
                    .try_get(index)
                    .map_err(|e| decode_err(name, &type_name, e))?;
                Value::Array(bytes.into_iter().map(Value::from).collect())
            }
            // TEXT plus sqlite's loosely-typed DATE/DATETIME/NUMERIC storage
            // classes; anything a column declared that sqlite stored as text
            _ => match row.try_get::<String, _>(index) {
                Ok(s) => Value::String(s),
                Err(_) => match row.try_get::<i64, _>(index) {
                    Ok(i) => Value::from(i),
                    Err(_) => match row.try_get::<f64, _>(index) {
                        Ok(f) => number(f),
                        Err(e) => return Err(decode_err(name, &type_name, e)),
                    },
                },
            },
        };

        object.insert(name.to_string(), value);
    }

    Ok(object)
}
