//! Column helpers for nullable libSQL values

use libsql::{Row, Value};

use crate::error::{Error, Result};

pub fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(unexpected(idx, "text", &other)),
    }
}

pub fn optional_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(unexpected(idx, "integer", &other)),
    }
}

pub fn optional_real(row: &Row, idx: i32) -> Result<Option<f64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Real(value) => Ok(Some(value)),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(value) => Ok(Some(value as f64)),
        other => Err(unexpected(idx, "real", &other)),
    }
}

pub fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

fn unexpected(idx: i32, expected: &str, found: &Value) -> Error {
    Error::Database(format!(
        "Column {idx}: expected {expected}, found {found:?}"
    ))
}
