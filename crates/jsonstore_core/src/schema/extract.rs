//! Pulling search field values out of document bodies.
//!
//! A field name is a dotted path. Arrays met anywhere along the path fan
//! out: `orders.sku` over `{"orders":[{"sku":"a"},{"sku":"b"}]}` yields both
//! values. A field with several values is stored as their text joined by
//! [`ARRAY_SEPARATOR`]. String values are stored through `escape_text`,
//! so an unescaped `@` in a column only ever belongs to a separator.

use super::{FieldType, SearchField};
use crate::error::{StoreError, StoreResult};
use jsonstore_storage::SqlValue;
use serde_json::Value;

/// Separator between the values of a multi-valued search field.
pub(crate) const ARRAY_SEPARATOR: &str = "-@-";

/// Escapes backslashes and `@` so element text never contains a bare separator.
///
/// Text without either character is stored unchanged.
pub(crate) fn escape_text(text: &str) -> String {
    if !text.contains(['\\', '@']) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        if matches!(c, '\\' | '@') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Computes the column value of `field` for `doc`.
pub(crate) fn index_value(doc: &Value, field: &SearchField) -> StoreResult<SqlValue> {
    let segments: Vec<&str> = field.name.split('.').collect();
    let mut found = Vec::new();
    collect(doc, &segments, &mut found);

    match found.as_slice() {
        [] => Ok(SqlValue::Null),
        [single] => coerce(&field.name, field.field_type, single),
        many => {
            let parts = many
                .iter()
                .map(|v| coerce(&field.name, field.field_type, v).map(|s| sql_text(&s)))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(SqlValue::Text(parts.join(ARRAY_SEPARATOR)))
        }
    }
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                collect(item, segments, out);
            }
        }
        Value::Object(map) => match segments.split_first() {
            Some((head, rest)) => {
                if let Some(child) = map.get(*head) {
                    collect(child, rest, out);
                }
            }
            None => out.push(value),
        },
        scalar => {
            if segments.is_empty() {
                out.push(scalar);
            }
        }
    }
}

/// Converts a JSON value to the storage form of a field of type `ty`.
///
/// Numeric strings are accepted for numeric fields; booleans are stored as
/// 1 or 0 and accept `"true"`/`"false"` and 0/1.
pub(crate) fn coerce(name: &str, ty: FieldType, value: &Value) -> StoreResult<SqlValue> {
    let mismatch =
        || StoreError::invalid_schema(format!("field {name:?} expects {ty}, got {value}"));

    match (ty, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (FieldType::String, Value::String(s)) => Ok(SqlValue::Text(escape_text(s))),
        (FieldType::String, other) => Ok(SqlValue::Text(escape_text(&other.to_string()))),
        (FieldType::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e18)
                    .map(|f| f as i64)
            })
            .map(SqlValue::Integer)
            .ok_or_else(mismatch),
        (FieldType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(SqlValue::Integer)
            .map_err(|_| mismatch()),
        (FieldType::Integer | FieldType::Boolean, Value::Bool(b)) => {
            Ok(SqlValue::Integer(i64::from(*b)))
        }
        (FieldType::Number, Value::Number(n)) => {
            n.as_f64().map(SqlValue::Real).ok_or_else(mismatch)
        }
        (FieldType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(SqlValue::Real)
            .ok_or_else(mismatch),
        (FieldType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(b @ (0 | 1)) => Ok(SqlValue::Integer(b)),
            _ => Err(mismatch()),
        },
        (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(SqlValue::Integer(1)),
            "false" | "0" => Ok(SqlValue::Integer(0)),
            _ => Err(mismatch()),
        },
        _ => Err(mismatch()),
    }
}

/// Text form of a stored value, as `CAST(... AS TEXT)` would see it for
/// whole numbers and strings.
pub(crate) fn sql_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

/// Text of a JSON scalar; `None` for objects, arrays and null.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
