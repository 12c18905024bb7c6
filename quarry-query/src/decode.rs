//! Decoding fetched rows into JSON values.
//!
//! The shape of a decoded result follows the selection:
//!
//! - `*`, raw select lists: an array of plain row objects;
//! - a single column: an array of bare values;
//! - a field list: an array of objects with aliases applied, type tags
//!   cast, and groups nested;
//! - a single named group at the root: one object keyed by the index
//!   column's values.

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::client::Row;
use crate::compiler::ColumnMap;
use crate::error::{Error, Result};
use crate::types::{ColumnType, Field, Fields};
use crate::value::Value;

/// Decode a fetched result set according to its selection.
pub(crate) fn decode_rows(rows: Vec<Row>, fields: &Fields, cmap: &ColumnMap) -> Result<JsonValue> {
    match fields {
        Fields::All | Fields::Raw(_) => Ok(JsonValue::Array(
            rows.into_iter().map(plain_object).collect(),
        )),
        Fields::Col(spec) => {
            let entry = cmap
                .get(spec)
                .ok_or_else(|| Error::invalid(format!("unmapped column spec '{spec}'")))?;
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(cast(row.get(entry.key.as_str()), entry.ty)?);
            }
            Ok(JsonValue::Array(out))
        }
        Fields::List(list) => {
            if list.len() == 1 {
                if let Field::Group { name, fields: sub } = &list[0] {
                    return decode_indexed(rows, name, sub, cmap);
                }
            }
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(JsonValue::Object(decode_row(row, list, cmap)?));
            }
            Ok(JsonValue::Array(out))
        }
    }
}

/// Decode the shape `{"index_col": [fields...]}`: one object whose keys
/// are the index column's values.
fn decode_indexed(
    rows: Vec<Row>,
    index_spec: &str,
    fields: &[Field],
    cmap: &ColumnMap,
) -> Result<JsonValue> {
    let index_key = cmap
        .get(index_spec)
        .map(|entry| entry.key.clone())
        .ok_or_else(|| Error::invalid(format!("unmapped index column '{index_spec}'")))?;

    let mut out = JsonMap::new();
    for row in &rows {
        let index = row
            .get(index_key.as_str())
            .map(Value::to_plain_string)
            .ok_or_else(|| Error::invalid(format!("index column '{index_key}' not in result")))?;
        out.insert(index, JsonValue::Object(decode_row(row, fields, cmap)?));
    }
    Ok(JsonValue::Object(out))
}

fn decode_row(row: &Row, fields: &[Field], cmap: &ColumnMap) -> Result<JsonMap<String, JsonValue>> {
    let mut out = JsonMap::new();
    for field in fields {
        match field {
            Field::Col(spec) => {
                let entry = cmap
                    .get(spec)
                    .ok_or_else(|| Error::invalid(format!("unmapped column spec '{spec}'")))?;
                out.insert(
                    entry.key.clone(),
                    cast(row.get(entry.key.as_str()), entry.ty)?,
                );
            }
            Field::Raw { name, .. } => {
                let entry = cmap
                    .get(name)
                    .ok_or_else(|| Error::invalid(format!("unmapped column spec '{name}'")))?;
                // Structured casts do not apply to raw expressions.
                if matches!(entry.ty, Some(ColumnType::Object | ColumnType::Json)) {
                    continue;
                }
                out.insert(
                    entry.key.clone(),
                    cast(row.get(entry.key.as_str()), entry.ty)?,
                );
            }
            Field::Group { name, fields: sub } => {
                out.insert(
                    name.clone(),
                    JsonValue::Object(decode_row(row, sub, cmap)?),
                );
            }
        }
    }
    Ok(out)
}

fn plain_object(row: Row) -> JsonValue {
    JsonValue::Object(
        row.into_iter()
            .map(|(key, value)| (key, value.into_json()))
            .collect(),
    )
}

/// Apply a column's type cast to a fetched value. NULL stays NULL
/// regardless of the tag; absent columns decode as NULL.
fn cast(value: Option<&Value>, ty: Option<ColumnType>) -> Result<JsonValue> {
    let Some(value) = value else {
        return Ok(JsonValue::Null);
    };
    if value.is_null() {
        return Ok(JsonValue::Null);
    }
    let Some(ty) = ty else {
        return Ok(value.clone().into_json());
    };
    Ok(match ty {
        ColumnType::Str => JsonValue::String(value.to_plain_string()),
        ColumnType::Int => JsonValue::from(value.as_i64().unwrap_or(0)),
        ColumnType::Number => serde_json::Number::from_f64(value.as_f64().unwrap_or(0.0))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnType::Bool => JsonValue::Bool(value.as_bool().unwrap_or(false)),
        ColumnType::Object | ColumnType::Json => {
            serde_json::from_str(&value.to_plain_string()).unwrap_or(JsonValue::Null)
        }
    })
}
