//! Conversions between the query layer's [`Value`] and SQLite storage
//! classes.

use rusqlite::types::{Value as SqliteValue, ValueRef};

use quarry_query::Value;

/// Convert a bound parameter value into an owned SQLite value.
///
/// Booleans never reach this point, the binder coerces them to `'1'`/`'0'`
/// text, and JSON is serialized to text upstream for the same reason. The
/// arms are kept anyway so a hand-built [`Value`] still binds sensibly.
pub fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Str(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Json(j) => SqliteValue::Text(j.to_string()),
    }
}

/// Convert a fetched SQLite cell into a [`Value`].
///
/// SQLite has no boolean or JSON storage class, so those arrive as
/// integers and text; the decode layer applies declared column types on
/// top of this raw reading.
pub fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Str(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_values_round_trip() {
        assert_eq!(to_sqlite(&Value::Int(7)), SqliteValue::Integer(7));
        assert_eq!(to_sqlite(&Value::Float(1.5)), SqliteValue::Real(1.5));
        assert_eq!(
            to_sqlite(&Value::Str("ada".into())),
            SqliteValue::Text("ada".into())
        );
        assert_eq!(to_sqlite(&Value::Null), SqliteValue::Null);
    }

    #[test]
    fn booleans_become_integers() {
        assert_eq!(to_sqlite(&Value::Bool(true)), SqliteValue::Integer(1));
        assert_eq!(to_sqlite(&Value::Bool(false)), SqliteValue::Integer(0));
    }

    #[test]
    fn json_binds_as_text() {
        let json = Value::Json(serde_json::json!({"tags": ["a"]}));
        assert_eq!(
            to_sqlite(&json),
            SqliteValue::Text("{\"tags\":[\"a\"]}".into())
        );
    }

    #[test]
    fn fetched_cells_map_to_values() {
        assert_eq!(from_sqlite(ValueRef::Null), Value::Null);
        assert_eq!(from_sqlite(ValueRef::Integer(3)), Value::Int(3));
        assert_eq!(from_sqlite(ValueRef::Real(0.5)), Value::Float(0.5));
        assert_eq!(from_sqlite(ValueRef::Text(b"hi")), Value::Str("hi".into()));
        assert_eq!(
            from_sqlite(ValueRef::Blob(&[1, 2])),
            Value::Bytes(vec![1, 2])
        );
    }
}
