//! Scalar values and the ordered parameter map bound to a statement.
//!
//! [`Value`] is the dialect-agnostic scalar that travels between the
//! query builder, the compiler and a backend. [`Param`] pairs a value
//! with the bind kind the backend should use, and [`ParamMap`] keeps
//! them in insertion order under their placeholder names.
//!
//! Generated placeholders live in the reserved `:qx{n}x` namespace; user
//! supplied parameters for raw fragments must start with `:` and stay
//! out of that namespace.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Prefix of the reserved placeholder namespace used by the compiler.
pub const GENERATED_PREFIX: &str = ":qx";

/// A dialect-agnostic scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean; bound as `'1'`/`'0'` for backend portability.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Str(String),
    /// Binary blob.
    Bytes(Vec<u8>),
    /// Structured value, serialized to JSON text when bound.
    Json(JsonValue),
}

impl Value {
    /// Whether this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view, parsing text if needed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view, parsing text if needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view. Text and numbers follow SQL truthiness: zero and
    /// `"0"` are false, other numerics true.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Float(f) => Some(*f != 0.0),
            Self::Str(s) => match s.trim() {
                "0" | "" | "false" => Some(false),
                "1" | "true" => Some(true),
                other => other.parse::<f64>().ok().map(|f| f != 0.0),
            },
            _ => None,
        }
    }

    /// Borrowed text view, without conversion.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render as plain unquoted text, the way a backend would coerce it.
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::Bytes(_) => "{BLOB}".to_string(),
            Self::Json(j) => j.to_string(),
        }
    }

    /// Convert into a JSON value for decoded result rows.
    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(b),
            Self::Int(i) => JsonValue::from(i),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Str(s) => JsonValue::String(s),
            Self::Bytes(b) => JsonValue::Array(b.into_iter().map(JsonValue::from).collect()),
            Self::Json(j) => j,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Bind kind attached to a parameter, mirroring prepared-statement
/// parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Bound as NULL.
    Null,
    /// Bound as an integer.
    Int,
    /// Bound as text.
    Str,
    /// Boolean, carried as `'1'`/`'0'` text.
    Bool,
    /// Large object / blob.
    Lob,
}

/// A value plus the kind it should be bound with.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// The value to bind.
    pub value: Value,
    /// How to bind it.
    pub kind: ParamKind,
}

impl Param {
    /// Derive the bind kind from a value.
    ///
    /// Booleans are coerced to `'1'`/`'0'` text, floats travel as text
    /// to avoid backend specific rounding, and JSON is serialized.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Param { value: Value::Null, kind: ParamKind::Null },
            Value::Bool(b) => Param {
                value: Value::Str(if b { "1" } else { "0" }.to_string()),
                kind: ParamKind::Bool,
            },
            Value::Int(i) => Param { value: Value::Int(i), kind: ParamKind::Int },
            Value::Float(f) => Param { value: Value::Float(f), kind: ParamKind::Str },
            Value::Str(s) => Param { value: Value::Str(s), kind: ParamKind::Str },
            Value::Bytes(b) => Param { value: Value::Bytes(b), kind: ParamKind::Lob },
            Value::Json(j) => Param { value: Value::Str(j.to_string()), kind: ParamKind::Str },
        }
    }
}

/// Ordered map of placeholder name to parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    entries: IndexMap<String, Param>,
}

impl ParamMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no parameters are bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a parameter under an already validated placeholder name.
    pub fn push(&mut self, key: String, param: Param) {
        self.entries.insert(key, param);
    }

    /// Bind a generated placeholder, deriving the kind from the value.
    pub fn bind(&mut self, key: String, value: Value) {
        self.push(key, Param::from_value(value));
    }

    /// Bind a user supplied placeholder from a raw fragment.
    ///
    /// The name must start with `:` and must not collide with the
    /// reserved `:qx{n}x` namespace.
    pub fn bind_user(&mut self, key: &str, value: Value) -> Result<()> {
        if !key.starts_with(':') {
            return Err(Error::invalid(format!(
                "raw parameter '{key}' must start with ':'"
            )));
        }
        if key.starts_with(GENERATED_PREFIX) {
            return Err(Error::invalid(format!(
                "raw parameter '{key}' collides with the reserved placeholder namespace"
            )));
        }
        self.push(key.to_string(), Param::from_value(value));
        Ok(())
    }

    /// Look up a parameter by placeholder name.
    pub fn get(&self, key: &str) -> Option<&Param> {
        self.entries.get(key)
    }

    /// Iterate parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Param)> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ParamMap {
    type Item = (&'a String, &'a Param);
    type IntoIter = indexmap::map::Iter<'a, String, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_params_coerce_to_text_digits() {
        let p = Param::from_value(Value::Bool(true));
        assert_eq!(p.kind, ParamKind::Bool);
        assert_eq!(p.value, Value::Str("1".to_string()));
    }

    #[test]
    fn float_params_bind_as_text_kind() {
        let p = Param::from_value(Value::Float(3.5));
        assert_eq!(p.kind, ParamKind::Str);
        assert_eq!(p.value, Value::Float(3.5));
    }

    #[test]
    fn user_params_must_be_colon_prefixed() {
        let mut map = ParamMap::new();
        assert!(map.bind_user("name", Value::Int(1)).is_err());
        assert!(map.bind_user(":name", Value::Int(1)).is_ok());
    }

    #[test]
    fn user_params_cannot_enter_reserved_namespace() {
        let mut map = ParamMap::new();
        assert!(map.bind_user(":qx0x", Value::Int(1)).is_err());
        assert!(map.bind_user(":quarry", Value::Int(1)).is_ok());
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut map = ParamMap::new();
        map.bind(":qx0x".to_string(), Value::Int(1));
        map.bind(":qx1x".to_string(), Value::Str("two".to_string()));
        let keys: Vec<_> = map.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec![":qx0x", ":qx1x"]);
    }

    #[test]
    fn value_coercions() {
        assert_eq!(Value::Str(" 42 ".to_string()).as_i64(), Some(42));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Str("1".to_string()).as_bool(), Some(true));
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
    }
}
