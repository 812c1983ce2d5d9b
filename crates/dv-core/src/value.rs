//! Cell values and rows

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::concept::{ConceptId, Space, KEY_SEPARATOR};

/// A row maps concepts to values
pub type Row = IndexMap<ConceptId, Value>;

/// A single cell value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// A value is comparable when it orders against itself; NaN is not
    pub fn is_self_comparable(&self) -> bool {
        self.partial_cmp(self).is_some()
    }

    /// Parse a raw text cell: finite numbers become numbers, `true`/`false`
    /// booleans. Words like `nan` or `inf` stay text.
    pub fn parse(raw: &str) -> Value {
        if raw.is_empty() {
            Value::Null
        } else if let Some(n) = raw.parse::<f64>().ok().filter(|n| n.is_finite()) {
            Value::Number(n)
        } else if raw.eq_ignore_ascii_case("true") {
            Value::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Value::Bool(false)
        } else {
            Value::Text(raw.to_string())
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                // -0.0 == 0.0 and all NaNs are equal, so hash them alike
                let canonical = if *n == 0.0 {
                    0.0f64
                } else if n.is_nan() {
                    f64::NAN
                } else {
                    *n
                };
                canonical.to_bits().hash(state);
            }
            Value::Text(s) => s.hash(state),
        }
    }
}

impl PartialOrd for Value {
    /// Values of different kinds, nulls and NaN do not order
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            _ => Value::Null,
        }
    }
}

/// Build a row from `(concept, value)` pairs
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<ConceptId>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Key string of a row within `space`: the key values joined in space order
pub fn key_str(row: &Row, space: &Space) -> String {
    let parts: Vec<String> = space
        .iter()
        .map(|dim| row.get(dim).map(ToString::to_string).unwrap_or_default())
        .collect();
    parts.join(&KEY_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_is_not_self_comparable() {
        assert!(!Value::Number(f64::NAN).is_self_comparable());
        assert!(!Value::Null.is_self_comparable());
        assert!(Value::from(3).is_self_comparable());
        assert!(Value::from("a").is_self_comparable());
    }

    #[test]
    fn test_mixed_kinds_do_not_order() {
        assert_eq!(Value::from(1).partial_cmp(&Value::from("1")), None);
        assert!(Value::from(1) < Value::from(2));
        assert!(Value::from("a") < Value::from("b"));
    }

    #[test]
    fn test_parse_and_key_str() {
        assert_eq!(Value::parse("2000"), Value::Number(2000.0));
        assert_eq!(Value::parse(""), Value::Null);
        assert_eq!(Value::parse("swe"), Value::from("swe"));

        let r = row([("geo", Value::from("swe")), ("time", Value::from(2000))]);
        assert_eq!(key_str(&r, &Space::new(["geo", "time"])), "swe¬2000");
        assert_eq!(key_str(&r, &Space::new(["time", "geo"])), "2000¬swe");
    }

    #[test]
    fn test_parse_keeps_non_finite_words_as_text() {
        // "Nan" is a province name, not a number
        assert_eq!(Value::parse("Nan"), Value::from("Nan"));
        assert_eq!(Value::parse("inf"), Value::from("inf"));
        assert_eq!(Value::parse("Infinity"), Value::from("Infinity"));
        assert_eq!(Value::parse("-1.5e3"), Value::Number(-1500.0));
    }

    #[test]
    fn test_json_roundtrip_is_untagged() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![Value::Null, Value::Bool(true), Value::Number(2.5), Value::from("x")]
        );
    }
}
