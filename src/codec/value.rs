//! In-memory value domain.
//!
//! Maps are split by key type at construction: [`Value::Map`] is string
//! keyed, [`Value::IntMap`] is int64 keyed. The encoder never inspects keys
//! to guess which wire variant to use.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::CodecError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    IntMap(BTreeMap<i64, Value>),
}

impl Value {
    /// Build a string-keyed map.
    pub fn string_map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build an int64-keyed map.
    pub fn int_map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i64, Value)>,
    {
        Value::IntMap(entries.into_iter().collect())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in a string-keyed map. Any other variant yields `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Text carried either as a string or as UTF-8 bytes.
    ///
    /// Older backends send text fields as bytes; both are accepted.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Convert into JSON for the HTTP surface.
    ///
    /// Bytes become a UTF-8 string when valid, base64 otherwise. Int-keyed
    /// maps become objects with decimal keys. Non-finite floats have no JSON
    /// form and are rejected.
    pub fn into_json(self) -> Result<serde_json::Value, CodecError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| CodecError::UnsupportedValueType(format!("non-finite float {f}")))?,
            Value::Bytes(b) => match String::from_utf8(b) {
                Ok(s) => serde_json::Value::String(s),
                Err(e) => serde_json::Value::String(STANDARD.encode(e.into_bytes())),
            },
            Value::String(s) => serde_json::Value::String(s),
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::List(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(Value::into_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, v.into_json()?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
            Value::IntMap(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k.to_string(), v.into_json()?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
        })
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = CodecError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if n.is_u64() {
                    return Err(CodecError::UnsupportedValueType(format!(
                        "integer {n} exceeds int64 range"
                    )));
                } else {
                    let f = n.as_f64().ok_or_else(|| {
                        CodecError::UnsupportedValueType(format!("number {n}"))
                    })?;
                    Value::Float(f)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Value::try_from(v)?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
        })
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_object_becomes_string_map() {
        let v = Value::try_from(json!({"a": 1, "b": [true, "x"], "c": 1.5})).unwrap();
        assert_eq!(v.get("a"), Some(&Value::Int(1)));
        assert_eq!(
            v.get("b"),
            Some(&Value::List(vec![Value::Bool(true), Value::from("x")]))
        );
        assert_eq!(v.get("c"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_json_u64_overflow_is_unsupported() {
        let err = Value::try_from(json!(u64::MAX)).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedValueType(_)));
    }

    #[test]
    fn test_into_json_int_map_keys() {
        let v = Value::int_map([(42, Value::Float(-1.0))]);
        assert_eq!(v.into_json().unwrap(), json!({"42": -1.0}));
    }

    #[test]
    fn test_into_json_rejects_nan() {
        assert!(Value::Float(f64::NAN).into_json().is_err());
    }

    #[test]
    fn test_into_json_bytes() {
        assert_eq!(Value::Bytes(b"hi".to_vec()).into_json().unwrap(), json!("hi"));
        assert_eq!(
            Value::Bytes(vec![0xff, 0x00]).into_json().unwrap(),
            json!(STANDARD.encode([0xff, 0x00]))
        );
    }

    #[test]
    fn test_to_text_accepts_bytes() {
        assert_eq!(Value::Bytes(b"stop".to_vec()).to_text().as_deref(), Some("stop"));
        assert_eq!(Value::Int(1).to_text(), None);
    }
}
