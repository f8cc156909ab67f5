//! Cacheable values
//!
//! Every engine stores and returns [`Value`]. The in-memory engine keeps it as
//! is, the byte-oriented engines pass it through the [`Codec`](crate::codec::Codec).
//!
//! A cache miss is always `None` at the engine boundary, so `Value::Null`,
//! `Value::Bool(false)` and an empty string are ordinary, storable values.

use crate::error::{CacheError, CacheResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value that can be stored in any cache engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// An explicit null (distinct from a miss)
    Null,
    /// A boolean
    Bool(bool),
    /// A 64-bit signed integer. Stored natively by counter-capable backends.
    Int(i64),
    /// A 64-bit float
    Float(f64),
    /// A UTF-8 string
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// An ordered list of values
    List(Vec<Value>),
    /// A string-keyed map of values
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a value from any serde-serializable type.
    ///
    /// Structs and maps become [`Value::Map`], sequences become [`Value::List`].
    pub fn from_serde<T: Serialize + ?Sized>(value: &T) -> CacheResult<Self> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Converts this value back into a serde-deserializable type.
    pub fn to_serde<T: DeserializeOwned>(&self) -> CacheResult<T> {
        Ok(serde_json::from_value(self.clone().into())?)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the integer a counter operation would start from.
    ///
    /// Accepts an `Int`, or a `Str` holding a decimal integer (what raw-mode
    /// file entries read back as).
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns true for the empty string and empty byte payloads.
    pub fn is_empty_payload(&self) -> bool {
        match self {
            Value::Str(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }

    /// Short type name used in log fields.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// Plain rendering: scalars as themselves, strings unquoted at the top level.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: ", key)?;
                    item.fmt_nested(f)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Value {
    /// Strings inside lists and maps are quoted so separators stay unambiguous.
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            other => fmt::Display::fmt(other, f),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Int(i64::from(n))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(map: BTreeMap<String, T>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::from(n),
            Value::Float(x) => serde_json::Number::from_f64(x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Bytes(b) => serde_json::Value::from(b),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = CacheError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value
            .as_int()
            .ok_or_else(|| CacheError::Serialization(format!("expected int, got {}", value.type_name())))
    }
}

impl TryFrom<Value> for String {
    type Error = CacheError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(CacheError::Serialization(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        visits: u32,
        tags: Vec<String>,
    }

    #[test]
    fn test_serde_struct_round_trip() {
        let session = Session {
            user: "ariz".to_string(),
            visits: 3,
            tags: vec!["admin".to_string()],
        };

        let value = Value::from_serde(&session).unwrap();
        assert!(matches!(value, Value::Map(_)));
        assert_eq!(value.to_serde::<Session>().unwrap(), session);
    }

    #[test]
    fn test_as_counter() {
        assert_eq!(Value::Int(42).as_counter(), Some(42));
        assert_eq!(Value::from("17").as_counter(), Some(17));
        assert_eq!(Value::from(" -3 ").as_counter(), Some(-3));
        assert_eq!(Value::from("abc").as_counter(), None);
        assert_eq!(Value::Float(1.0).as_counter(), None);
    }

    #[test]
    fn test_empty_payload() {
        assert!(Value::from("").is_empty_payload());
        assert!(Value::Bytes(Vec::new()).is_empty_payload());
        assert!(!Value::Null.is_empty_payload());
        assert!(!Value::Int(0).is_empty_payload());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Str("x".to_string()));
    }

    #[test]
    fn test_try_from() {
        assert_eq!(i64::try_from(Value::Int(5)).unwrap(), 5);
        assert!(i64::try_from(Value::from("5")).is_err());
        assert_eq!(String::try_from(Value::from("hi")).unwrap(), "hi");
    }

    #[test]
    fn test_display_is_plain() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::from("hello world").to_string(), "hello world");
        assert_eq!(Value::Bytes(vec![0, 1, 2]).to_string(), "<3 bytes>");

        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::from("alice"));
        map.insert("tags".to_string(), Value::from(vec![Value::Int(1), Value::Bool(true)]));
        assert_eq!(
            Value::Map(map).to_string(),
            r#"{"name": "alice", "tags": [1, true]}"#
        );
    }
}
