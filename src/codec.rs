//! Value codec for byte-oriented engines
//!
//! File, Redis and memcached store bytes, so values pass through here on the
//! way in and out. The layout is:
//!
//! ```text
//! Value::Int(n)   ->  "<decimal n>"            e.g. b"42", b"-7"
//! anything else   ->  "s:" + bincode(Value)    e.g. b"s:\x04\x00..."
//! ```
//!
//! Integers stay plain decimal so backend counters (`INCRBY`, `incr`) can
//! operate on them in place. Everything else carries the `s:` marker, which can
//! never start a decimal integer, so decoding never has to guess.

use crate::error::{CacheError, CacheResult};
use crate::value::Value;

/// Marker prepended to every serialized (non-integer) payload
pub const SERIALIZED_MARKER: &[u8] = b"s:";

/// Stateless encoder/decoder for [`Value`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec;

impl Codec {
    /// Encodes a value into its stored byte form.
    pub fn encode(value: &Value) -> CacheResult<Vec<u8>> {
        match value {
            Value::Int(n) => Ok(n.to_string().into_bytes()),
            other => {
                let payload = bincode::serialize(other)?;
                let mut buf = Vec::with_capacity(SERIALIZED_MARKER.len() + payload.len());
                buf.extend_from_slice(SERIALIZED_MARKER);
                buf.extend_from_slice(&payload);
                Ok(buf)
            }
        }
    }

    /// Decodes a stored byte form back into a value.
    pub fn decode(data: &[u8]) -> CacheResult<Value> {
        if let Some(payload) = data.strip_prefix(SERIALIZED_MARKER) {
            return Ok(bincode::deserialize(payload)?);
        }

        parse_decimal(data)
            .map(Value::Int)
            .ok_or_else(|| CacheError::Serialization("untagged, non-integer payload".to_string()))
    }

    /// Encodes a value for raw (non-serializing) storage.
    ///
    /// Only strings and integers have a raw form.
    pub fn encode_raw(value: &Value) -> CacheResult<Vec<u8>> {
        match value {
            Value::Str(s) => Ok(s.as_bytes().to_vec()),
            Value::Int(n) => Ok(n.to_string().into_bytes()),
            other => Err(CacheError::Serialization(format!(
                "{} values need serialization enabled",
                other.type_name()
            ))),
        }
    }

    /// Decodes raw storage. Raw entries always read back as strings.
    pub fn decode_raw(data: &[u8]) -> CacheResult<Value> {
        std::str::from_utf8(data)
            .map(|s| Value::Str(s.to_string()))
            .map_err(|e| CacheError::Serialization(format!("raw entry is not UTF-8: {}", e)))
    }
}

/// Parses an ASCII decimal integer, tolerating surrounding whitespace
/// (memcached may space-pad counters it rewrote in place).
fn parse_decimal(data: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(data).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_integers_are_plain_decimal() {
        assert_eq!(Codec::encode(&Value::Int(42)).unwrap(), b"42");
        assert_eq!(Codec::encode(&Value::Int(-7)).unwrap(), b"-7");
        assert_eq!(Codec::decode(b"110").unwrap(), Value::Int(110));
        assert_eq!(Codec::decode(b"5   ").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_numeric_strings_stay_strings() {
        // A string that looks like a number must not come back as an integer
        let value = Value::from("12345");
        let encoded = Codec::encode(&value).unwrap();
        assert!(encoded.starts_with(SERIALIZED_MARKER));
        assert_eq!(Codec::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_falsy_values_survive() {
        for value in [Value::Null, Value::Bool(false), Value::from(""), Value::Float(0.0)] {
            let encoded = Codec::encode(&value).unwrap();
            assert_eq!(Codec::decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn test_nested_values() {
        let mut map = BTreeMap::new();
        map.insert("foo".to_string(), Value::from("bar"));
        map.insert(
            "list".to_string(),
            Value::List(vec![Value::Int(1), Value::Bytes(vec![0, 255])]),
        );
        let value = Value::Map(map);

        let encoded = Codec::encode(&value).unwrap();
        assert_eq!(Codec::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_untagged_garbage_is_rejected() {
        assert!(Codec::decode(b"hello").is_err());
        assert!(Codec::decode(b"").is_err());
        assert!(Codec::decode(b"s:\xff\xff").is_err());
    }

    #[test]
    fn test_raw_mode() {
        assert_eq!(Codec::encode_raw(&Value::from("plain")).unwrap(), b"plain");
        assert_eq!(Codec::encode_raw(&Value::Int(9)).unwrap(), b"9");
        assert!(Codec::encode_raw(&Value::Bool(true)).is_err());
        assert_eq!(Codec::decode_raw(b"9").unwrap(), Value::from("9"));
        assert!(Codec::decode_raw(&[0xff, 0xfe]).is_err());
    }
}
