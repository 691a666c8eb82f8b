//! Value types stored in a document body

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::blob::Blob;
use crate::collection::{Array, Dictionary, MutableArray, MutableDictionary};

/// A value that can be stored in a document
#[derive(Debug, Clone, PartialEq, Hash, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Blob(Blob),
    Array(Array),
    Dictionary(Dictionary),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of the value. Booleans read as 1 and 0.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(true) => Some(Number::Integer(1)),
            Value::Bool(false) => Some(Number::Integer(0)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Parses an ISO-8601 string value, with or without fractional seconds.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        let s = self.as_str()?;
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|date| date.with_timezone(&Utc))
    }

    /// Truthiness: `true` or any nonzero number.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => n.to_f64() != 0.0,
            _ => false,
        }
    }

    /// Plain JSON rendition of the value. Blobs render as their metadata.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(Number::Integer(n)) => serde_json::Value::from(*n),
            Value::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Blob(blob) => serde_json::Value::Object(
                blob.properties()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Value::to_json).collect())
            }
            Value::Dictionary(dict) => serde_json::Value::Object(
                dict.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect(),
            ),
        }
    }

    /// Returns the first value in the graph that cannot be persisted.
    pub(crate) fn find_unsupported(&self) -> Option<&Value> {
        match self {
            Value::Number(Number::Float(f)) if !f.is_finite() => Some(self),
            Value::Array(arr) => arr.iter().find_map(Value::find_unsupported),
            Value::Dictionary(dict) => dict.values().find_map(Value::find_unsupported),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(Number::Integer(v as i64))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Number::Integer(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(Number::Float(v as f64))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Float(v))
    }
}

impl From<Number> for Value {
    fn from(v: Number) -> Self {
        Value::Number(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::String(v.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl From<Blob> for Value {
    fn from(v: Blob) -> Self {
        Value::Blob(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<MutableArray> for Value {
    fn from(v: MutableArray) -> Self {
        Value::Array(v.freeze())
    }
}

impl From<Dictionary> for Value {
    fn from(v: Dictionary) -> Self {
        Value::Dictionary(v)
    }
}

impl From<MutableDictionary> for Value {
    fn from(v: MutableDictionary) -> Self {
        Value::Dictionary(v.freeze())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Number(Number::Integer(i)),
                None => Value::Number(Number::Float(n.as_f64().unwrap_or(0.0))),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Dictionary(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

/// Number type supporting both integers and floats
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    /// Integer view; floats truncate toward zero and saturate at the bounds.
    pub fn to_i64(&self) -> i64 {
        match self {
            Number::Integer(n) => *n,
            Number::Float(f) => *f as i64,
        }
    }

    /// 32-bit view; floats saturate at the `i32` bounds, wide integers keep
    /// their low bits.
    pub fn to_i32(&self) -> i32 {
        match self {
            Number::Integer(n) => *n as i32,
            Number::Float(f) => *f as i32,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Integer(n) => *n as f64,
            Number::Float(f) => *f,
        }
    }

    /// Integer a float stands for exactly, if any.
    fn exact_integer(f: f64) -> Option<i64> {
        // 2^63 is not representable as i64
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < 9_223_372_036_854_775_808.0 {
            Some(f as i64)
        } else {
            None
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            (Number::Integer(i), Number::Float(f)) | (Number::Float(f), Number::Integer(i)) => {
                Number::exact_integer(*f) == Some(*i)
            }
        }
    }
}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Number::Integer(n) => n.hash(state),
            Number::Float(f) => match Number::exact_integer(*f) {
                Some(n) => n.hash(state),
                None => f.to_bits().hash(state),
            },
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(n) => write!(f, "{}", n),
            Number::Float(x) => write!(f, "{}", x),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(Number::Integer(n)) => serializer.serialize_i64(*n),
            Value::Number(Number::Float(f)) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Blob(blob) => blob.serialize(serializer),
            Value::Array(arr) => arr.serialize(serializer),
            Value::Dictionary(dict) => dict.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a document value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Number(Number::Integer(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(match i64::try_from(v) {
            Ok(n) => Value::Number(Number::Integer(n)),
            Err(_) => Value::Number(Number::Float(v as f64)),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Number(Number::Float(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::Array(Array::from(items)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut entries = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            entries.insert(key, value);
        }
        if let Some(blob) = Blob::from_properties(&entries) {
            return Ok(Value::Blob(blob));
        }
        Ok(Value::Dictionary(Dictionary::from(entries)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_number_truncation() {
        assert_eq!(Number::Float(3.9).to_i64(), 3);
        assert_eq!(Number::Float(-3.9).to_i64(), -3);
        assert_eq!(Number::Float(f64::MAX).to_i64(), i64::MAX);
    }

    #[test]
    fn test_integral_float_equals_integer() {
        assert_eq!(Number::Float(2.0), Number::Integer(2));
        assert_eq!(hash_of(&Number::Float(2.0)), hash_of(&Number::Integer(2)));
        assert_ne!(Number::Float(2.5), Number::Integer(2));
    }

    #[test]
    fn test_bool_as_number() {
        assert_eq!(Value::Bool(true).as_number(), Some(Number::Integer(1)));
        assert_eq!(Value::Bool(false).as_number(), Some(Number::Integer(0)));
        assert_eq!(Value::from("7").as_number(), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::from(0.5).to_bool());
        assert!(!Value::from(0i64).to_bool());
        assert!(!Value::from("true").to_bool());
        assert!(!Value::Null.to_bool());
    }

    #[test]
    fn test_date_round_trip() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let value = Value::from(date);
        assert_eq!(value.as_str(), Some("2024-03-01T12:30:00.000Z"));
        assert_eq!(value.as_date(), Some(date));

        let without_millis = Value::from("2024-03-01T12:30:00Z");
        assert_eq!(without_millis.as_date(), Some(date));
        assert_eq!(Value::from("yesterday").as_date(), None);
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(serde_json::json!({
            "name": "Alice",
            "tags": ["a", "b"],
            "score": 1.5,
        }));
        let dict = value.as_dictionary().unwrap();
        assert_eq!(dict.get("name"), Some(&Value::from("Alice")));
        assert_eq!(dict.get("tags").and_then(Value::as_array).map(Array::len), Some(2));
        assert_eq!(dict.get("score"), Some(&Value::from(1.5)));
    }

    #[test]
    fn test_find_unsupported() {
        let ok = Value::from(vec![Value::from(1i64), Value::from(2.5)]);
        assert!(ok.find_unsupported().is_none());

        let bad = Value::from(vec![Value::from(f64::NAN)]);
        assert!(bad.find_unsupported().is_some());
    }
}
