//! Immutable and mutable containers of the value graph
//!
//! `Array` and `Dictionary` are read-only views sharing their storage through
//! an `Arc`. `to_mutable` thaws a view into a `MutableArray`/`MutableDictionary`
//! that shares the same storage until its first write (copy-on-write), and
//! `freeze` turns an edited container back into a read-only view.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Deserializer, Serialize};

use crate::blob::Blob;
use crate::value::{Number, Value};

/// Read-only ordered sequence of values
#[derive(Clone, Default, PartialEq, Hash)]
pub struct Array {
    items: Arc<Vec<Value>>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Editable copy sharing this array's storage until first write
    pub fn to_mutable(&self) -> MutableArray {
        MutableArray {
            items: Arc::clone(&self.items),
        }
    }

    pub(crate) fn make_mut(&mut self) -> &mut Vec<Value> {
        Arc::make_mut(&mut self.items)
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl Serialize for Array {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in self.items.iter() {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

/// Editable companion of [`Array`]
#[derive(Clone, Default, PartialEq)]
pub struct MutableArray {
    items: Arc<Vec<Value>>,
}

impl MutableArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        Arc::make_mut(&mut self.items).push(value.into());
        self
    }

    /// Replaces the value at `index`. Out-of-range indexes are ignored.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> &mut Self {
        if let Some(slot) = Arc::make_mut(&mut self.items).get_mut(index) {
            *slot = value.into();
        }
        self
    }

    /// Inserts at `index`, shifting later values. Out-of-range indexes are ignored.
    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> &mut Self {
        if index <= self.items.len() {
            Arc::make_mut(&mut self.items).insert(index, value.into());
        }
        self
    }

    pub fn remove(&mut self, index: usize) -> Option<Value> {
        if index < self.items.len() {
            Some(Arc::make_mut(&mut self.items).remove(index))
        } else {
            None
        }
    }

    /// Read-only snapshot sharing this array's current storage
    pub fn freeze(&self) -> Array {
        Array {
            items: Arc::clone(&self.items),
        }
    }
}

impl fmt::Debug for MutableArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

/// Read-only mapping of unique keys to values
///
/// Equality ignores entry order; hashing is order-independent to match.
#[derive(Clone, Default)]
pub struct Dictionary {
    entries: Arc<IndexMap<String, Value>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.entries.iter()
    }

    /// Editable copy sharing this dictionary's storage until first write
    pub fn to_mutable(&self) -> MutableDictionary {
        MutableDictionary {
            entries: Arc::clone(&self.entries),
        }
    }

    pub fn to_map(&self) -> IndexMap<String, Value> {
        (*self.entries).clone()
    }

    pub(crate) fn make_mut(&mut self) -> &mut IndexMap<String, Value> {
        Arc::make_mut(&mut self.entries)
    }
}

impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries) || *self.entries == *other.entries
    }
}

impl Hash for Dictionary {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_entries(&self.entries, state)
    }
}

fn hash_entries<H: Hasher>(entries: &IndexMap<String, Value>, state: &mut H) {
    let combined = entries.iter().fold(0u64, |acc, (key, value)| {
        let mut entry = DefaultHasher::new();
        key.hash(&mut entry);
        value.hash(&mut entry);
        acc.wrapping_add(entry.finish())
    });
    entries.len().hash(state);
    combined.hash(state);
}

impl From<IndexMap<String, Value>> for Dictionary {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect::<IndexMap<_, _>>(),
        )
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in self.entries.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Dictionary(dict) => Ok(dict),
            _ => Err(serde::de::Error::custom("document body root must be a dictionary")),
        }
    }
}

/// Editable companion of [`Dictionary`]; preserves insertion order
#[derive(Clone, Default)]
pub struct MutableDictionary {
    entries: Arc<IndexMap<String, Value>>,
}

impl MutableDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only snapshot sharing this dictionary's current storage
    pub fn freeze(&self) -> Dictionary {
        Dictionary {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl PartialEq for MutableDictionary {
    fn eq(&self, other: &Self) -> bool {
        *self.entries == *other.entries
    }
}

impl fmt::Debug for MutableDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// Typed, total read access by key
///
/// Getters never fail: a missing key or an incompatible stored type yields
/// `None` or the type's zero value. Floats read through the integer getters
/// truncate toward zero; booleans read as 1 and 0.
pub trait Properties {
    /// Raw value stored under `key`; `Some(Value::Null)` for an explicit null
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Property keys, stable for a given content snapshot
    fn keys(&self) -> Vec<String>;

    fn contains(&self, key: &str) -> bool;

    fn count(&self) -> usize;

    /// Full copy of the content as a plain map
    fn to_map(&self) -> IndexMap<String, Value>;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.get_value(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn get_number(&self, key: &str) -> Option<Number> {
        self.get_value(key)?.as_number()
    }

    fn get_int(&self, key: &str) -> i32 {
        self.get_number(key).map_or(0, |n| n.to_i32())
    }

    fn get_long(&self, key: &str) -> i64 {
        self.get_number(key).map_or(0, |n| n.to_i64())
    }

    fn get_float(&self, key: &str) -> f32 {
        self.get_double(key) as f32
    }

    fn get_double(&self, key: &str) -> f64 {
        self.get_number(key).map_or(0.0, |n| n.to_f64())
    }

    fn get_boolean(&self, key: &str) -> bool {
        self.get_value(key).is_some_and(|v| v.to_bool())
    }

    fn get_date(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_value(key)?.as_date()
    }

    fn get_blob(&self, key: &str) -> Option<Blob> {
        match self.get_value(key)? {
            Value::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    fn get_array(&self, key: &str) -> Option<Array> {
        match self.get_value(key)? {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    fn get_dictionary(&self, key: &str) -> Option<Dictionary> {
        match self.get_value(key)? {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.to_map()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Setters shared by every editable keyed container
pub trait MutableProperties: Properties {
    /// Storage the setters write through to
    fn entries_mut(&mut self) -> &mut IndexMap<String, Value>;

    fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self
    where
        Self: Sized,
    {
        self.entries_mut().insert(key.into(), value.into());
        self
    }

    fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, Value::String(value.into()))
    }

    fn set_int(&mut self, key: impl Into<String>, value: i32) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn set_long(&mut self, key: impl Into<String>, value: i64) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn set_float(&mut self, key: impl Into<String>, value: f32) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn set_double(&mut self, key: impl Into<String>, value: f64) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn set_boolean(&mut self, key: impl Into<String>, value: bool) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn set_date(&mut self, key: impl Into<String>, value: DateTime<Utc>) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn set_blob(&mut self, key: impl Into<String>, value: Blob) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn set_array(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn set_dictionary(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    /// JSON objects are stored as dictionaries and JSON arrays as arrays
    fn set_json(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self
    where
        Self: Sized,
    {
        self.set_value(key, value)
    }

    fn remove(&mut self, key: &str) -> &mut Self
    where
        Self: Sized,
    {
        self.entries_mut().shift_remove(key);
        self
    }

    /// Replaces the whole content
    fn set_data<K, I>(&mut self, data: I) -> &mut Self
    where
        Self: Sized,
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let entries = self.entries_mut();
        entries.clear();
        entries.extend(data.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }
}

impl Properties for Dictionary {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.contains_key(key)
    }

    fn count(&self) -> usize {
        self.len()
    }

    fn to_map(&self) -> IndexMap<String, Value> {
        Dictionary::to_map(self)
    }
}

impl Properties for MutableDictionary {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn count(&self) -> usize {
        self.entries.len()
    }

    fn to_map(&self) -> IndexMap<String, Value> {
        (*self.entries).clone()
    }
}

impl MutableProperties for MutableDictionary {
    fn entries_mut(&mut self) -> &mut IndexMap<String, Value> {
        Arc::make_mut(&mut self.entries)
    }
}
