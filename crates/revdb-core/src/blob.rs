//! Binary attachments

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::value::{Number, Value};

/// Marker stored under `@type` in a blob's metadata dictionary
pub const BLOB_TYPE: &str = "blob";

const TYPE_KEY: &str = "@type";
const CONTENT_TYPE_KEY: &str = "content_type";
const DIGEST_KEY: &str = "digest";
const LENGTH_KEY: &str = "length";

/// Binary content referenced from a document
///
/// Bodies only carry the blob's metadata; the content itself is registered
/// with the save and kept by the engine, keyed by digest. Two blobs are equal
/// when their digests are.
#[derive(Clone)]
pub struct Blob {
    content_type: String,
    length: u64,
    digest: String,
    content: Option<Bytes>,
}

impl Blob {
    pub fn new(content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            content_type: content_type.into(),
            length: content.len() as u64,
            digest: digest_of(&content),
            content: Some(content),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Content, if loaded. Blobs decoded from a body whose content the engine
    /// no longer holds have metadata only.
    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub(crate) fn attach_content(&mut self, content: Bytes) {
        self.content = Some(content);
    }

    /// Metadata dictionary as stored in a document body
    pub fn properties(&self) -> IndexMap<String, Value> {
        let mut props = IndexMap::with_capacity(4);
        props.insert(TYPE_KEY.to_string(), Value::from(BLOB_TYPE));
        props.insert(CONTENT_TYPE_KEY.to_string(), Value::from(self.content_type.as_str()));
        props.insert(DIGEST_KEY.to_string(), Value::from(self.digest.as_str()));
        props.insert(
            LENGTH_KEY.to_string(),
            Value::Number(Number::Integer(self.length as i64)),
        );
        props
    }

    /// Recognizes a decoded metadata dictionary
    pub(crate) fn from_properties(props: &IndexMap<String, Value>) -> Option<Self> {
        if props.get(TYPE_KEY)?.as_str()? != BLOB_TYPE {
            return None;
        }
        let digest = props.get(DIGEST_KEY)?.as_str()?.to_string();
        let content_type = props
            .get(CONTENT_TYPE_KEY)
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream")
            .to_string();
        let length = props
            .get(LENGTH_KEY)
            .and_then(Value::as_number)
            .map_or(0, |n| n.to_i64().max(0) as u64);

        Some(Self {
            content_type,
            length,
            digest,
            content: None,
        })
    }
}

/// `blake3-<hex>` digest identifying blob content
pub fn digest_of(content: &[u8]) -> String {
    format!("blake3-{}", hex::encode(blake3::hash(content).as_bytes()))
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Hash for Blob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("content_type", &self.content_type)
            .field("length", &self.length)
            .field("digest", &self.digest)
            .field("loaded", &self.content.is_some())
            .finish()
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry(TYPE_KEY, BLOB_TYPE)?;
        map.serialize_entry(CONTENT_TYPE_KEY, &self.content_type)?;
        map.serialize_entry(DIGEST_KEY, &self.digest)?;
        map.serialize_entry(LENGTH_KEY, &self.length)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_metadata() {
        let blob = Blob::new("text/plain", &b"hello"[..]);
        assert_eq!(blob.length(), 5);
        assert!(blob.digest().starts_with("blake3-"));
        assert_eq!(blob.content().map(|c| c.as_ref()), Some(&b"hello"[..]));
    }

    #[test]
    fn test_equality_by_digest() {
        let a = Blob::new("text/plain", &b"same"[..]);
        let b = Blob::new("application/octet-stream", &b"same"[..]);
        let c = Blob::new("text/plain", &b"other"[..]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_properties_round_trip() {
        let blob = Blob::new("image/png", vec![1u8, 2, 3]);
        let restored = Blob::from_properties(&blob.properties()).unwrap();
        assert_eq!(restored, blob);
        assert_eq!(restored.content_type(), "image/png");
        assert_eq!(restored.length(), 3);
        assert!(restored.content().is_none());
    }

    #[test]
    fn test_plain_dictionary_is_not_a_blob() {
        let mut props = IndexMap::new();
        props.insert("digest".to_string(), Value::from("blake3-00"));
        assert!(Blob::from_properties(&props).is_none());
    }
}
