//! Document types and operations

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::binding::Binding;
use crate::collection::{Dictionary, Properties};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::handle::RevisionHandle;
use crate::mutable::MutableDocument;
use crate::value::Value;

/// Document identifier - any non-empty UTF-8 string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidArgument("Document ID cannot be empty".into()));
        }

        Ok(Self(id))
    }

    /// Random identifier for a document created without one
    pub fn random() -> Self {
        Self(format!("-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation encoded in a revision id's leading digits.
///
/// Only the first nine characters are considered; a missing `-` separator,
/// a non-digit or an absent id yields 0.
pub fn generation_from_revision_id(revision_id: Option<&str>) -> u64 {
    let Some(revision_id) = revision_id else {
        return 0;
    };
    let mut generation = 0u64;
    for c in revision_id.chars().take(9) {
        match c {
            '0'..='9' => generation = generation * 10 + u64::from(c as u8 - b'0'),
            '-' => return generation,
            _ => break,
        }
    }
    0
}

/// Read-only view of one revision of a document
///
/// Reads go through a lazily decoded, cached root that is dropped whenever
/// the document is rebound to another revision.
pub struct Document {
    id: DocumentId,
    binding: Binding,
}

impl Document {
    pub(crate) fn from_parts(id: DocumentId, binding: Binding) -> Self {
        Self { id, binding }
    }

    /// Load the current revision of `id`.
    ///
    /// Fails with `NotFound` when the document does not exist, or is deleted
    /// and `include_deleted` is false.
    pub fn fetch(database: &Database, id: &str, include_deleted: bool) -> Result<Self> {
        let id = DocumentId::new(id)?;
        database.ensure_open()?;

        let handle = database.engine().get(id.as_str(), include_deleted)?;
        if !include_deleted && handle.flags().deleted {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(Self::from_parts(
            id,
            Binding::new(Some(database.clone()), Some(handle)),
        ))
    }

    /// Wrap a handle obtained outside this layer, e.g. pushed by replication
    pub fn from_handle(database: &Database, handle: RevisionHandle) -> Result<Self> {
        database.ensure_open()?;
        let id = DocumentId::new(handle.document_id())?;
        Ok(Self::from_parts(
            id,
            Binding::new(Some(database.clone()), Some(handle)),
        ))
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Opaque id of the bound revision; `None` until first saved
    pub fn revision_id(&self) -> Option<String> {
        self.binding
            .lock()
            .handle()
            .and_then(|h| h.selected_revision_id())
    }

    /// Database sequence of the bound revision; 0 until first saved
    pub fn sequence(&self) -> u64 {
        self.binding
            .lock()
            .handle()
            .map_or(0, |h| h.selected_sequence())
    }

    pub fn generation(&self) -> u64 {
        generation_from_revision_id(self.revision_id().as_deref())
    }

    pub fn is_deleted(&self) -> bool {
        self.binding
            .lock()
            .handle()
            .is_some_and(|h| h.flags().deleted)
    }

    /// Whether the bound revision is persisted
    pub fn exists(&self) -> bool {
        self.binding.lock().handle().is_some_and(|h| h.exists())
    }

    pub fn is_new(&self) -> bool {
        self.revision_id().is_none()
    }

    pub fn database(&self) -> Option<Database> {
        self.binding.lock().database().cloned()
    }

    /// Editable copy bound to the same revision
    pub fn to_mutable(&self) -> MutableDocument {
        MutableDocument::from_document(self)
    }

    pub(crate) fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Associate with `database` and bind the revision it just stored
    pub(crate) fn attach(&self, database: &Database, handle: RevisionHandle) {
        let previous = {
            let mut state = self.binding.lock();
            state.set_database(database.clone());
            state.replace(Some(handle))
        };
        drop(previous);
    }

    /// Copy sharing this document's database, handle and content
    pub(crate) fn derived_copy(&self) -> (Document, Dictionary) {
        let mut state = self.binding.lock();
        let root = state.root().clone();
        let binding = Binding::seeded(
            state.database().cloned(),
            state.handle().cloned(),
            root.clone(),
        );
        (Document::from_parts(self.id.clone(), binding), root)
    }

    /// Database path and content, read under one lock acquisition
    pub(crate) fn snapshot(&self) -> (Option<PathBuf>, Dictionary) {
        let mut state = self.binding.lock();
        let path = state.database().map(|db| db.path().to_path_buf());
        (path, state.root().clone())
    }
}

impl Properties for Document {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.binding.lock().root().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.binding.lock().root().keys().cloned().collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.binding.lock().root().contains_key(key)
    }

    fn count(&self) -> usize {
        self.binding.lock().root().len()
    }

    fn to_map(&self) -> IndexMap<String, Value> {
        self.binding.lock().root().to_map()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys().into_iter()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.id != other.id {
            return false;
        }
        // one lock at a time; never hold both documents' locks
        let (path, content) = self.snapshot();
        let (other_path, other_content) = other.snapshot();
        path == other_path && content == other_content
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (path, content) = self.snapshot();
        path.hash(state);
        self.id.hash(state);
        content.hash(state);
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("revision_id", &self.revision_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_body;
    use crate::handle::testing::StubRevision;
    use std::collections::hash_map::DefaultHasher;

    fn bound(id: &str, revision_id: &str, content: Dictionary) -> Document {
        let (handle, _) =
            StubRevision::handle(id, revision_id, 1, Some(encode_body(&content).unwrap()));
        Document::from_parts(DocumentId::new(id).unwrap(), Binding::new(None, Some(handle)))
    }

    fn hash_of(doc: &Document) -> u64 {
        let mut hasher = DefaultHasher::new();
        doc.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_document_id_valid() {
        assert!(DocumentId::new("user:123").is_ok());
        assert!(DocumentId::new("cart items/456").is_ok());
        assert!(DocumentId::random().as_str().starts_with('-'));
    }

    #[test]
    fn test_document_id_invalid() {
        assert!(matches!(DocumentId::new(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_generation_from_revision_id() {
        assert_eq!(generation_from_revision_id(Some("1-abc")), 1);
        assert_eq!(generation_from_revision_id(Some("42-deadbeef")), 42);
        assert_eq!(generation_from_revision_id(Some("12345678-x")), 12345678);
        assert_eq!(generation_from_revision_id(Some("1234567890-x")), 0);
        assert_eq!(generation_from_revision_id(Some("abc")), 0);
        assert_eq!(generation_from_revision_id(Some("17")), 0);
        assert_eq!(generation_from_revision_id(None), 0);
    }

    #[test]
    fn test_identity_follows_handle() {
        let doc = bound("doc1", "3-abc", Dictionary::new());
        assert_eq!(doc.id(), "doc1");
        assert_eq!(doc.revision_id().as_deref(), Some("3-abc"));
        assert_eq!(doc.sequence(), 1);
        assert_eq!(doc.generation(), 3);
        assert!(doc.exists());
        assert!(!doc.is_new());
        assert!(!doc.is_deleted());
    }

    #[test]
    fn test_unbound_document() {
        let doc = Document::from_parts(DocumentId::new("doc1").unwrap(), Binding::new(None, None));
        assert_eq!(doc.revision_id(), None);
        assert_eq!(doc.sequence(), 0);
        assert!(!doc.exists());
        assert!(doc.is_new());
        assert!(doc.is_empty());
        assert_eq!(doc.get_string("anything"), None);
    }

    #[test]
    fn test_getters_read_content() {
        let content = Dictionary::from_iter([
            ("name", Value::from("Alice")),
            ("ratio", Value::from(3.9)),
        ]);
        let doc = bound("doc1", "1-a", content);
        assert_eq!(doc.get_string("name").as_deref(), Some("Alice"));
        assert_eq!(doc.get_int("ratio"), 3);
        assert!(doc.contains("ratio"));
        assert!(!doc.contains("missing"));
        assert_eq!(doc.count(), 2);

        let keys: Vec<String> = (&doc).into_iter().collect();
        assert_eq!(keys, vec!["name", "ratio"]);
    }

    #[test]
    fn test_equality_and_hash() {
        let content = Dictionary::from_iter([("k", Value::from(1i64))]);
        let a = bound("doc1", "1-a", content.clone());
        let b = bound("doc1", "2-b", content.clone());
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let other_id = bound("doc2", "1-a", content);
        assert_ne!(a, other_id);

        let other_content = bound("doc1", "1-a", Dictionary::from_iter([("k", Value::from(2i64))]));
        assert_ne!(a, other_content);
    }

    #[test]
    fn test_to_mutable_preserves_content() {
        let content = Dictionary::from_iter([("name", Value::from("Alice"))]);
        let doc = bound("doc1", "1-a", content);
        let copy = doc.to_mutable();
        assert_eq!(copy.to_map(), doc.to_map());
        assert_eq!(copy.revision_id(), doc.revision_id());
    }
}
