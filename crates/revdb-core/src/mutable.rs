//! Editable documents

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use indexmap::IndexMap;

use crate::binding::Binding;
use crate::collection::{Dictionary, MutableDictionary, MutableProperties, Properties};
use crate::database::Database;
use crate::document::{Document, DocumentId};
use crate::error::{Error, Result};
use crate::value::Value;

/// A document with staged edits
///
/// Edits go to an independently owned graph seeded from the bound revision.
/// They are visible to the getters immediately and reach storage only when
/// the document is saved.
pub struct MutableDocument {
    document: Document,
    content: MutableDictionary,
}

impl MutableDocument {
    /// New unsaved document with a random id
    pub fn new() -> Self {
        Self::unsaved(DocumentId::random())
    }

    pub fn with_id(id: &str) -> Result<Self> {
        Ok(Self::unsaved(DocumentId::new(id)?))
    }

    /// New unsaved document with initial content
    pub fn with_data<K, I>(id: &str, data: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut doc = Self::with_id(id)?;
        doc.set_data(data);
        Ok(doc)
    }

    fn unsaved(id: DocumentId) -> Self {
        Self {
            document: Document::from_parts(id, Binding::new(None, None)),
            content: MutableDictionary::new(),
        }
    }

    pub(crate) fn from_document(document: &Document) -> Self {
        let (document, root) = document.derived_copy();
        Self {
            document,
            content: root.to_mutable(),
        }
    }

    pub fn id(&self) -> &str {
        self.document.id()
    }

    pub fn revision_id(&self) -> Option<String> {
        self.document.revision_id()
    }

    pub fn sequence(&self) -> u64 {
        self.document.sequence()
    }

    pub fn generation(&self) -> u64 {
        self.document.generation()
    }

    pub fn is_deleted(&self) -> bool {
        self.document.is_deleted()
    }

    pub fn exists(&self) -> bool {
        self.document.exists()
    }

    pub fn is_new(&self) -> bool {
        self.document.is_new()
    }

    pub fn database(&self) -> Option<Database> {
        self.document.database()
    }

    /// The bound revision as read-only document; reads return persisted
    /// content, not staged edits
    pub fn as_document(&self) -> &Document {
        &self.document
    }

    /// Independent copy with the same binding and staged edits
    pub fn to_mutable(&self) -> MutableDocument {
        let (document, _) = self.document.derived_copy();
        Self {
            document,
            content: self.content.clone(),
        }
    }

    /// Replace the whole content from a JSON object
    pub fn set_data_json(&mut self, data: serde_json::Value) -> Result<&mut Self> {
        match Value::from(data) {
            Value::Dictionary(dict) => {
                self.content = dict.to_mutable();
                Ok(self)
            }
            other => Err(Error::InvalidArgument(format!(
                "document content must be a JSON object, got {}",
                other.to_json()
            ))),
        }
    }

    fn database_path(&self) -> Option<PathBuf> {
        self.database().map(|db| db.path().to_path_buf())
    }

    /// Staged content as it would be encoded on save
    pub(crate) fn content(&self) -> Dictionary {
        self.content.freeze()
    }

    /// Rebind to the next conflicting leaf and replace the staged graph with
    /// its content. Staged edits are discarded only when a conflict is found.
    pub fn select_conflicting_revision(&mut self) -> Result<bool> {
        if !self.document.select_conflicting_revision()? {
            return Ok(false);
        }
        self.content = self.document.binding().lock().root().to_mutable();
        Ok(true)
    }
}

impl Default for MutableDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Document> for MutableDocument {
    fn as_ref(&self) -> &Document {
        &self.document
    }
}

impl Properties for MutableDocument {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.content.get_value(key)
    }

    fn keys(&self) -> Vec<String> {
        self.content.keys()
    }

    fn contains(&self, key: &str) -> bool {
        self.content.contains(key)
    }

    fn count(&self) -> usize {
        self.content.count()
    }

    fn to_map(&self) -> IndexMap<String, Value> {
        self.content.to_map()
    }
}

impl MutableProperties for MutableDocument {
    fn entries_mut(&mut self) -> &mut IndexMap<String, Value> {
        self.content.entries_mut()
    }
}

/// Same identity as [`Document`]: database path, id and content, where the
/// content is the staged graph
impl PartialEq for MutableDocument {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
            && self.database_path() == other.database_path()
            && self.content == other.content
    }
}

impl Eq for MutableDocument {}

impl Hash for MutableDocument {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.database_path().hash(state);
        self.id().hash(state);
        self.content().hash(state);
    }
}

impl PartialEq<Document> for MutableDocument {
    fn eq(&self, other: &Document) -> bool {
        if self.id() != other.id() {
            return false;
        }
        let (path, content) = other.snapshot();
        self.database_path() == path && self.content() == content
    }
}

impl PartialEq<MutableDocument> for Document {
    fn eq(&self, other: &MutableDocument) -> bool {
        other == self
    }
}

impl fmt::Debug for MutableDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableDocument")
            .field("id", &self.id())
            .field("revision_id", &self.revision_id())
            .field("content", &self.content)
            .finish()
    }
}
