//! Database handle: document persistence through a storage engine

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::codec::{DecodeContext, EncodedBody, EncoderSession, SharedEncoder};
use crate::collection::Dictionary;
use crate::config::DatabaseConfig;
use crate::document::Document;
use crate::engine::{ConcurrencyControl, SaveRequest, StorageEngine};
use crate::error::{Error, Result};
use crate::handle::RevisionHandle;
use crate::mutable::MutableDocument;

/// Capacity of the change feed before slow subscribers start lagging
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// What happened to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Saved,
    Deleted,
    Purged,
}

/// Change notification published after every save, delete and purge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub document_id: String,
    /// New revision; `None` after a purge
    pub revision_id: Option<String>,
    pub sequence: u64,
    pub kind: ChangeKind,
}

/// An open database
///
/// Cheap to clone; clones share the engine, the decode lock and the change
/// feed.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    name: String,
    config: DatabaseConfig,
    path: std::path::PathBuf,
    engine: Arc<dyn StorageEngine>,
    /// Database-scoped lock taken while materializing document content
    decoder: Mutex<DecodeContext>,
    encoder: Mutex<SharedEncoder>,
    changes: broadcast::Sender<DocumentChange>,
    closed: AtomicBool,
}

impl Database {
    /// Open the database called `name` on top of `engine`
    pub fn open(
        name: &str,
        config: &DatabaseConfig,
        engine: Arc<dyn StorageEngine>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("database name cannot be empty".into()));
        }
        crate::initialize();

        let config = config.read_only_copy();
        let path = config.database_path(name);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        info!(database = name, path = %path.display(), "opened database");

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                name: name.to_string(),
                config,
                path,
                decoder: Mutex::new(DecodeContext::new(Arc::clone(&engine))),
                encoder: Mutex::new(SharedEncoder::new()),
                engine,
                changes,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Read-only copy of the configuration the database was opened with
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.inner.engine
    }

    /// Whether both handles refer to the database at the same storage path
    pub fn same_path(&self, other: &Database) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.path == other.inner.path
    }

    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            info!(database = %self.inner.name, "closed database");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::IllegalState(format!(
                "database {} is closed",
                self.inner.name
            )));
        }
        Ok(())
    }

    /// Current revision of a document; `None` if it does not exist or is deleted
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        match Document::fetch(self, id, false) {
            Ok(doc) => Ok(Some(doc)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Save under last-write-wins
    pub fn save(&self, doc: &mut MutableDocument) -> Result<()> {
        self.save_with(doc, ConcurrencyControl::LastWriteWins)
    }

    /// Save the staged content as a new revision and rebind `doc` to it.
    ///
    /// On failure the document keeps its binding and its staged edits.
    pub fn save_with(
        &self,
        doc: &mut MutableDocument,
        concurrency: ConcurrencyControl,
    ) -> Result<()> {
        self.ensure_open()?;
        self.check_owner(doc.as_document())?;

        let expected = doc.as_document().binding().current_handle();
        let encoded = self.encode(&doc.content())?;
        let handle = self.inner.engine.save(SaveRequest {
            document_id: doc.id(),
            body: encoded.body,
            attachments: encoded.attachments,
            expected: expected.as_ref(),
            deletion: false,
            concurrency,
        });
        let handle = handle.map_err(|err| {
            debug!(document_id = doc.id(), %concurrency, error = %err, "save rejected");
            Error::from(err)
        })?;

        debug!(
            document_id = doc.id(),
            revision_id = ?handle.selected_revision_id(),
            sequence = handle.selected_sequence(),
            %concurrency,
            "saved document"
        );
        self.publish(&handle, ChangeKind::Saved);
        doc.as_document().attach(self, handle);
        Ok(())
    }

    /// Delete under last-write-wins
    pub fn delete(&self, doc: &Document) -> Result<()> {
        self.delete_with(doc, ConcurrencyControl::LastWriteWins)
    }

    /// Store a tombstone revision and rebind `doc` to it
    pub fn delete_with(&self, doc: &Document, concurrency: ConcurrencyControl) -> Result<()> {
        self.ensure_open()?;
        self.check_owner(doc)?;

        let expected = doc
            .binding()
            .current_handle()
            .ok_or_else(|| Error::NotFound(format!("{} has never been saved", doc.id())))?;
        let handle = self.inner.engine.save(SaveRequest {
            document_id: doc.id(),
            body: Bytes::new(),
            attachments: Vec::new(),
            expected: Some(&expected),
            deletion: true,
            concurrency,
        })?;

        debug!(
            document_id = doc.id(),
            revision_id = ?handle.selected_revision_id(),
            %concurrency,
            "deleted document"
        );
        self.publish(&handle, ChangeKind::Deleted);
        doc.attach(self, handle);
        Ok(())
    }

    /// Remove every revision of the document; `doc` is left unbound
    pub fn purge(&self, doc: &Document) -> Result<()> {
        self.ensure_open()?;
        self.check_owner(doc)?;

        let handle = doc
            .binding()
            .current_handle()
            .ok_or_else(|| Error::NotFound(format!("{} has never been saved", doc.id())))?;
        self.inner.engine.purge(&handle)?;

        debug!(document_id = doc.id(), "purged document");
        self.publish_change(DocumentChange {
            document_id: doc.id().to_string(),
            revision_id: None,
            sequence: self.inner.engine.last_sequence(),
            kind: ChangeKind::Purged,
        });
        doc.binding().bind(None);
        Ok(())
    }

    pub fn document_count(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.inner.engine.document_count())
    }

    pub fn last_sequence(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.inner.engine.last_sequence())
    }

    /// Subscribe to document changes
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.inner.changes.subscribe()
    }

    /// Runs `f` holding the database-scoped decode lock
    pub(crate) fn with_decode_context<R>(&self, f: impl FnOnce(&mut DecodeContext) -> R) -> R {
        let mut context = self.inner.decoder.lock();
        f(&mut context)
    }

    fn encode(&self, content: &Dictionary) -> Result<EncodedBody> {
        EncoderSession::new(self.inner.encoder.lock()).encode(content)
    }

    fn check_owner(&self, doc: &Document) -> Result<()> {
        match doc.database() {
            Some(owner) if !owner.same_path(self) => Err(Error::InvalidArgument(format!(
                "document {} belongs to database {}",
                doc.id(),
                owner.name()
            ))),
            _ => Ok(()),
        }
    }

    fn publish(&self, handle: &RevisionHandle, kind: ChangeKind) {
        self.publish_change(DocumentChange {
            document_id: handle.document_id().to_string(),
            revision_id: handle.selected_revision_id(),
            sequence: handle.selected_sequence(),
            kind,
        });
    }

    fn publish_change(&self, change: DocumentChange) {
        let _ = self.inner.changes.send(change);
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
