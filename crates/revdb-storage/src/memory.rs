//! In-memory storage engine

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use revdb_core::{
    generation_from_revision_id, ConcurrencyControl, EngineError, NativeRevision, RefCount,
    RevisionFlags, RevisionHandle, SaveRequest, StorageEngine,
};
use tracing::{debug, trace};

use crate::tree::{NewRevision, RevTree};

/// In-memory revision-tree engine
///
/// Fast, volatile storage suitable for development and tests.
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    /// Document id -> revision tree; trees are replaced, never mutated in place
    documents: DashMap<String, Arc<RevTree>>,
    /// Blob digest -> content
    blobs: DashMap<String, Bytes>,
    sequence: AtomicU64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a revision created elsewhere, as replication does.
    ///
    /// A revision whose parent is not the winning leaf becomes a conflicting
    /// leaf. Inserting a revision that already exists selects it. `body` is
    /// `None` for a tombstone.
    pub fn put_existing_revision(
        &self,
        document_id: &str,
        revision_id: &str,
        parent_revision_id: Option<&str>,
        body: Option<Bytes>,
    ) -> Result<RevisionHandle, EngineError> {
        let generation = generation_from_revision_id(Some(revision_id));
        if generation == 0 {
            return Err(EngineError::Storage(format!(
                "malformed revision id {}",
                revision_id
            )));
        }

        let mut entry = match self.documents.entry(document_id.to_string()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                if let Some(parent_id) = parent_revision_id {
                    return Err(EngineError::NotFound(format!(
                        "{} has no revision {}",
                        document_id, parent_id
                    )));
                }
                entry.insert(Arc::default())
            }
        };
        if let Some(existing) = entry.find(revision_id) {
            return Ok(self.cursor(document_id, Arc::clone(entry.value()), existing));
        }

        let mut tree = RevTree::clone(entry.value());
        let parent = match parent_revision_id {
            Some(parent_id) => Some(tree.find(parent_id).ok_or_else(|| {
                EngineError::NotFound(format!("{} has no revision {}", document_id, parent_id))
            })?),
            None => None,
        };
        let winner = tree.current();
        let conflict = body.is_some()
            && winner.is_some_and(|w| !tree.get(w).deleted && Some(w) != parent);

        let sequence = self.next_sequence();
        let index = tree.insert(NewRevision {
            id: Some(revision_id.to_string()),
            parent,
            generation,
            sequence,
            body,
            conflict,
        });

        debug!(document_id, revision_id, sequence, conflict, "inserted existing revision");
        let tree = Arc::new(tree);
        *entry.value_mut() = Arc::clone(&tree);
        Ok(self.cursor(document_id, tree, index))
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn cursor(&self, document_id: &str, tree: Arc<RevTree>, selected: usize) -> RevisionHandle {
        RevisionHandle::adopt(Arc::new(MemoryRevision::new(document_id, tree, selected)))
    }

    /// Copy of `current` with the requested revision appended
    fn next_tree(
        &self,
        current: Option<&RevTree>,
        request: &SaveRequest<'_>,
    ) -> Result<(RevTree, usize), EngineError> {
        let mut tree = current.cloned().unwrap_or_default();
        let winner = tree.current();

        let parent = match request.concurrency {
            ConcurrencyControl::LastWriteWins => winner,
            ConcurrencyControl::Optimistic => {
                let expected = request.expected.and_then(|h| h.selected_revision_id());
                match expected {
                    Some(expected) => match tree.find(&expected) {
                        Some(index) if tree.get(index).leaf => Some(index),
                        _ => {
                            return Err(EngineError::Conflict(format!(
                                "{} has moved past revision {}",
                                request.document_id, expected
                            )))
                        }
                    },
                    None => match winner {
                        Some(w) if !tree.get(w).deleted => {
                            return Err(EngineError::Conflict(format!(
                                "{} already exists",
                                request.document_id
                            )))
                        }
                        other => other,
                    },
                }
            }
        };

        if request.deletion && parent.is_none() {
            return Err(EngineError::NotFound(request.document_id.to_string()));
        }

        let body = (!request.deletion).then(|| request.body.clone());
        let conflict = !request.deletion && parent.is_some_and(|p| tree.get(p).conflict);
        let generation = parent.map_or(1, |p| tree.get(p).generation + 1);
        let index = tree.insert(NewRevision {
            id: None,
            parent,
            generation,
            sequence: self.next_sequence(),
            body,
            conflict,
        });
        Ok((tree, index))
    }
}

impl StorageEngine for MemoryEngine {
    fn get(&self, document_id: &str, include_deleted: bool) -> Result<RevisionHandle, EngineError> {
        let tree = self
            .documents
            .get(document_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::NotFound(document_id.to_string()))?;
        let current = tree
            .current()
            .ok_or_else(|| EngineError::NotFound(document_id.to_string()))?;
        if !include_deleted && tree.get(current).deleted {
            return Err(EngineError::NotFound(document_id.to_string()));
        }

        trace!(document_id, revision_id = %tree.get(current).id, "fetched document");
        Ok(self.cursor(document_id, tree, current))
    }

    fn save(&self, request: SaveRequest<'_>) -> Result<RevisionHandle, EngineError> {
        let (tree, index) = match self.documents.entry(request.document_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let (tree, index) = self.next_tree(Some(entry.get().as_ref()), &request)?;
                let tree = Arc::new(tree);
                entry.insert(Arc::clone(&tree));
                (tree, index)
            }
            Entry::Vacant(entry) => {
                let (tree, index) = self.next_tree(None, &request)?;
                let tree = Arc::new(tree);
                entry.insert(Arc::clone(&tree));
                (tree, index)
            }
        };

        for blob in &request.attachments {
            if let Some(content) = blob.content() {
                self.blobs.insert(blob.digest().to_string(), content.clone());
            }
        }

        let revision = tree.get(index);
        debug!(
            document_id = request.document_id,
            revision_id = %revision.id,
            sequence = revision.sequence,
            deleted = revision.deleted,
            attachments = request.attachments.len(),
            "stored revision"
        );
        Ok(self.cursor(request.document_id, tree, index))
    }

    fn purge(&self, handle: &RevisionHandle) -> Result<(), EngineError> {
        match self.documents.remove(handle.document_id()) {
            Some((_, tree)) => {
                debug!(
                    document_id = handle.document_id(),
                    revisions = tree.len(),
                    "purged document"
                );
                Ok(())
            }
            None => Err(EngineError::NotFound(handle.document_id().to_string())),
        }
    }

    fn blob(&self, digest: &str) -> Option<Bytes> {
        self.blobs.get(digest).map(|entry| entry.value().clone())
    }

    fn document_count(&self) -> u64 {
        self.documents.iter().filter(|e| !e.is_deleted()).count() as u64
    }

    fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

/// Cursor over a snapshot of one document's revision tree
#[derive(Debug)]
pub struct MemoryRevision {
    refs: RefCount,
    document_id: String,
    tree: Arc<RevTree>,
    selected: Mutex<usize>,
}

impl MemoryRevision {
    fn new(document_id: &str, tree: Arc<RevTree>, selected: usize) -> Self {
        Self {
            refs: RefCount::new(),
            document_id: document_id.to_string(),
            tree,
            selected: Mutex::new(selected),
        }
    }

    fn selected(&self) -> usize {
        self.refs.assert_live();
        *self.selected.lock()
    }
}

impl NativeRevision for MemoryRevision {
    fn retain(&self) {
        self.refs.retain();
    }

    fn release(&self) {
        if self.refs.release() {
            trace!(document_id = %self.document_id, "released cursor");
        }
    }

    fn ref_count(&self) -> usize {
        self.refs.get()
    }

    fn document_id(&self) -> &str {
        &self.document_id
    }

    fn selected_revision_id(&self) -> Option<String> {
        Some(self.tree.get(self.selected()).id.clone())
    }

    fn selected_sequence(&self) -> u64 {
        self.tree.get(self.selected()).sequence
    }

    fn flags(&self) -> RevisionFlags {
        let revision = self.tree.get(self.selected());
        RevisionFlags {
            deleted: revision.deleted,
            conflict: revision.conflict,
        }
    }

    fn exists(&self) -> bool {
        self.refs.assert_live();
        true
    }

    fn raw_body(&self) -> Option<Bytes> {
        self.tree.get(self.selected()).body.clone()
    }

    fn select_next_leaf(
        &self,
        include_deleted: bool,
        only_conflicts: bool,
    ) -> Result<bool, EngineError> {
        self.refs.assert_live();
        let leaves = self.tree.leaves();
        let mut selected = self.selected.lock();
        let start = leaves
            .iter()
            .position(|&leaf| leaf == *selected)
            .map_or(0, |pos| pos + 1);

        let next = leaves[start..].iter().copied().find(|&leaf| {
            let revision = self.tree.get(leaf);
            (include_deleted || !revision.deleted) && (!only_conflicts || revision.conflict)
        });
        match next {
            Some(leaf) => {
                *selected = leaf;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn duplicate(&self) -> Result<Arc<dyn NativeRevision>, EngineError> {
        Ok(Arc::new(MemoryRevision::new(
            &self.document_id,
            Arc::clone(&self.tree),
            self.selected(),
        )))
    }
}
