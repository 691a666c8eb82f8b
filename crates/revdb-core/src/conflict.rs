//! Conflict resolution: exposing a conflicting sibling leaf
//!
//! The resolver never merges. It moves a document onto the first leaf the
//! engine flags as conflicting and leaves the merge to the caller.

use tracing::debug;

use crate::document::Document;
use crate::error::Result;
use crate::handle::RevisionHandle;

impl Document {
    /// Rebind to the next conflicting leaf of this document's revision tree.
    ///
    /// Returns `Ok(false)` when the traversal runs out of leaves without
    /// finding one, in which case the binding is untouched. Traversal errors
    /// other than running out of leaves are propagated.
    pub fn select_conflicting_revision(&self) -> Result<bool> {
        let previous = {
            let mut state = self.binding().lock();
            let Some(current) = state.handle() else {
                return Ok(false);
            };

            // the bound cursor is shared; walk a private copy
            let cursor = current.duplicate()?;
            let Some(found) = next_conflict(cursor)? else {
                debug!(document_id = self.id(), "no conflicting revision");
                return Ok(false);
            };

            debug!(
                document_id = self.id(),
                revision_id = ?found.selected_revision_id(),
                "selected conflicting revision"
            );
            state.replace(Some(found))
        };
        drop(previous);
        Ok(true)
    }
}

fn next_conflict(cursor: RevisionHandle) -> Result<Option<RevisionHandle>> {
    while cursor.select_next_leaf(true, true)? {
        if cursor.flags().conflict {
            return Ok(Some(cursor));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::codec::encode_body;
    use crate::collection::{Dictionary, MutableProperties, Properties};
    use crate::document::DocumentId;
    use crate::error::{EngineError, Error};
    use crate::handle::{NativeRevision, RefCount, RevisionFlags};
    use crate::value::Value;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Leaf {
        revision_id: &'static str,
        conflict: bool,
        body: Bytes,
    }

    /// Cursor over a fixed list of leaves
    #[derive(Debug)]
    struct LeafCursor {
        refs: RefCount,
        leaves: Arc<Vec<Leaf>>,
        selected: Mutex<usize>,
        fail_traversal: bool,
    }

    impl LeafCursor {
        fn leaf(&self) -> Leaf {
            self.refs.assert_live();
            self.leaves[*self.selected.lock()].clone()
        }
    }

    impl NativeRevision for LeafCursor {
        fn retain(&self) {
            self.refs.retain()
        }

        fn release(&self) {
            self.refs.release();
        }

        fn ref_count(&self) -> usize {
            self.refs.get()
        }

        fn document_id(&self) -> &str {
            "doc1"
        }

        fn selected_revision_id(&self) -> Option<String> {
            Some(self.leaf().revision_id.to_string())
        }

        fn selected_sequence(&self) -> u64 {
            *self.selected.lock() as u64 + 1
        }

        fn flags(&self) -> RevisionFlags {
            RevisionFlags {
                deleted: false,
                conflict: self.leaf().conflict,
            }
        }

        fn exists(&self) -> bool {
            true
        }

        fn raw_body(&self) -> Option<Bytes> {
            Some(self.leaf().body)
        }

        fn select_next_leaf(&self, _: bool, _: bool) -> std::result::Result<bool, EngineError> {
            if self.fail_traversal {
                return Err(EngineError::Storage("revision tree unreadable".into()));
            }
            let mut selected = self.selected.lock();
            if *selected + 1 >= self.leaves.len() {
                return Ok(false);
            }
            *selected += 1;
            Ok(true)
        }

        fn duplicate(&self) -> std::result::Result<Arc<dyn NativeRevision>, EngineError> {
            Ok(Arc::new(LeafCursor {
                refs: RefCount::new(),
                leaves: Arc::clone(&self.leaves),
                selected: Mutex::new(*self.selected.lock()),
                fail_traversal: self.fail_traversal,
            }))
        }
    }

    fn leaf(revision_id: &'static str, conflict: bool, name: &str) -> Leaf {
        let content = Dictionary::from_iter([("name", Value::from(name))]);
        Leaf {
            revision_id,
            conflict,
            body: encode_body(&content).unwrap(),
        }
    }

    fn document(leaves: Vec<Leaf>, fail_traversal: bool) -> (Document, Arc<LeafCursor>) {
        let raw = Arc::new(LeafCursor {
            refs: RefCount::new(),
            leaves: Arc::new(leaves),
            selected: Mutex::new(0),
            fail_traversal,
        });
        let handle = RevisionHandle::adopt(raw.clone());
        let doc = Document::from_parts(
            DocumentId::new("doc1").unwrap(),
            Binding::new(None, Some(handle)),
        );
        (doc, raw)
    }

    #[test]
    fn test_selects_first_conflicting_leaf() {
        let (doc, raw) = document(
            vec![
                leaf("3-a", false, "winner"),
                leaf("2-b", false, "plain"),
                leaf("2-c", true, "loser"),
                leaf("2-d", true, "other"),
            ],
            false,
        );
        assert_eq!(doc.get_string("name").as_deref(), Some("winner"));

        assert!(doc.select_conflicting_revision().unwrap());
        assert_eq!(doc.revision_id().as_deref(), Some("2-c"));
        assert_eq!(doc.get_string("name").as_deref(), Some("loser"));

        // original cursor was not advanced, and its count was handed back
        assert_eq!(*raw.selected.lock(), 0);
        assert_eq!(raw.refs.get(), 0);
    }

    #[test]
    fn test_no_conflict_leaves_binding_unchanged() {
        let (doc, raw) = document(
            vec![leaf("2-a", false, "winner"), leaf("1-b", false, "old")],
            false,
        );
        assert!(!doc.select_conflicting_revision().unwrap());
        assert_eq!(doc.revision_id().as_deref(), Some("2-a"));
        assert_eq!(doc.get_string("name").as_deref(), Some("winner"));
        assert_eq!(raw.refs.get(), 1);
    }

    #[test]
    fn test_unbound_document_has_no_conflict() {
        let doc = Document::from_parts(
            DocumentId::new("doc1").unwrap(),
            Binding::new(None, None),
        );
        assert!(!doc.select_conflicting_revision().unwrap());
    }

    #[test]
    fn test_traversal_failure_propagates() {
        let (doc, _) = document(vec![leaf("1-a", false, "only")], true);
        assert!(matches!(
            doc.select_conflicting_revision(),
            Err(Error::Engine(EngineError::Storage(_)))
        ));
        assert_eq!(doc.revision_id().as_deref(), Some("1-a"));
    }

    #[test]
    fn test_mutable_document_reseeds_staged_graph() {
        let (doc, _) = document(
            vec![leaf("3-a", false, "winner"), leaf("2-c", true, "loser")],
            false,
        );
        let mut staged = doc.to_mutable();
        staged.set_value("name", "edited");

        assert!(staged.select_conflicting_revision().unwrap());
        assert_eq!(staged.revision_id().as_deref(), Some("2-c"));
        assert_eq!(staged.get_string("name").as_deref(), Some("loser"));
        // the source document keeps its own binding
        assert_eq!(doc.revision_id().as_deref(), Some("3-a"));
    }
}
