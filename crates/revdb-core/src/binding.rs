//! Binding of a document to one revision, plus its cached content
//!
//! The bound handle and the decoded root live in one state cell behind one
//! lock. Rebinding clears the root, so content is always decoded from the
//! handle it is observed with.

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::codec;
use crate::collection::Dictionary;
use crate::database::Database;
use crate::handle::RevisionHandle;

pub(crate) struct Binding {
    state: Mutex<BindingState>,
}

pub(crate) struct BindingState {
    database: Option<Database>,
    handle: Option<RevisionHandle>,
    /// `None` until first access after a (re)bind
    root: Option<Dictionary>,
}

impl Binding {
    pub(crate) fn new(database: Option<Database>, handle: Option<RevisionHandle>) -> Self {
        Self {
            state: Mutex::new(BindingState {
                database,
                handle,
                root: None,
            }),
        }
    }

    /// Binding that starts out with already-materialized content
    pub(crate) fn seeded(
        database: Option<Database>,
        handle: Option<RevisionHandle>,
        root: Dictionary,
    ) -> Self {
        Self {
            state: Mutex::new(BindingState {
                database,
                handle,
                root: Some(root),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock()
    }

    /// Swaps the bound handle. The previous handle is released after the
    /// lock is dropped.
    pub(crate) fn bind(&self, handle: Option<RevisionHandle>) {
        let previous = self.lock().replace(handle);
        drop(previous);
    }

    /// Retained copy of the bound handle
    pub(crate) fn current_handle(&self) -> Option<RevisionHandle> {
        self.lock().handle.clone()
    }
}

impl BindingState {
    pub(crate) fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub(crate) fn set_database(&mut self, database: Database) {
        self.database = Some(database);
    }

    pub(crate) fn handle(&self) -> Option<&RevisionHandle> {
        self.handle.as_ref()
    }

    /// Installs `handle` and invalidates the cached root. Returns the previous
    /// handle; callers drop it once the lock is released.
    #[must_use]
    pub(crate) fn replace(&mut self, handle: Option<RevisionHandle>) -> Option<RevisionHandle> {
        debug!(
            document_id = handle.as_ref().map(|h| h.document_id()),
            revision_id = ?handle.as_ref().and_then(|h| h.selected_revision_id()),
            "rebinding document"
        );
        self.root = None;
        std::mem::replace(&mut self.handle, handle)
    }

    /// Content of the bound revision, decoded on first access
    pub(crate) fn root(&mut self) -> &Dictionary {
        let handle = self.handle.as_ref();
        let database = self.database.as_ref();
        self.root.get_or_insert_with(|| materialize(handle, database))
    }

    #[cfg(test)]
    pub(crate) fn is_materialized(&self) -> bool {
        self.root.is_some()
    }
}

fn materialize(handle: Option<&RevisionHandle>, database: Option<&Database>) -> Dictionary {
    let Some(handle) = handle else {
        return Dictionary::new();
    };
    if handle.flags().deleted {
        return Dictionary::new();
    }
    let Some(body) = handle.raw_body() else {
        return Dictionary::new();
    };

    trace!(
        document_id = handle.document_id(),
        bytes = body.len(),
        "materializing document content"
    );
    let decoded = match database {
        Some(db) => db.with_decode_context(|context| codec::decode(&body, Some(context))),
        None => codec::decode(&body, None),
    };
    decoded.unwrap_or_else(|err| {
        warn!(
            document_id = handle.document_id(),
            error = %err,
            "failed to decode document body"
        );
        Dictionary::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_body;
    use crate::collection::Properties;
    use crate::handle::testing::StubRevision;
    use crate::value::Value;
    use bytes::Bytes;

    fn body(name: &str) -> Bytes {
        encode_body(&Dictionary::from_iter([("name", Value::from(name))])).unwrap()
    }

    #[test]
    fn test_unbound_root_is_empty() {
        let binding = Binding::new(None, None);
        let mut state = binding.lock();
        assert!(state.root().is_empty());
        assert!(state.handle().is_none());
    }

    #[test]
    fn test_rebind_invalidates_root() {
        let (first, _) = StubRevision::handle("doc1", "1-a", 1, Some(body("first")));
        let (second, _) = StubRevision::handle("doc1", "2-b", 2, Some(body("second")));
        let binding = Binding::new(None, Some(first));

        assert_eq!(binding.lock().root().get_string("name").as_deref(), Some("first"));
        assert!(binding.lock().is_materialized());

        binding.bind(Some(second));
        assert!(!binding.lock().is_materialized());
        assert_eq!(binding.lock().root().get_string("name").as_deref(), Some("second"));
    }

    #[test]
    fn test_bind_releases_previous_handle() {
        let (first, first_raw) = StubRevision::handle("doc1", "1-a", 1, Some(body("a")));
        let (second, second_raw) = StubRevision::handle("doc1", "2-b", 2, Some(body("b")));
        let binding = Binding::new(None, Some(first));

        binding.bind(Some(second));
        assert_eq!(first_raw.refs.get(), 0);
        assert_eq!(second_raw.refs.get(), 1);

        let held = binding.current_handle().unwrap();
        assert_eq!(second_raw.refs.get(), 2);
        binding.bind(None);
        assert_eq!(second_raw.refs.get(), 1);
        drop(held);
        assert_eq!(second_raw.refs.get(), 0);
    }

    #[test]
    fn test_deleted_revision_has_empty_root() {
        let (tombstone, _) = StubRevision::handle("doc1", "3-c", 3, None);
        let binding = Binding::new(None, Some(tombstone));
        assert!(binding.lock().root().is_empty());
    }

    #[test]
    fn test_corrupt_body_reads_as_empty() {
        let corrupt = Some(Bytes::from_static(&[0xc1]));
        let (handle, _) = StubRevision::handle("doc1", "1-a", 1, corrupt);
        let binding = Binding::new(None, Some(handle));
        assert!(binding.lock().root().is_empty());
    }
}
