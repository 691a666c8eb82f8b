//! Reference-counted revision handles
//!
//! A storage engine hands out native revision cursors carrying their own
//! reference count. [`RevisionHandle`] owns exactly one of those counts:
//! constructing or cloning it retains, dropping it releases. Over-release and
//! use after the final release are invariant violations and panic.

use std::fmt;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::EngineError;

/// Flags of the revision a cursor currently selects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevisionFlags {
    /// The revision is a tombstone
    pub deleted: bool,
    /// The revision is a leaf that diverged from the current one
    pub conflict: bool,
}

/// Reference count embedded in a native revision cursor
///
/// Starts at one, the count the engine hands to its caller.
#[derive(Debug)]
pub struct RefCount {
    count: AtomicUsize,
}

impl RefCount {
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(1),
        }
    }

    pub fn retain(&self) {
        let previous = self.count.fetch_add(1, Ordering::Relaxed);
        assert!(previous > 0, "retain of a released revision handle");
    }

    /// Returns true when this was the last reference.
    pub fn release(&self) -> bool {
        let previous = self.count.fetch_sub(1, Ordering::Release);
        assert!(
            previous > 0,
            "revision handle released more times than it was retained"
        );
        if previous == 1 {
            fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Panics if every reference has been released.
    pub fn assert_live(&self) {
        assert!(self.get() > 0, "use of a released revision handle");
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine-side revision cursor: selects one revision of one document
pub trait NativeRevision: Send + Sync + fmt::Debug {
    fn retain(&self);

    /// Drops one reference; the engine reclaims the cursor at zero.
    fn release(&self);

    fn ref_count(&self) -> usize;

    fn document_id(&self) -> &str;

    fn selected_revision_id(&self) -> Option<String>;

    fn selected_sequence(&self) -> u64;

    fn flags(&self) -> RevisionFlags;

    /// Whether the document was persisted when the cursor was loaded
    fn exists(&self) -> bool;

    /// Encoded body of the selected revision; `None` for tombstones
    fn raw_body(&self) -> Option<Bytes>;

    /// Advances to the next leaf in engine traversal order. `Ok(false)` means
    /// there are no more leaves and leaves the selection unchanged.
    fn select_next_leaf(
        &self,
        include_deleted: bool,
        only_conflicts: bool,
    ) -> Result<bool, EngineError>;

    /// Fresh cursor selecting the same revision, holding one reference
    fn duplicate(&self) -> Result<Arc<dyn NativeRevision>, EngineError>;
}

/// Owned reference to a native revision cursor
pub struct RevisionHandle {
    raw: Arc<dyn NativeRevision>,
}

impl RevisionHandle {
    /// Takes over the reference the engine counted when producing `raw`.
    pub fn adopt(raw: Arc<dyn NativeRevision>) -> Self {
        Self { raw }
    }

    pub fn document_id(&self) -> &str {
        self.raw.document_id()
    }

    pub fn selected_revision_id(&self) -> Option<String> {
        self.raw.selected_revision_id()
    }

    pub fn selected_sequence(&self) -> u64 {
        self.raw.selected_sequence()
    }

    pub fn flags(&self) -> RevisionFlags {
        self.raw.flags()
    }

    pub fn exists(&self) -> bool {
        self.raw.exists()
    }

    pub fn raw_body(&self) -> Option<Bytes> {
        self.raw.raw_body()
    }

    pub fn ref_count(&self) -> usize {
        self.raw.ref_count()
    }

    pub fn select_next_leaf(
        &self,
        include_deleted: bool,
        only_conflicts: bool,
    ) -> Result<bool, EngineError> {
        self.raw.select_next_leaf(include_deleted, only_conflicts)
    }

    /// Independent cursor at the same selection
    pub fn duplicate(&self) -> Result<RevisionHandle, EngineError> {
        Ok(Self::adopt(self.raw.duplicate()?))
    }

    /// Whether both handles reference the same native cursor
    pub fn same_cursor(&self, other: &RevisionHandle) -> bool {
        Arc::as_ptr(&self.raw) as *const () == Arc::as_ptr(&other.raw) as *const ()
    }
}

impl Clone for RevisionHandle {
    fn clone(&self) -> Self {
        self.raw.retain();
        Self {
            raw: Arc::clone(&self.raw),
        }
    }
}

impl Drop for RevisionHandle {
    fn drop(&mut self) {
        self.raw.release();
    }
}

impl fmt::Debug for RevisionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevisionHandle")
            .field("document_id", &self.document_id())
            .field("revision_id", &self.selected_revision_id())
            .field("sequence", &self.selected_sequence())
            .finish()
    }
}
