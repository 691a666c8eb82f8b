//! Revision trees
//!
//! A tree is append-only: saving adds a child revision, never rewrites one.
//! Bodies of revisions that stop being leaves are dropped.

use std::cmp::Ordering;

use bytes::Bytes;

/// Length in hex characters of the digest part of a revision id
const REVISION_DIGEST_LEN: usize = 32;

/// One revision of a document
#[derive(Debug, Clone)]
pub struct Revision {
    pub id: String,
    pub parent: Option<usize>,
    pub generation: u64,
    pub sequence: u64,
    pub deleted: bool,
    /// Set on leaves that diverged from the winning branch
    pub conflict: bool,
    pub leaf: bool,
    /// `None` for tombstones and for revisions that are no longer leaves
    pub body: Option<Bytes>,
}

/// New revision to append to a tree
#[derive(Debug)]
pub(crate) struct NewRevision {
    /// Explicit id for revisions created elsewhere; derived when `None`
    pub(crate) id: Option<String>,
    pub(crate) parent: Option<usize>,
    pub(crate) generation: u64,
    pub(crate) sequence: u64,
    pub(crate) body: Option<Bytes>,
    pub(crate) conflict: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RevTree {
    revisions: Vec<Revision>,
}

impl RevTree {
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn get(&self, index: usize) -> &Revision {
        &self.revisions[index]
    }

    pub fn find(&self, revision_id: &str) -> Option<usize> {
        self.revisions.iter().position(|r| r.id == revision_id)
    }

    /// Leaves in traversal order: live before deleted, then non-conflicting
    /// before conflicting, then higher generation, then higher revision id
    pub fn leaves(&self) -> Vec<usize> {
        let mut leaves: Vec<usize> = (0..self.revisions.len())
            .filter(|&i| self.revisions[i].leaf)
            .collect();
        leaves.sort_by(|&a, &b| self.compare(b, a));
        leaves
    }

    /// The winning leaf, which is the document's current revision
    pub fn current(&self) -> Option<usize> {
        self.leaves().first().copied()
    }

    /// Whether the document's current revision is a tombstone
    pub fn is_deleted(&self) -> bool {
        self.current().is_some_and(|i| self.revisions[i].deleted)
    }

    pub(crate) fn insert(&mut self, new: NewRevision) -> usize {
        let deleted = new.body.is_none();
        let id = new.id.unwrap_or_else(|| {
            let parent_id = new.parent.map(|p| self.revisions[p].id.as_str());
            derive_revision_id(new.generation, parent_id, new.body.as_deref(), deleted)
        });

        if let Some(parent) = new.parent {
            let parent = &mut self.revisions[parent];
            parent.leaf = false;
            parent.body = None;
        }

        self.revisions.push(Revision {
            id,
            parent: new.parent,
            generation: new.generation,
            sequence: new.sequence,
            deleted,
            conflict: new.conflict,
            leaf: true,
            body: new.body,
        });
        self.revisions.len() - 1
    }

    fn compare(&self, a: usize, b: usize) -> Ordering {
        let (a, b) = (&self.revisions[a], &self.revisions[b]);
        (!a.deleted, !a.conflict, a.generation, a.id.as_str())
            .cmp(&(!b.deleted, !b.conflict, b.generation, b.id.as_str()))
    }
}

/// `<generation>-<digest>` where the digest covers the parent id, the body
/// and the deletion flag
pub fn derive_revision_id(
    generation: u64,
    parent_id: Option<&str>,
    body: Option<&[u8]>,
    deleted: bool,
) -> String {
    let mut hasher = blake3::Hasher::new();
    if let Some(parent_id) = parent_id {
        hasher.update(parent_id.as_bytes());
    }
    hasher.update(&[deleted as u8]);
    hasher.update(body.unwrap_or_default());
    let digest = hex::encode(hasher.finalize().as_bytes());
    format!("{}-{}", generation, &digest[..REVISION_DIGEST_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(
        tree: &mut RevTree,
        parent: Option<usize>,
        body: Option<&'static [u8]>,
        conflict: bool,
    ) -> usize {
        let generation = parent.map_or(1, |p| tree.get(p).generation + 1);
        let sequence = tree.len() as u64 + 1;
        tree.insert(NewRevision {
            id: None,
            parent,
            generation,
            sequence,
            body: body.map(Bytes::from_static),
            conflict,
        })
    }

    #[test]
    fn test_linear_history() {
        let mut tree = RevTree::default();
        let first = append(&mut tree, None, Some(b"one"), false);
        let second = append(&mut tree, Some(first), Some(b"two"), false);

        assert_eq!(tree.leaves(), vec![second]);
        assert_eq!(tree.current(), Some(second));
        assert!(tree.get(second).id.starts_with("2-"));
        assert!(!tree.get(first).leaf);
        assert!(tree.get(first).body.is_none());
    }

    #[test]
    fn test_conflicting_leaf_sorts_after_winner() {
        let mut tree = RevTree::default();
        let root = append(&mut tree, None, Some(b"root"), false);
        let local = append(&mut tree, Some(root), Some(b"local"), false);
        let remote = append(&mut tree, Some(root), Some(b"remote"), true);

        assert_eq!(tree.current(), Some(local));
        assert_eq!(tree.leaves(), vec![local, remote]);
    }

    #[test]
    fn test_live_leaf_beats_tombstone() {
        let mut tree = RevTree::default();
        let root = append(&mut tree, None, Some(b"root"), false);
        let tombstone = append(&mut tree, Some(root), None, false);
        let deeper = append(&mut tree, Some(tombstone), None, false);
        let live = append(&mut tree, Some(root), Some(b"live"), true);

        assert_eq!(tree.current(), Some(live));
        assert!(!tree.is_deleted());
        assert_eq!(tree.leaves(), vec![live, deeper]);
    }

    #[test]
    fn test_revision_id_depends_on_history() {
        let a = derive_revision_id(2, Some("1-abc"), Some(b"body"), false);
        let b = derive_revision_id(2, Some("1-def"), Some(b"body"), false);
        let c = derive_revision_id(2, Some("1-abc"), None, true);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, derive_revision_id(2, Some("1-abc"), Some(b"body"), false));
        assert_eq!(a.len(), 2 + REVISION_DIGEST_LEN);
    }
}
