//! Storage engine boundary
//!
//! The engine owns revision trees, sequences and blob content. The core only
//! reaches it through [`StorageEngine`] and the cursors it hands out.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::blob::Blob;
use crate::error::EngineError;
use crate::handle::RevisionHandle;

/// Concurrency control applied when saving or deleting a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyControl {
    /// The save becomes a child of whatever revision is current; never conflicts
    #[default]
    LastWriteWins,
    /// The save fails with a conflict unless the bound revision is still current
    Optimistic,
}

impl ConcurrencyControl {
    pub fn code(&self) -> u8 {
        match self {
            ConcurrencyControl::LastWriteWins => 0,
            ConcurrencyControl::Optimistic => 1,
        }
    }
}

impl fmt::Display for ConcurrencyControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyControl::LastWriteWins => write!(f, "last-write-wins"),
            ConcurrencyControl::Optimistic => write!(f, "optimistic"),
        }
    }
}

/// A new revision handed to the engine
#[derive(Debug)]
pub struct SaveRequest<'a> {
    pub document_id: &'a str,
    /// Encoded body; empty for tombstones
    pub body: Bytes,
    /// Blobs referenced by the body, kept by the engine independently of it
    pub attachments: Vec<Blob>,
    /// Revision the caller's document is bound to, if it was ever saved
    pub expected: Option<&'a RevisionHandle>,
    pub deletion: bool,
    pub concurrency: ConcurrencyControl,
}

/// Storage engine consumed by the document layer
pub trait StorageEngine: Send + Sync + fmt::Debug {
    /// Cursor selecting the current leaf of `document_id`
    fn get(&self, document_id: &str, include_deleted: bool)
        -> Result<RevisionHandle, EngineError>;

    /// Stores a new revision and returns a cursor selecting it
    fn save(&self, request: SaveRequest<'_>) -> Result<RevisionHandle, EngineError>;

    /// Removes every revision of the handle's document
    fn purge(&self, handle: &RevisionHandle) -> Result<(), EngineError>;

    /// Blob content by digest
    fn blob(&self, digest: &str) -> Option<Bytes>;

    fn document_count(&self) -> u64;

    fn last_sequence(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_codes() {
        assert_eq!(ConcurrencyControl::LastWriteWins.code(), 0);
        assert_eq!(ConcurrencyControl::Optimistic.code(), 1);
        assert_eq!(ConcurrencyControl::default(), ConcurrencyControl::LastWriteWins);
        assert_eq!(ConcurrencyControl::Optimistic.to_string(), "optimistic");
    }
}
