//! revdb Core - Documents over a revision-tree storage engine
//!
//! This crate provides the document layer of revdb:
//! - Immutable/mutable value graphs with total typed getters
//! - Documents bound to reference-counted revision handles, with a content
//!   cache invalidated on every rebind
//! - Saving under last-write-wins or optimistic concurrency control
//! - Exposing conflicting leaves for caller-driven merges
//!
//! Storage engines plug in through [`StorageEngine`].

mod binding;
pub mod blob;
pub mod codec;
pub mod collection;
pub mod config;
mod conflict;
pub mod database;
pub mod document;
pub mod engine;
pub mod error;
pub mod handle;
pub mod mutable;
pub mod value;

use once_cell::sync::OnceCell;
use tracing::info;

pub use blob::Blob;
pub use collection::{
    Array, Dictionary, MutableArray, MutableDictionary, MutableProperties, Properties,
};
pub use config::DatabaseConfig;
pub use database::{ChangeKind, Database, DocumentChange};
pub use document::{generation_from_revision_id, Document, DocumentId};
pub use engine::{ConcurrencyControl, SaveRequest, StorageEngine};
pub use error::{EngineError, Error, Result};
pub use handle::{NativeRevision, RefCount, RevisionFlags, RevisionHandle};
pub use mutable::MutableDocument;
pub use value::{Number, Value};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Process-wide initialization; idempotent.
///
/// [`Database::open`] calls this before touching its engine.
pub fn initialize() {
    INITIALIZED.get_or_init(|| {
        info!(version = env!("CARGO_PKG_VERSION"), "revdb initialized");
    });
}

pub fn is_initialized() -> bool {
    INITIALIZED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        initialize();
        initialize();
        assert!(is_initialized());
    }
}
