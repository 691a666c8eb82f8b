//! revdb Storage Engines
//!
//! Engines implementing [`revdb_core::StorageEngine`]:
//! - Memory: revision trees held in process memory, with conflict
//!   insertion for replicated revisions

pub mod memory;
pub mod tree;

pub use memory::{MemoryEngine, MemoryRevision};
pub use tree::{derive_revision_id, RevTree, Revision};
