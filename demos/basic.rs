//! Basic revdb Example
//!
//! This example walks a document through save, optimistic conflict,
//! conflict inspection, delete and purge on the in-memory engine.
//!
//! Run with: RUST_LOG=debug cargo run --example basic

use std::sync::Arc;

use anyhow::Context;
use revdb_core::{
    ConcurrencyControl, Database, DatabaseConfig, Error, MutableDocument, MutableProperties,
    Properties,
};
use revdb_storage::MemoryEngine;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("revdb Basic Example\n");

    let engine = Arc::new(MemoryEngine::new());
    let config = DatabaseConfig::new(std::env::temp_dir())?;
    let db = Database::open("demo", &config, engine.clone())?;

    // Create and save a document
    let mut alice = MutableDocument::with_id("user:alice")?;
    alice
        .set_string("name", "Alice")
        .set_int("age", 30)
        .set_double("score", 3.9);
    println!(
        "Before save: revision={:?} sequence={}",
        alice.revision_id(),
        alice.sequence()
    );

    db.save(&mut alice)?;
    println!(
        "After save:  revision={:?} sequence={}",
        alice.revision_id(),
        alice.sequence()
    );

    let stored = db.get_document("user:alice")?.context("document was just saved")?;
    println!("Score as int: {}", stored.get_int("score"));
    println!("Full doc: {}", stored.to_json());

    // Two editors start from the same revision
    let mut first = stored.to_mutable();
    let mut second = stored.to_mutable();
    first.set_string("city", "Turin");
    db.save_with(&mut first, ConcurrencyControl::Optimistic)?;

    second.set_string("city", "Milan");
    match db.save_with(&mut second, ConcurrencyControl::Optimistic) {
        Err(Error::Conflict(reason)) => info!(%reason, "optimistic save rejected"),
        other => warn!(?other, "unexpected outcome"),
    }
    println!("\nStaged edit kept: city={:?}", second.get_string("city"));

    // Last write wins replaces the whole content
    db.save(&mut second)?;
    let current = db.get_document("user:alice")?.context("document exists")?;
    println!("After last-write-wins: {}", current.to_json());

    // A replicated revision that diverged from the winning branch
    let base = stored.revision_id().context("stored revision has an id")?;
    let mut remote = MutableDocument::with_id("user:alice")?;
    remote.set_string("name", "Alice (remote)");
    engine.put_existing_revision(
        "user:alice",
        "2-remote",
        Some(&base),
        Some(revdb_core::codec::encode_body(&remote.to_map().into())?),
    )?;

    let doc = db.get_document("user:alice")?.context("document exists")?;
    if doc.select_conflicting_revision()? {
        println!(
            "\nConflicting revision {:?}: {}",
            doc.revision_id(),
            doc.to_json()
        );
    }

    // Delete, then purge
    db.delete(&current)?;
    println!(
        "\nDeleted: is_deleted={} exists={} name={:?}",
        current.is_deleted(),
        current.exists(),
        current.get_string("name")
    );

    db.purge(&current)?;
    let lookup = db.get_document("user:alice")?.map(|d| d.id().to_string());
    println!("Purged: lookup={:?}", lookup);
    println!(
        "Documents: {}, last sequence: {}",
        db.document_count()?,
        db.last_sequence()?
    );

    db.close();
    Ok(())
}
