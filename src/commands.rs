//! CLI command implementations.
//!
//! Each command opens the configured backend, runs one dual-writer
//! operation and prints the same JSON body the HTTP API would return.

use anyhow::Result;
use serde::Serialize;

use docvec_core::reconcile;

use crate::config::Config;
use crate::server::build_writer;
use crate::wire::{QueryResponse, ReadResponse, ReconcileResponse, VectorsResponse};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `docvec collections [name] [--id]`
pub async fn run_collections(config: &Config, name: Option<&str>, id: Option<&str>) -> Result<()> {
    let writer = build_writer(config).await?;
    let outcome = writer.read(name, id).await?;
    print_json(&ReadResponse::from(outcome))
}

/// `docvec query <collection> <text> [-k]`
pub async fn run_query(
    config: &Config,
    collection: &str,
    text: &str,
    k: Option<usize>,
) -> Result<()> {
    let writer = build_writer(config).await?;
    let k = k.unwrap_or(config.collections.default_k);
    let hits = writer.query(collection, text, k).await?;
    print_json(&QueryResponse::new(text.to_string(), hits))
}

/// `docvec vectors <collection>`
pub async fn run_vectors(config: &Config, collection: &str) -> Result<()> {
    let writer = build_writer(config).await?;
    let records = writer.vector_records(collection).await?;
    print_json(&VectorsResponse::from(records))
}

/// `docvec reconcile <collection> [--dry-run]`
pub async fn run_reconcile(config: &Config, collection: &str, dry_run: bool) -> Result<()> {
    let writer = build_writer(config).await?;
    let report = reconcile(&writer, collection, dry_run).await?;
    if !report.dry_run && !report.is_clean() {
        tracing::info!(
            collection,
            orphaned = report.orphaned.len(),
            missing = report.missing.len(),
            stale = report.stale.len(),
            "vector index repaired"
        );
    }
    print_json(&ReconcileResponse::from(report))
}
