//! Repair pass that brings a collection's vector index back in line with
//! its documents after partial dual-write failures.
//!
//! Three kinds of drift are detected:
//!
//! - **orphaned**: a vector whose document no longer exists → deleted
//! - **missing**: a document with indexable text but no vector → indexed
//! - **stale**: a vector whose text no longer matches its document → replaced,
//!   or deleted when the document lost its text
//!
//! With `dry_run` the report is computed and nothing is written.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::info;

use crate::models::VectorRecord;
use crate::store::DocumentFilter;
use crate::sync::{DualWriter, SyncError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub orphaned: Vec<String>,
    pub missing: Vec<String>,
    pub stale: Vec<String>,
    pub dry_run: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.missing.is_empty() && self.stale.is_empty()
    }
}

pub async fn reconcile(
    writer: &DualWriter,
    collection: &str,
    dry_run: bool,
) -> Result<ReconcileReport, SyncError> {
    let documents = writer
        .documents()
        .find(collection, &DocumentFilter::all(), None)
        .await
        .map_err(SyncError::DocumentStore)?;
    let records = writer.vector_records(collection).await?;

    let doc_ids: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    let by_id: HashMap<&str, &VectorRecord> = records.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut report = ReconcileReport {
        dry_run,
        ..Default::default()
    };
    report.orphaned = records
        .iter()
        .filter(|r| !doc_ids.contains(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect();

    // (id, text) pairs to (re)index; text-less stale vectors are only deleted.
    let mut to_index: Vec<(String, String)> = Vec::new();
    let mut to_drop: Vec<String> = report.orphaned.clone();
    for doc in &documents {
        let text = writer.text_of(&doc.fields);
        match (by_id.get(doc.id.as_str()), text) {
            (None, Some(text)) => {
                report.missing.push(doc.id.clone());
                to_index.push((doc.id.clone(), text.to_string()));
            }
            (Some(rec), Some(text)) if rec.text != text => {
                report.stale.push(doc.id.clone());
                to_index.push((doc.id.clone(), text.to_string()));
            }
            (Some(_), None) => {
                report.stale.push(doc.id.clone());
                to_drop.push(doc.id.clone());
            }
            _ => {}
        }
    }

    if dry_run || report.is_clean() {
        return Ok(report);
    }

    let drop_all: Vec<String> = to_drop
        .iter()
        .cloned()
        .chain(to_index.iter().map(|(id, _)| id.clone()))
        .collect();
    writer
        .vectors()
        .delete(collection, &drop_all)
        .await
        .map_err(|error| SyncError::VectorIndex {
            committed: Vec::new(),
            error,
        })?;

    if !to_index.is_empty() {
        let texts: Vec<String> = to_index.iter().map(|(_, t)| t.clone()).collect();
        let embeddings = writer
            .embed_batch(&texts)
            .await
            .map_err(|error| SyncError::Embedding {
                committed: Vec::new(),
                error,
            })?;
        let new_records: Vec<VectorRecord> = to_index
            .iter()
            .zip(embeddings)
            .map(|((id, text), embedding)| VectorRecord::for_document(id, text, embedding))
            .collect();
        writer
            .vectors()
            .add(collection, &new_records)
            .await
            .map_err(|error| SyncError::VectorIndex {
                committed: Vec::new(),
                error,
            })?;
    }

    info!(
        collection,
        orphaned = report.orphaned.len(),
        missing = report.missing.len(),
        stale = report.stale.len(),
        "collection reconciled"
    );
    Ok(report)
}
