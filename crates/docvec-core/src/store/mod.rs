//! Storage contracts for docvec.
//!
//! [`DocumentStore`] and [`VectorIndex`] are the two independent stores the
//! dual-write orchestrator keeps in step. Both are keyed by the same
//! document ids and addressed by collection name. Backends are pluggable
//! (in-memory here, SQLite in the app crate).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, FieldMap, QueryHit, VectorRecord};

/// Selects documents in a [`DocumentStore::find`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    /// Restrict to one document id.
    pub id: Option<String>,
}

impl DocumentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }
}

/// Abstract document database grouped into named collections.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_many`](DocumentStore::insert_many) | Batch insert, ids returned in input order |
/// | [`find`](DocumentStore::find) | Fetch documents, in insertion order |
/// | [`update_one`](DocumentStore::update_one) | Partial field update, returns modified count |
/// | [`delete_one`](DocumentStore::delete_one) | Delete by id, returns deleted count |
/// | [`list_collection_names`](DocumentStore::list_collection_names) | Known collections |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert documents in one batch.
    ///
    /// A document carrying a string `_id` keeps it; all others get a
    /// generated id. Returns the ids in input order.
    async fn insert_many(&self, collection: &str, docs: Vec<FieldMap>) -> Result<Vec<String>>;

    /// Fetch documents matching `filter`, at most `limit` when given.
    async fn find(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>>;

    /// Set `fields` on the document `id`.
    ///
    /// Returns 1 when at least one stored value changed, 0 when the id is
    /// unknown or every value was already equal.
    async fn update_one(&self, collection: &str, id: &str, fields: &FieldMap) -> Result<u64>;

    /// Delete the document `id`, returning how many records were removed.
    async fn delete_one(&self, collection: &str, id: &str) -> Result<u64>;

    async fn list_collection_names(&self) -> Result<Vec<String>>;
}

/// Abstract similarity-search index, one namespace per collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Add records; an existing id in the collection is overwritten.
    async fn add(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Remove records by id. Unknown ids are ignored.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// The `k` nearest records of `collection`, closest first.
    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>>;

    /// Every record of `collection`.
    async fn get(&self, collection: &str) -> Result<Vec<VectorRecord>>;
}
