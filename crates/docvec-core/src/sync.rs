//! Dual-write orchestration between a document store and a vector index.
//!
//! [`DualWriter`] holds injected handles to a [`DocumentStore`], a
//! [`VectorIndex`] and an [`EmbeddingProvider`], and keeps the two stores
//! in step for one request at a time:
//!
//! | Operation | Document store | Vector index |
//! |-----------|----------------|--------------|
//! | [`create`](DualWriter::create) | one batch insert | one batch add for documents with text |
//! | [`read`](DualWriter::read) | find / list collections | |
//! | [`update`](DualWriter::update) | partial update per entry | delete + re-add when text changed |
//! | [`delete`](DualWriter::delete) | delete per id | delete only when the document was removed |
//! | [`query`](DualWriter::query) | | k nearest neighbours |
//!
//! The document write always comes first. Nothing is rolled back: when the
//! vector side fails the returned [`SyncError`] lists the document ids that
//! were already committed, and [`crate::reconcile`] can repair the index
//! later. Input entries that produce no write are reported as
//! [`SkipEntry`] values rather than errors.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::embedding::{check_batch, EmbeddingProvider};
use crate::models::{
    indexable_text, Document, FieldMap, QueryHit, VectorRecord, DEFAULT_TEXT_FIELDS, ID_FIELD,
};
use crate::store::{DocumentFilter, DocumentStore, VectorIndex};

/// Default page size for collection reads.
pub const DEFAULT_READ_LIMIT: usize = 1000;

/// Errors from a dual-write operation.
///
/// `committed` lists the document ids written to the document store before
/// the vector side failed; those documents are now unindexed or stale.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("document store error: {0:#}")]
    DocumentStore(anyhow::Error),

    #[error("embedding failed: {error:#}")]
    Embedding {
        committed: Vec<String>,
        error: anyhow::Error,
    },

    #[error("vector index error: {error:#}")]
    VectorIndex {
        committed: Vec<String>,
        error: anyhow::Error,
    },
}

impl SyncError {
    pub fn committed(&self) -> &[String] {
        match self {
            SyncError::DocumentStore(_) => &[],
            SyncError::Embedding { committed, .. } | SyncError::VectorIndex { committed, .. } => {
                committed
            }
        }
    }
}

/// Why an input entry produced no write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Update entry without a string `_id`.
    MissingId,
    /// Document stored but carries no indexable text.
    NoIndexableText,
    /// Update matched nothing or changed no value.
    NotModified,
    /// Delete target not present in the document store.
    NotFound,
}

/// A skipped input entry, by position in the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipEntry {
    pub index: usize,
    pub id: Option<String>,
    pub reason: SkipReason,
}

impl SkipEntry {
    fn new(index: usize, id: Option<String>, reason: SkipReason) -> Self {
        Self { index, id, reason }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOutcome {
    /// Every inserted id, in input order.
    pub ids: Vec<String>,
    /// How many documents were embedded and indexed.
    pub indexed: usize,
    pub skipped: Vec<SkipEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Collections(Vec<String>),
    Documents {
        collection: String,
        documents: Vec<Document>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub updated: Vec<String>,
    /// Subset of `updated` whose vector was replaced.
    pub reindexed: Vec<String>,
    pub skipped: Vec<SkipEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub skipped: Vec<SkipEntry>,
}

/// Coordinates writes across a document store and a vector index.
#[derive(Clone)]
pub struct DualWriter {
    documents: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    text_fields: Vec<String>,
    read_limit: usize,
}

impl DualWriter {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            documents,
            vectors,
            embedder,
            text_fields: DEFAULT_TEXT_FIELDS.iter().map(|s| s.to_string()).collect(),
            read_limit: DEFAULT_READ_LIMIT,
        }
    }

    /// Override the fields searched for indexable text, in priority order.
    pub fn with_text_fields(mut self, fields: Vec<String>) -> Self {
        self.text_fields = fields;
        self
    }

    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = limit;
        self
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        self.documents.as_ref()
    }

    pub fn vectors(&self) -> &dyn VectorIndex {
        self.vectors.as_ref()
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    /// Indexable text of a field map under this writer's text fields.
    pub fn text_of<'a>(&self, fields: &'a FieldMap) -> Option<&'a str> {
        indexable_text(fields, &self.text_fields)
    }

    /// Insert documents, then index the ones that carry text.
    pub async fn create(
        &self,
        collection: &str,
        docs: Vec<FieldMap>,
    ) -> Result<CreateOutcome, SyncError> {
        if docs.is_empty() {
            return Ok(CreateOutcome::default());
        }

        let texts: Vec<Option<String>> = docs
            .iter()
            .map(|d| self.text_of(d).map(str::to_string))
            .collect();

        let ids = self
            .documents
            .insert_many(collection, docs)
            .await
            .map_err(SyncError::DocumentStore)?;
        if ids.len() != texts.len() {
            return Err(SyncError::DocumentStore(anyhow::anyhow!(
                "insert returned {} ids for {} documents",
                ids.len(),
                texts.len()
            )));
        }

        let mut staged_ids = Vec::new();
        let mut staged_texts = Vec::new();
        let mut skipped = Vec::new();
        for (index, (id, text)) in ids.iter().zip(texts).enumerate() {
            match text {
                Some(text) => {
                    staged_ids.push(id.clone());
                    staged_texts.push(text);
                }
                None => skipped.push(SkipEntry::new(
                    index,
                    Some(id.clone()),
                    SkipReason::NoIndexableText,
                )),
            }
        }

        if !staged_texts.is_empty() {
            let embeddings =
                self.embed_batch(&staged_texts)
                    .await
                    .map_err(|error| SyncError::Embedding {
                        committed: ids.clone(),
                        error,
                    })?;
            let records: Vec<VectorRecord> = staged_ids
                .iter()
                .zip(&staged_texts)
                .zip(embeddings)
                .map(|((id, text), embedding)| VectorRecord::for_document(id, text, embedding))
                .collect();
            self.vectors
                .add(collection, &records)
                .await
                .map_err(|error| SyncError::VectorIndex {
                    committed: ids.clone(),
                    error,
                })?;
        }

        info!(
            collection,
            inserted = ids.len(),
            indexed = staged_ids.len(),
            "documents created"
        );
        Ok(CreateOutcome {
            ids,
            indexed: staged_ids.len(),
            skipped,
        })
    }

    /// List collections, or read one collection's documents (optionally one id).
    ///
    /// Only the document store is consulted.
    pub async fn read(
        &self,
        collection: Option<&str>,
        id: Option<&str>,
    ) -> Result<ReadOutcome, SyncError> {
        let Some(collection) = collection else {
            let names = self
                .documents
                .list_collection_names()
                .await
                .map_err(SyncError::DocumentStore)?;
            return Ok(ReadOutcome::Collections(names));
        };

        let filter = match id {
            Some(id) => DocumentFilter::by_id(id),
            None => DocumentFilter::all(),
        };
        let documents = self
            .documents
            .find(collection, &filter, Some(self.read_limit))
            .await
            .map_err(SyncError::DocumentStore)?;
        Ok(ReadOutcome::Documents {
            collection: collection.to_string(),
            documents,
        })
    }

    /// Apply partial updates; re-index documents whose text fields were part of the update.
    ///
    /// The vector always holds the updated document's indexable text. When
    /// the update leaves the document without one, its vector is removed.
    ///
    /// Each entry is `{_id, field: value, ...}`. Entries are processed in
    /// order and independently; an error stops processing at that entry.
    pub async fn update(
        &self,
        collection: &str,
        updates: Vec<FieldMap>,
    ) -> Result<UpdateOutcome, SyncError> {
        let mut outcome = UpdateOutcome::default();

        for (index, mut fields) in updates.into_iter().enumerate() {
            let id = match fields.remove(ID_FIELD) {
                Some(Value::String(id)) => id,
                _ => {
                    debug!(collection, index, "update entry without _id skipped");
                    outcome
                        .skipped
                        .push(SkipEntry::new(index, None, SkipReason::MissingId));
                    continue;
                }
            };

            let modified = self
                .documents
                .update_one(collection, &id, &fields)
                .await
                .map_err(SyncError::DocumentStore)?;
            if modified == 0 {
                outcome
                    .skipped
                    .push(SkipEntry::new(index, Some(id), SkipReason::NotModified));
                continue;
            }
            outcome.updated.push(id.clone());

            let touches_text = self.text_fields.iter().any(|f| fields.contains_key(f));
            if !touches_text {
                continue;
            }

            // The indexed text is the stored document's, not the update entry's.
            let stored = self
                .documents
                .find(collection, &DocumentFilter::by_id(id.as_str()), Some(1))
                .await
                .map_err(|error| {
                    SyncError::DocumentStore(
                        error.context(format!("document {} updated but could not be re-read", id)),
                    )
                })?;
            match stored.first().and_then(|doc| self.text_of(&doc.fields)) {
                Some(text) => {
                    self.replace_vector(collection, &id, text).await?;
                    outcome.reindexed.push(id);
                }
                None => {
                    self.vectors
                        .delete(collection, std::slice::from_ref(&id))
                        .await
                        .map_err(|error| SyncError::VectorIndex {
                            committed: vec![id.clone()],
                            error,
                        })?;
                }
            }
        }

        info!(
            collection,
            updated = outcome.updated.len(),
            reindexed = outcome.reindexed.len(),
            skipped = outcome.skipped.len(),
            "documents updated"
        );
        Ok(outcome)
    }

    /// Delete documents; each vector goes only after its document did.
    pub async fn delete(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<DeleteOutcome, SyncError> {
        let mut outcome = DeleteOutcome::default();

        for (index, id) in ids.iter().enumerate() {
            let deleted = self
                .documents
                .delete_one(collection, id)
                .await
                .map_err(SyncError::DocumentStore)?;
            if deleted != 1 {
                outcome
                    .skipped
                    .push(SkipEntry::new(index, Some(id.clone()), SkipReason::NotFound));
                continue;
            }
            self.vectors
                .delete(collection, std::slice::from_ref(id))
                .await
                .map_err(|error| SyncError::VectorIndex {
                    committed: vec![id.clone()],
                    error,
                })?;
            outcome.deleted.push(id.clone());
        }

        info!(
            collection,
            deleted = outcome.deleted.len(),
            skipped = outcome.skipped.len(),
            "documents deleted"
        );
        Ok(outcome)
    }

    /// The `k` records of `collection` nearest to `text`.
    ///
    /// Only the vector index is consulted, so hits may name documents that
    /// have since been deleted.
    pub async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<QueryHit>, SyncError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut embeddings = self
            .embed_batch(&[text.to_string()])
            .await
            .map_err(|error| SyncError::Embedding {
                committed: Vec::new(),
                error,
            })?;
        let embedding = embeddings.pop().unwrap_or_default();
        let hits = self
            .vectors
            .query(collection, &embedding, k)
            .await
            .map_err(|error| SyncError::VectorIndex {
                committed: Vec::new(),
                error,
            })?;
        debug!(collection, k, hits = hits.len(), "vector query");
        Ok(hits)
    }

    /// Every vector record of `collection`.
    pub async fn vector_records(&self, collection: &str) -> Result<Vec<VectorRecord>, SyncError> {
        self.vectors
            .get(collection)
            .await
            .map_err(|error| SyncError::VectorIndex {
                committed: Vec::new(),
                error,
            })
    }

    /// Delete, re-embed and re-add the vector for one document.
    pub(crate) async fn replace_vector(
        &self,
        collection: &str,
        id: &str,
        text: &str,
    ) -> Result<(), SyncError> {
        let committed = || vec![id.to_string()];
        self.vectors
            .delete(collection, &[id.to_string()])
            .await
            .map_err(|error| SyncError::VectorIndex {
                committed: committed(),
                error,
            })?;
        let mut embeddings = self
            .embed_batch(&[text.to_string()])
            .await
            .map_err(|error| SyncError::Embedding {
                committed: committed(),
                error,
            })?;
        let embedding = embeddings.pop().unwrap_or_default();
        self.vectors
            .add(collection, &[VectorRecord::for_document(id, text, embedding)])
            .await
            .map_err(|error| SyncError::VectorIndex {
                committed: committed(),
                error,
            })
    }

    /// Embed texts in one provider call and validate the result shape.
    pub(crate) async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed(texts).await?;
        check_batch(self.embedder.as_ref(), texts.len(), &vectors)?;
        Ok(vectors)
    }
}
