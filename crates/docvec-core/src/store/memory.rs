//! In-memory [`DocumentStore`] and [`VectorIndex`] implementations.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Collections keep insertion order. Vector queries are brute-force cosine
//! similarity over the collection's records.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::embedding::cosine_distance;
use crate::models::{Document, FieldMap, QueryHit, VectorRecord, ID_FIELD};

use super::{DocumentFilter, DocumentStore, VectorIndex};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
}

/// Generate a fresh document id.
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// In-memory document store for tests and ephemeral serving.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert_many(&self, collection: &str, docs: Vec<FieldMap>) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let mut collections = write(&self.collections)?;
        let existing: HashSet<String> = collections
            .get(collection)
            .map(|c| c.iter().map(|d| d.id.clone()).collect())
            .unwrap_or_default();

        let mut batch = Vec::with_capacity(docs.len());
        let mut seen = HashSet::new();
        for fields in docs {
            let id = match fields.get(ID_FIELD) {
                Some(Value::String(s)) => s.clone(),
                _ => new_document_id(),
            };
            if existing.contains(&id) || !seen.insert(id.clone()) {
                bail!("duplicate key error: {}._id = {}", collection, id);
            }
            batch.push(Document::new(id, fields));
        }

        let ids = batch.iter().map(|d| d.id.clone()).collect();
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(batch);
        Ok(ids)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        let collections = read(&self.collections)?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|d| filter.id.as_deref().map_or(true, |id| d.id == id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_one(&self, collection: &str, id: &str, fields: &FieldMap) -> Result<u64> {
        let mut collections = write(&self.collections)?;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
        else {
            return Ok(0);
        };

        let mut changed = false;
        for (key, value) in fields {
            if key == ID_FIELD {
                continue;
            }
            if doc.fields.get(key) != Some(value) {
                doc.fields.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        Ok(u64::from(changed))
    }

    async fn delete_one(&self, collection: &str, id: &str) -> Result<u64> {
        let mut collections = write(&self.collections)?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match docs.iter().position(|d| d.id == id) {
            Some(pos) => {
                docs.remove(pos);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = read(&self.collections)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// In-memory vector index with brute-force cosine search.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let mut collections = write(&self.collections)?;
        let stored = collections.entry(collection.to_string()).or_default();
        for rec in records {
            stored.retain(|r| r.id != rec.id);
            stored.push(rec.clone());
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = write(&self.collections)?;
        if let Some(stored) = collections.get_mut(collection) {
            stored.retain(|r| !ids.contains(&r.id));
        }
        Ok(())
    }

    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let collections = read(&self.collections)?;
        let Some(stored) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<QueryHit> = stored
            .iter()
            .map(|r| QueryHit {
                id: r.id.clone(),
                document: r.text.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(embedding, &r.embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, collection: &str) -> Result<Vec<VectorRecord>> {
        Ok(read(&self.collections)?
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> FieldMap {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_many_preserves_order_and_ids() {
        let store = InMemoryDocumentStore::new();
        let ids = store
            .insert_many(
                "c",
                vec![fields(json!({"n": 1})), fields(json!({"_id": "fixed", "n": 2}))],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], "fixed");

        let docs = store.find("c", &DocumentFilter::all(), None).await.unwrap();
        assert_eq!(docs.iter().map(|d| d.id.clone()).collect::<Vec<_>>(), ids);
        assert_eq!(docs[0].fields["_id"], json!(ids[0]));
    }

    #[tokio::test]
    async fn insert_many_rejects_duplicate_ids() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many("c", vec![fields(json!({"_id": "x"}))])
            .await
            .unwrap();
        let err = store
            .insert_many("c", vec![fields(json!({"_id": "x"}))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
        // Same id in another collection is fine.
        store
            .insert_many("d", vec![fields(json!({"_id": "x"}))])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn find_respects_limit_and_id_filter() {
        let store = InMemoryDocumentStore::new();
        let docs = (0..5).map(|i| fields(json!({"n": i}))).collect();
        let ids = store.insert_many("c", docs).await.unwrap();

        let page = store.find("c", &DocumentFilter::all(), Some(3)).await.unwrap();
        assert_eq!(page.len(), 3);

        let one = store
            .find("c", &DocumentFilter::by_id(ids[4].clone()), None)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].fields["n"], 4);

        assert!(store
            .find("missing", &DocumentFilter::all(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn update_one_reports_only_real_changes() {
        let store = InMemoryDocumentStore::new();
        let ids = store
            .insert_many("c", vec![fields(json!({"texto": "a"}))])
            .await
            .unwrap();

        let same = fields(json!({"texto": "a"}));
        assert_eq!(store.update_one("c", &ids[0], &same).await.unwrap(), 0);

        let new = fields(json!({"texto": "b", "extra": true}));
        assert_eq!(store.update_one("c", &ids[0], &new).await.unwrap(), 1);
        let doc = &store.find("c", &DocumentFilter::all(), None).await.unwrap()[0];
        assert_eq!(doc.fields["texto"], "b");
        assert_eq!(doc.fields["extra"], true);

        assert_eq!(store.update_one("c", "nope", &new).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_one_and_collections_persist() {
        let store = InMemoryDocumentStore::new();
        let ids = store
            .insert_many("c", vec![fields(json!({}))])
            .await
            .unwrap();
        assert_eq!(store.delete_one("c", &ids[0]).await.unwrap(), 1);
        assert_eq!(store.delete_one("c", &ids[0]).await.unwrap(), 0);
        assert_eq!(store.list_collection_names().await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn vector_query_ranks_within_collection() {
        let index = InMemoryVectorIndex::new();
        index
            .add(
                "a",
                &[
                    VectorRecord::for_document("x", "x", vec![1.0, 0.0]),
                    VectorRecord::for_document("y", "y", vec![0.0, 1.0]),
                    VectorRecord::for_document("z", "z", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();
        index
            .add("b", &[VectorRecord::for_document("w", "w", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = index.query("a", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(
            hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(),
            vec!["x", "z"]
        );
        assert!(hits[0].distance <= hits[1].distance);
        assert!(index.query("none", &[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vector_add_overwrites_and_delete_ignores_unknown() {
        let index = InMemoryVectorIndex::new();
        index
            .add("a", &[VectorRecord::for_document("x", "old", vec![1.0])])
            .await
            .unwrap();
        index
            .add("a", &[VectorRecord::for_document("x", "new", vec![1.0])])
            .await
            .unwrap();
        let all = index.get("a").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "new");

        index.delete("a", &["ghost".to_string()]).await.unwrap();
        assert_eq!(index.get("a").await.unwrap().len(), 1);
        index.delete("a", &["x".to_string()]).await.unwrap();
        assert!(index.get("a").await.unwrap().is_empty());
    }
}
