//! SQLite-backed [`DocumentStore`] and [`VectorIndex`].
//!
//! One [`SqliteStore`] serves both contracts over a single pool. Documents
//! are kept as JSON text in `documents.body_json`; vectors as little-endian
//! f32 BLOBs in `vectors.embedding`. Similarity search is a brute-force
//! cosine scan over the collection's rows.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use docvec_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use docvec_core::models::{Document, FieldMap, QueryHit, VectorRecord, ID_FIELD};
use docvec_core::store::memory::new_document_id;
use docvec_core::store::{DocumentFilter, DocumentStore, VectorIndex};

use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `path`, creating the file and schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        migrate::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_fields(body_json: &str) -> Result<FieldMap> {
    match serde_json::from_str::<Value>(body_json)? {
        Value::Object(map) => Ok(map),
        other => bail!("stored document is not a JSON object: {}", other),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_many(&self, collection: &str, docs: Vec<FieldMap>) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        let mut ids = Vec::with_capacity(docs.len());
        for fields in docs {
            let id = match fields.get(ID_FIELD) {
                Some(Value::String(s)) => s.clone(),
                _ => new_document_id(),
            };
            let doc = Document::new(id.clone(), fields);
            let body = serde_json::to_string(&doc.fields)?;

            let res =
                sqlx::query("INSERT INTO documents (collection, id, body_json) VALUES (?, ?, ?)")
                    .bind(collection)
                    .bind(&id)
                    .bind(&body)
                    .execute(&mut *tx)
                    .await;
            match res {
                Ok(_) => ids.push(id),
                Err(e) if is_unique_violation(&e) => {
                    bail!("duplicate key error: {}._id = {}", collection, id)
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = match &filter.id {
            Some(id) => {
                sqlx::query(
                    "SELECT id, body_json FROM documents WHERE collection = ? AND id = ? ORDER BY seq LIMIT ?",
                )
                .bind(collection)
                .bind(id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, body_json FROM documents WHERE collection = ? ORDER BY seq LIMIT ?",
                )
                .bind(collection)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let body: String = row.get("body_json");
                let fields = parse_fields(&body)
                    .with_context(|| format!("corrupt document {}.{}", collection, id))?;
                Ok(Document::new(id, fields))
            })
            .collect()
    }

    async fn update_one(&self, collection: &str, id: &str, fields: &FieldMap) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let body: Option<String> =
            sqlx::query_scalar("SELECT body_json FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(body) = body else {
            return Ok(0);
        };

        let mut stored = parse_fields(&body)?;
        let mut changed = false;
        for (key, value) in fields {
            if key == ID_FIELD {
                continue;
            }
            if stored.get(key) != Some(value) {
                stored.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        if !changed {
            return Ok(0);
        }

        sqlx::query("UPDATE documents SET body_json = ? WHERE collection = ? AND id = ?")
            .bind(serde_json::to_string(&stored)?)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(1)
    }

    async fn delete_one(&self, collection: &str, id: &str) -> Result<u64> {
        let res = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<VectorRecord> {
    let metadata_json: String = row.get("metadata_json");
    let blob: Vec<u8> = row.get("embedding");
    Ok(VectorRecord {
        id: row.get("id"),
        text: row.get("text"),
        metadata: serde_json::from_str(&metadata_json)?,
        embedding: blob_to_vec(&blob),
    })
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn add(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for rec in records {
            sqlx::query(
                r#"
                INSERT INTO vectors (collection, id, text, metadata_json, embedding, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(collection)
            .bind(&rec.id)
            .bind(&rec.text)
            .bind(rec.metadata.to_string())
            .bind(vec_to_blob(&rec.embedding))
            .bind(rec.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM vectors WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let rows = sqlx::query(
            "SELECT id, text, metadata_json, embedding FROM vectors WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let rec = row_to_record(row)?;
            hits.push(QueryHit {
                distance: cosine_distance(embedding, &rec.embedding),
                id: rec.id,
                document: rec.text,
                metadata: rec.metadata,
            });
        }
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, collection: &str) -> Result<Vec<VectorRecord>> {
        let rows = sqlx::query(
            "SELECT id, text, metadata_json, embedding FROM vectors WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }
}
