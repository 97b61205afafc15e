//! JSON request and response bodies of the collections API.
//!
//! Field names are the public wire contract (`nombre_colleccion`,
//! `documentos`, `omitidos`, ...) and are shared by the HTTP server and the
//! CLI's JSON output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use docvec_core::models::{Document, FieldMap, QueryHit, VectorRecord};
use docvec_core::sync::{
    CreateOutcome, DeleteOutcome, ReadOutcome, SkipEntry, SkipReason, UpdateOutcome,
};
use docvec_core::ReconcileReport;

// ============ Requests ============

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub nombre_colleccion: String,
    /// Absent or `null` is treated like an empty list.
    #[serde(default)]
    pub documentos: Option<Vec<FieldMap>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub nombre_colleccion: String,
    pub actualizaciones: Vec<FieldMap>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub nombre_colleccion: String,
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub nombre_colleccion: String,
    pub consulta: String,
    /// Falls back to `collections.default_k`.
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub nombre_colleccion: String,
    #[serde(default)]
    pub dry_run: bool,
}

/// Query string of `GET /collections`.
#[derive(Debug, Deserialize)]
pub struct ReadParams {
    pub nombre: Option<String>,
    pub id: Option<String>,
}

/// Query string of `GET /collections/vectors`.
#[derive(Debug, Deserialize)]
pub struct VectorsParams {
    pub nombre: String,
}

// ============ Responses ============

/// A skipped input entry as reported to clients.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SkipBody {
    pub indice: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub motivo: SkipReason,
}

impl From<SkipEntry> for SkipBody {
    fn from(entry: SkipEntry) -> Self {
        Self {
            indice: entry.index,
            id: entry.id,
            motivo: entry.reason,
        }
    }
}

fn skip_bodies(entries: Vec<SkipEntry>) -> Vec<SkipBody> {
    entries.into_iter().map(SkipBody::from).collect()
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub status: &'static str,
    pub mensaje: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexados: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omitidos: Option<Vec<SkipBody>>,
}

impl CreateResponse {
    pub fn nothing_happened() -> Self {
        Self {
            status: "nothing happened!",
            mensaje: "No se recibieron documentos para insertar".to_string(),
            ids: None,
            indexados: None,
            omitidos: None,
        }
    }

    pub fn created(collection: &str, outcome: CreateOutcome) -> Self {
        Self {
            status: "creado!",
            mensaje: format!(
                "Se insertaron {} documentos en la colección {}",
                outcome.ids.len(),
                collection
            ),
            ids: Some(outcome.ids),
            indexados: Some(outcome.indexed),
            omitidos: Some(skip_bodies(outcome.skipped)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReadResponse {
    Collections {
        estatus: &'static str,
        colecciones_disponibles: Vec<String>,
    },
    Documents {
        estatus: &'static str,
        coleccion: String,
        documentos: Vec<Document>,
    },
}

impl From<ReadOutcome> for ReadResponse {
    fn from(outcome: ReadOutcome) -> Self {
        match outcome {
            ReadOutcome::Collections(names) => ReadResponse::Collections {
                estatus: "fetched!",
                colecciones_disponibles: names,
            },
            ReadOutcome::Documents {
                collection,
                documents,
            } => ReadResponse::Documents {
                estatus: "fetched!",
                coleccion: collection,
                documentos: documents,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub status: &'static str,
    pub mensaje: String,
    pub ids: Vec<String>,
    pub reindexados: Vec<String>,
    pub omitidos: Vec<SkipBody>,
}

impl UpdateResponse {
    pub fn new(collection: &str, outcome: UpdateOutcome) -> Self {
        Self {
            status: "actualizado!",
            mensaje: format!(
                "Se actualizaron {} documentos en la colección {}",
                outcome.updated.len(),
                collection
            ),
            ids: outcome.updated,
            reindexados: outcome.reindexed,
            omitidos: skip_bodies(outcome.skipped),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub mensaje: String,
    pub ids: Vec<String>,
    pub omitidos: Vec<SkipBody>,
}

impl DeleteResponse {
    pub fn new(collection: &str, outcome: DeleteOutcome) -> Self {
        Self {
            status: "eliminado!",
            mensaje: format!(
                "Se eliminaron {} documentos de la colección {}",
                outcome.deleted.len(),
                collection
            ),
            ids: outcome.deleted,
            omitidos: skip_bodies(outcome.skipped),
        }
    }
}

/// Column-oriented hits, one inner list per query text.
#[derive(Debug, Serialize, Default)]
pub struct QueryResults {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<String>>,
    pub metadatas: Vec<Vec<Value>>,
    pub distances: Vec<Vec<f32>>,
}

impl From<Vec<QueryHit>> for QueryResults {
    fn from(hits: Vec<QueryHit>) -> Self {
        let mut ids = Vec::with_capacity(hits.len());
        let mut documents = Vec::with_capacity(hits.len());
        let mut metadatas = Vec::with_capacity(hits.len());
        let mut distances = Vec::with_capacity(hits.len());
        for hit in hits {
            ids.push(hit.id);
            documents.push(hit.document);
            metadatas.push(hit.metadata);
            distances.push(hit.distance);
        }
        Self {
            ids: vec![ids],
            documents: vec![documents],
            metadatas: vec![metadatas],
            distances: vec![distances],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub status: &'static str,
    pub query: String,
    pub resultados: QueryResults,
}

impl QueryResponse {
    pub fn new(query: String, hits: Vec<QueryHit>) -> Self {
        Self {
            status: "ok",
            query,
            resultados: hits.into(),
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct VectorsResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Value>,
}

impl From<Vec<VectorRecord>> for VectorsResponse {
    fn from(records: Vec<VectorRecord>) -> Self {
        let mut out = VectorsResponse::default();
        for record in records {
            out.ids.push(record.id);
            out.documents.push(record.text);
            out.metadatas.push(record.metadata);
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub status: &'static str,
    pub huerfanos: Vec<String>,
    pub faltantes: Vec<String>,
    pub desactualizados: Vec<String>,
    pub dry_run: bool,
}

impl From<ReconcileReport> for ReconcileResponse {
    fn from(report: ReconcileReport) -> Self {
        Self {
            status: "reconciliado!",
            huerfanos: report.orphaned,
            faltantes: report.missing,
            desactualizados: report.stale,
            dry_run: report.dry_run,
        }
    }
}
