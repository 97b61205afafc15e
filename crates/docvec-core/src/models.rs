//! Core data models shared by the stores and the orchestrator.
//!
//! Documents are free-form JSON objects keyed by a store-assigned `_id`.
//! Vector records mirror a document's id and carry the text that was
//! embedded, so a later pass can tell whether the index has gone stale.

use serde::Serialize;
use serde_json::{Map, Value};

/// Name of the identifier field carried by every persisted document.
pub const ID_FIELD: &str = "_id";

/// Metadata key linking a vector record back to its document.
pub const DOCUMENT_ID_KEY: &str = "document_id";

/// Fields checked, in order, for text worth indexing.
pub const DEFAULT_TEXT_FIELDS: [&str; 2] = ["contenido", "texto"];

/// A JSON object of document fields.
pub type FieldMap = Map<String, Value>;

/// A persisted document: its id plus every stored field (including `_id`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    #[serde(skip)]
    pub id: String,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl Document {
    /// Builds a document, forcing `_id` in `fields` to match `id`.
    pub fn new(id: impl Into<String>, mut fields: FieldMap) -> Self {
        let id = id.into();
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        Self { id, fields }
    }
}

/// An embedding stored in the vector index, keyed by its document's id.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    /// The text the embedding was computed from.
    pub text: String,
    pub metadata: Value,
}

impl VectorRecord {
    /// Record for a document, with the minimal `{document_id}` metadata.
    pub fn for_document(id: &str, text: &str, embedding: Vec<f32>) -> Self {
        Self {
            id: id.to_string(),
            embedding,
            text: text.to_string(),
            metadata: serde_json::json!({ DOCUMENT_ID_KEY: id }),
        }
    }
}

/// One ranked result of a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Value,
    /// Cosine distance (`1 - similarity`); smaller is closer.
    pub distance: f32,
}

/// Returns the first non-empty string value among `text_fields`.
pub fn indexable_text<'a, S: AsRef<str>>(
    fields: &'a FieldMap,
    text_fields: &[S],
) -> Option<&'a str> {
    text_fields.iter().find_map(|name| match fields.get(name.as_ref()) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    })
}
