//! # docvec core
//!
//! Backend-agnostic logic for docvec: data models, the document store and
//! vector index contracts, in-memory backends, the embedding trait, the
//! dual-write orchestrator, and the reconciliation pass.
//!
//! This crate contains no tokio runtime, sqlx, HTTP, or filesystem I/O.
//! Concrete SQLite backends and network embedding providers live in the
//! `docvec` app crate.

pub mod embedding;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod sync;

pub use models::{Document, FieldMap, QueryHit, VectorRecord};
pub use reconcile::{reconcile, ReconcileReport};
pub use store::{DocumentFilter, DocumentStore, VectorIndex};
pub use sync::{DualWriter, SkipEntry, SkipReason, SyncError};
