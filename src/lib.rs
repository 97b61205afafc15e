//! # docvec
//!
//! A collections service that keeps a document store and a vector index in
//! step. Every document write is mirrored into the vector index (text fields
//! are embedded and stored under the document's id), so collections can be
//! read like a document database and searched by similarity.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!   HTTP / CLI ─▶│  DualWriter  │──▶ DocumentStore (SQLite | memory)
//!                │ (docvec-core)│──▶ EmbeddingProvider ──▶ VectorIndex
//!                └──────┬───────┘
//!                       ▼
//!                   reconcile
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docvec init                        # create database
//! docvec serve                       # start HTTP server
//! docvec query notas "hola mundo" -k 3
//! docvec reconcile notas --dry-run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite document store and vector index |
//! | [`embedding`] | Embedding providers |
//! | [`wire`] | JSON request/response bodies |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI commands |

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
pub mod wire;

pub use docvec_core as core;
