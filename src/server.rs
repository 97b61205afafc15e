//! Collections HTTP server.
//!
//! Exposes the dual-writer over a JSON HTTP API. Every write goes to the
//! document store first and then to the vector index; reads come from the
//! document store and queries from the vector index.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST`   | `/collections` | Insert documents and index their text |
//! | `GET`    | `/collections?nombre=&id=` | List collections, or read documents |
//! | `PUT`    | `/collections` | Partial updates, re-indexing changed text |
//! | `DELETE` | `/collections` | Delete documents and their vectors |
//! | `POST`   | `/collections/query` | k nearest neighbours of a text |
//! | `GET`    | `/collections/vectors?nombre=` | Every vector record of a collection |
//! | `POST`   | `/collections/reconcile` | Repair the vector index from the documents |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! All routes are nested under `server.base_path` when one is configured.
//!
//! # Error Contract
//!
//! ```json
//! { "status": "error", "mensaje": "document store error: ..." }
//! ```
//!
//! Store, provider and index failures are `500`. Bodies or query strings
//! that do not match the request shape are `422`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use docvec_core::store::memory::{InMemoryDocumentStore, InMemoryVectorIndex};
use docvec_core::{reconcile, DualWriter, SyncError};

use crate::config::{Backend, Config};
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;
use crate::wire::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, QueryRequest, QueryResponse,
    ReadParams, ReadResponse, ReconcileRequest, ReconcileResponse, UpdateRequest, UpdateResponse,
    VectorsParams, VectorsResponse,
};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub writer: DualWriter,
}

/// Build the [`DualWriter`] for the configured backend and embedding provider.
///
/// With `db.backend = "sqlite"` one [`SqliteStore`] serves as both the
/// document store and the vector index.
pub async fn build_writer(config: &Config) -> anyhow::Result<DualWriter> {
    let embedder = create_provider(&config.embedding)?;
    let writer = match config.db.backend {
        Backend::Memory => DualWriter::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryVectorIndex::new()),
            embedder,
        ),
        Backend::Sqlite => {
            let store = Arc::new(SqliteStore::open(&config.db.path).await?);
            DualWriter::new(store.clone(), store, embedder)
        }
    };
    Ok(writer
        .with_text_fields(config.collections.text_fields.clone())
        .with_read_limit(config.collections.read_limit))
}

/// Starts the HTTP server on `server.bind`.
///
/// Runs until the process is terminated. Returns an error if the backend
/// cannot be opened or the address cannot be bound.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let writer = build_writer(config).await?;
    run_server_with_writer(config, writer).await
}

/// Like [`run_server`], but serves an already-built writer.
pub async fn run_server_with_writer(config: &Config, writer: DualWriter) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let model = writer.embedder().model_name().to_string();
    let state = AppState {
        config: Arc::new(config.clone()),
        writer,
    };
    let app = router(state);

    if !config.embedding.is_enabled() {
        warn!("embedding provider is disabled; documents with text will fail to index");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        bind = %bind_addr,
        base_path = %config.server.base_path,
        backend = ?config.db.backend,
        embedding = %config.embedding.provider,
        model = %model,
        "docvec server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// The full route table, nested under `server.base_path` if set.
pub fn router(state: AppState) -> Router {
    let base_path = state.config.server.base_path.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route(
            "/collections",
            post(handle_create)
                .get(handle_read)
                .put(handle_update)
                .delete(handle_delete),
        )
        .route("/collections/query", post(handle_query))
        .route("/collections/vectors", get(handle_vectors))
        .route("/collections/reconcile", post(handle_reconcile))
        .route("/health", get(handle_health))
        .with_state(state);

    let app = if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(&base_path, routes)
    };

    app.layer(TraceLayer::new_for_http()).layer(cors)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    mensaje: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error",
            mensaje: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 422 error for a request that does not match its shape.
fn unprocessable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        unprocessable(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        unprocessable(rejection.body_text())
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let committed = err.committed();
        if committed.is_empty() {
            error!(error = %err, "request failed");
        } else {
            warn!(
                error = %err,
                committed = ?committed,
                "documents committed but vector index not updated"
            );
        }
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<T, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /collections ============

/// `POST /collections`: insert documents, then index the ones with text.
async fn handle_create(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateResponse>)> {
    let Json(req) = body?;
    let documentos = req.documentos.unwrap_or_default();
    if documentos.is_empty() {
        return Ok((StatusCode::CREATED, Json(CreateResponse::nothing_happened())));
    }

    let outcome = state
        .writer
        .create(&req.nombre_colleccion, documentos)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse::created(&req.nombre_colleccion, outcome)),
    ))
}

/// `GET /collections`: collection names, or one collection's documents.
async fn handle_read(
    State(state): State<AppState>,
    params: Result<Query<ReadParams>, QueryRejection>,
) -> ApiResult<Json<ReadResponse>> {
    let Query(params) = params?;
    let outcome = state
        .writer
        .read(params.nombre.as_deref(), params.id.as_deref())
        .await?;
    Ok(Json(outcome.into()))
}

/// `PUT /collections`: apply `{_id, field: value}` updates in order.
async fn handle_update(
    State(state): State<AppState>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateResponse>> {
    let Json(req) = body?;
    let outcome = state
        .writer
        .update(&req.nombre_colleccion, req.actualizaciones)
        .await?;
    Ok(Json(UpdateResponse::new(&req.nombre_colleccion, outcome)))
}

/// `DELETE /collections`: delete by id; unknown ids are skipped.
async fn handle_delete(
    State(state): State<AppState>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let Json(req) = body?;
    let outcome = state
        .writer
        .delete(&req.nombre_colleccion, &req.ids)
        .await?;
    Ok(Json(DeleteResponse::new(&req.nombre_colleccion, outcome)))
}

/// `POST /collections/query`: nearest neighbours of `consulta`.
async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<QueryResponse>)> {
    let Json(req) = body?;
    let k = req.k.unwrap_or(state.config.collections.default_k);
    let hits = state
        .writer
        .query(&req.nombre_colleccion, &req.consulta, k)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(QueryResponse::new(req.consulta, hits)),
    ))
}

async fn handle_vectors(
    State(state): State<AppState>,
    params: Result<Query<VectorsParams>, QueryRejection>,
) -> ApiResult<Json<VectorsResponse>> {
    let Query(params) = params?;
    let records = state.writer.vector_records(&params.nombre).await?;
    Ok(Json(records.into()))
}

async fn handle_reconcile(
    State(state): State<AppState>,
    body: Result<Json<ReconcileRequest>, JsonRejection>,
) -> ApiResult<Json<ReconcileResponse>> {
    let Json(req) = body?;
    let report = reconcile(&state.writer, &req.nombre_colleccion, req.dry_run).await?;
    Ok(Json(report.into()))
}
