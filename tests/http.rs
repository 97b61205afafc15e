//! End-to-end tests for the collections HTTP API.
//!
//! Each test starts the server on a free port with in-memory stores and the
//! hash embedding provider, then drives it with `reqwest`.

use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

use docvec::config::Config;
use docvec::server::{build_writer, run_server_with_writer};
use docvec_core::embedding::HashingProvider;
use docvec_core::store::memory::{InMemoryDocumentStore, InMemoryVectorIndex};
use docvec_core::{DualWriter, VectorIndex};

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(base: &str) {
    let client = reqwest::Client::new();
    let url = format!("{}/health", base);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(mut config: Config, writer: DualWriter) -> Self {
        let port = find_free_port();
        config.server.bind = format!("127.0.0.1:{}", port);
        let base = format!("http://127.0.0.1:{}{}", port, config.server.base_path);

        let handle = tokio::spawn(async move {
            run_server_with_writer(&config, writer).await.unwrap();
        });
        wait_for_server(&base).await;

        Self {
            base,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn memory() -> Self {
        let config = Config::minimal();
        let writer = build_writer(&config).await.unwrap();
        Self::start(config, writer).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .request(method, self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_version() {
    let server = TestServer::memory().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

/// POST one document, DELETE it by id, then GET shows an empty collection.
#[tokio::test]
async fn test_create_delete_read_scenario() {
    let server = TestServer::memory().await;

    let (status, body) = server
        .send(
            Method::POST,
            "/collections",
            json!({"nombre_colleccion": "t", "documentos": [{"contenido": "hola"}]}),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["status"], "creado!");
    assert_eq!(body["indexados"], 1);
    let ids = body["ids"].as_array().unwrap();
    assert_eq!(ids.len(), 1);
    let id = ids[0].as_str().unwrap().to_string();

    let (_, vectors) = server.get("/collections/vectors?nombre=t").await;
    assert_eq!(vectors["ids"], json!([id]));
    assert_eq!(vectors["metadatas"][0]["document_id"], id);

    let (status, body) = server
        .send(
            Method::DELETE,
            "/collections",
            json!({"nombre_colleccion": "t", "ids": [id]}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "eliminado!");
    assert_eq!(body["ids"], json!([id]));

    let (status, body) = server.get("/collections?nombre=t").await;
    assert_eq!(status, 200);
    assert_eq!(body["estatus"], "fetched!");
    assert_eq!(body["coleccion"], "t");
    assert_eq!(body["documentos"], json!([]));

    let (_, vectors) = server.get("/collections/vectors?nombre=t").await;
    assert_eq!(vectors["ids"], json!([]));
}

#[tokio::test]
async fn test_empty_create_reports_nothing_happened() {
    let server = TestServer::memory().await;
    let (status, body) = server
        .send(
            Method::POST,
            "/collections",
            json!({"nombre_colleccion": "t", "documentos": []}),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["status"], "nothing happened!");

    for request in [
        json!({"nombre_colleccion": "t"}),
        json!({"nombre_colleccion": "t", "documentos": null}),
    ] {
        let (status, body) = server.send(Method::POST, "/collections", request).await;
        assert_eq!(status, 201);
        assert_eq!(body["status"], "nothing happened!");
    }

    let (_, body) = server.get("/collections").await;
    assert_eq!(body["colecciones_disponibles"], json!([]));
}

#[tokio::test]
async fn test_documents_without_text_are_stored_not_indexed() {
    let server = TestServer::memory().await;
    let (_, body) = server
        .send(
            Method::POST,
            "/collections",
            json!({"nombre_colleccion": "t", "documentos": [{"titulo": "a"}, {"contenido": "b"}]}),
        )
        .await;
    assert_eq!(body["indexados"], 1);
    assert_eq!(body["omitidos"][0]["indice"], 0);
    assert_eq!(body["omitidos"][0]["motivo"], "no_indexable_text");

    let (_, body) = server.get("/collections").await;
    assert_eq!(body["colecciones_disponibles"], json!(["t"]));

    let first = body_id(&server, "t", 0).await;
    let (_, body) = server
        .get(&format!("/collections?nombre=t&id={}", first))
        .await;
    let docs = body["documentos"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["titulo"], "a");
}

async fn body_id(server: &TestServer, collection: &str, index: usize) -> String {
    let (_, body) = server
        .get(&format!("/collections?nombre={}", collection))
        .await;
    body["documentos"][index]["_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// create "hello" → update "world" → query "world" ranks it first.
#[tokio::test]
async fn test_update_reindexes_and_query_ranks() {
    let server = TestServer::memory().await;
    let (_, body) = server
        .send(
            Method::POST,
            "/collections",
            json!({
                "nombre_colleccion": "notas",
                "documentos": [
                    {"_id": "a", "contenido": "hello"},
                    {"_id": "b", "contenido": "zebra stripes"}
                ]
            }),
        )
        .await;
    assert_eq!(body["ids"], json!(["a", "b"]));

    let (status, body) = server
        .send(
            Method::PUT,
            "/collections",
            json!({
                "nombre_colleccion": "notas",
                "actualizaciones": [
                    {"_id": "a", "contenido": "world"},
                    {"contenido": "sin id"},
                    {"_id": "nope", "contenido": "x"}
                ]
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "actualizado!");
    assert_eq!(body["ids"], json!(["a"]));
    assert_eq!(body["reindexados"], json!(["a"]));
    assert_eq!(body["omitidos"][0]["motivo"], "missing_id");
    assert_eq!(body["omitidos"][1]["motivo"], "not_modified");
    assert_eq!(body["omitidos"][1]["id"], "nope");

    let (status, body) = server
        .send(
            Method::POST,
            "/collections/query",
            json!({"nombre_colleccion": "notas", "consulta": "world", "k": 5}),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["query"], "world");
    let ids = body["resultados"]["ids"][0].as_array().unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], "a");
    assert_eq!(body["resultados"]["documents"][0][0], "world");

    let (_, vectors) = server.get("/collections/vectors?nombre=notas").await;
    let documents = vectors["documents"].as_array().unwrap();
    assert!(documents.contains(&json!("world")));
    assert!(!documents.contains(&json!("hello")));
}

#[tokio::test]
async fn test_query_k_and_collection_isolation() {
    let server = TestServer::memory().await;
    let docs: Vec<Value> = (0..8)
        .map(|i| json!({"contenido": format!("documento numero {}", i)}))
        .collect();
    server
        .send(
            Method::POST,
            "/collections",
            json!({"nombre_colleccion": "a", "documentos": docs}),
        )
        .await;
    server
        .send(
            Method::POST,
            "/collections",
            json!({
                "nombre_colleccion": "b",
                "documentos": [{"_id": "otro", "contenido": "documento"}]
            }),
        )
        .await;

    let (_, body) = server
        .send(
            Method::POST,
            "/collections/query",
            json!({"nombre_colleccion": "a", "consulta": "documento"}),
        )
        .await;
    let ids = body["resultados"]["ids"][0].as_array().unwrap();
    assert_eq!(ids.len(), 5);
    assert!(!ids.contains(&json!("otro")));

    let distances: Vec<f64> = body["resultados"]["distances"][0]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d.as_f64().unwrap())
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_delete_unknown_id_is_skipped() {
    let server = TestServer::memory().await;
    let (status, body) = server
        .send(
            Method::DELETE,
            "/collections",
            json!({"nombre_colleccion": "t", "ids": ["fantasma"]}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["ids"], json!([]));
    assert_eq!(
        body["omitidos"],
        json!([{"indice": 0, "id": "fantasma", "motivo": "not_found"}])
    );
}

#[tokio::test]
async fn test_malformed_bodies_are_422() {
    let server = TestServer::memory().await;

    let (status, body) = server
        .send(Method::POST, "/collections", json!({"documentos": []}))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["status"], "error");
    assert!(body["mensaje"].as_str().is_some());

    let resp = server
        .client
        .put(server.url("/collections"))
        .header("content-type", "application/json")
        .body("{")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    let (status, body) = server.get("/collections/vectors").await;
    assert_eq!(status, 422);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_duplicate_id_is_500_with_message() {
    let server = TestServer::memory().await;
    let create = json!({"nombre_colleccion": "t", "documentos": [{"_id": "x", "contenido": "a"}]});
    server.send(Method::POST, "/collections", create.clone()).await;
    let (status, body) = server.send(Method::POST, "/collections", create).await;
    assert_eq!(status, 500);
    assert_eq!(body["status"], "error");
    assert!(body["mensaje"].as_str().unwrap().contains("duplicate key"));
}

#[tokio::test]
async fn test_reconcile_restores_missing_vector() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let writer = DualWriter::new(
        Arc::new(InMemoryDocumentStore::new()),
        index.clone(),
        Arc::new(HashingProvider::new(64).unwrap()),
    );
    let server = TestServer::start(Config::minimal(), writer).await;

    server
        .send(
            Method::POST,
            "/collections",
            json!({"nombre_colleccion": "t", "documentos": [{"_id": "a", "texto": "uno"}]}),
        )
        .await;
    index.delete("t", &["a".to_string()]).await.unwrap();

    let (status, body) = server
        .send(
            Method::POST,
            "/collections/reconcile",
            json!({"nombre_colleccion": "t", "dry_run": true}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["faltantes"], json!(["a"]));
    let (_, vectors) = server.get("/collections/vectors?nombre=t").await;
    assert_eq!(vectors["ids"], json!([]));

    let (_, body) = server
        .send(
            Method::POST,
            "/collections/reconcile",
            json!({"nombre_colleccion": "t"}),
        )
        .await;
    assert_eq!(body["status"], "reconciliado!");
    assert_eq!(body["faltantes"], json!(["a"]));
    let (_, vectors) = server.get("/collections/vectors?nombre=t").await;
    assert_eq!(vectors["ids"], json!(["a"]));
}

#[tokio::test]
async fn test_base_path_prefixes_every_route() {
    let mut config = Config::minimal();
    config.server.base_path = "/api-db".to_string();
    let writer = build_writer(&config).await.unwrap();
    let server = TestServer::start(config, writer).await;

    let (status, _) = server
        .send(
            Method::POST,
            "/collections",
            json!({"nombre_colleccion": "t", "documentos": [{"contenido": "x"}]}),
        )
        .await;
    assert_eq!(status, 201);

    let unprefixed = server.base.trim_end_matches("/api-db").to_string();
    let resp = server
        .client
        .get(format!("{}/collections", unprefixed))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
