//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! backend = "sqlite"          # or "memory"
//! path = "./data/docvec.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! base_path = "/api-db"       # optional route prefix
//!
//! [embedding]
//! provider = "hash"           # disabled | hash | openai | ollama | local
//! dims = 256
//!
//! [collections]
//! read_limit = 1000
//! default_k = 5
//! text_fields = ["contenido", "texto"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
        }
    }
}

fn default_backend() -> Backend {
    Backend::Sqlite
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./data/docvec.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Prefix for every route, e.g. `/api-db`. Empty means none.
    #[serde(default)]
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_path: String::new(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Default dimensionality of the `hash` provider.
pub const DEFAULT_HASH_DIMS: usize = 256;

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    #[serde(default = "default_read_limit")]
    pub read_limit: usize,
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_text_fields")]
    pub text_fields: Vec<String>,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            read_limit: default_read_limit(),
            default_k: default_k(),
            text_fields: default_text_fields(),
        }
    }
}

fn default_read_limit() -> usize {
    docvec_core::sync::DEFAULT_READ_LIMIT
}
fn default_k() -> usize {
    5
}
fn default_text_fields() -> Vec<String> {
    docvec_core::models::DEFAULT_TEXT_FIELDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// In-memory stores and hash embeddings; needs no file and no network.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                backend: Backend::Memory,
                path: default_db_path(),
            },
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            collections: CollectionsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.collections.read_limit == 0 {
        anyhow::bail!("collections.read_limit must be > 0");
    }
    if config.collections.default_k == 0 {
        anyhow::bail!("collections.default_k must be > 0");
    }
    if config.collections.text_fields.is_empty() {
        anyhow::bail!("collections.text_fields must name at least one field");
    }

    let base = &config.server.base_path;
    if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
        anyhow::bail!(
            "server.base_path must start with '/' and not end with '/': '{}'",
            base
        );
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() {
                anyhow::bail!(
                    "embedding.dims must be set when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
