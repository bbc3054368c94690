use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub cms: CmsConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, in characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    150
}
fn default_chunk_overlap() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default article count for search results.
    #[serde(default = "default_search_limit")]
    pub search_limit: i64,
    /// Default article count for recommendations.
    #[serde(default = "default_recommend_limit")]
    pub recommend_limit: i64,
    /// Minimum similarity a chunk must exceed to count as a match.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Chunk over-fetch multiplier, so enough distinct articles survive
    /// grouping.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            recommend_limit: default_recommend_limit(),
            threshold: default_threshold(),
            overfetch_factor: default_overfetch_factor(),
        }
    }
}

fn default_search_limit() -> i64 {
    5
}
fn default_recommend_limit() -> i64 {
    3
}
fn default_threshold() -> f64 {
    0.5
}
fn default_overfetch_factor() -> i64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    #[serde(default)]
    pub model: Option<String>,
    /// Fixed vector dimensionality; every stored row shares it.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Texts per provider call during batch embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
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

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CmsConfig {
    /// GraphQL Content API endpoint, e.g.
    /// `https://graphql.contentful.com/content/v1/spaces/<space>`.
    pub graphql_url: String,
    /// Name of the environment variable holding the delivery access token.
    #[serde(default = "default_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    /// Page size for collection queries.
    #[serde(default = "default_collection_limit")]
    pub collection_limit: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "CONTENTFUL_ACCESS_TOKEN".to_string()
}
fn default_locale() -> String {
    "en-US".to_string()
}
fn default_collection_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Name of the environment variable holding the webhook signing secret.
    /// When the variable is unset or empty, verification is skipped with a
    /// loud warning.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// Delete stored embeddings when the CMS reports an unpublish/delete
    /// event. Off by default: tombstones are logged, vectors kept.
    #[serde(default)]
    pub delete_on_removal: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            delete_on_removal: false,
        }
    }
}

fn default_secret_env() -> String {
    "CMS_WEBHOOK_SECRET".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunk_size");
    }

    // Validate retrieval
    if config.retrieval.search_limit < 1 || config.retrieval.recommend_limit < 1 {
        anyhow::bail!("retrieval limits must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.threshold) {
        anyhow::bail!("retrieval.threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.overfetch_factor < 1 {
        anyhow::bail!("retrieval.overfetch_factor must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
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

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.cms.graphql_url.trim().is_empty() {
        anyhow::bail!("cms.graphql_url must not be empty");
    }

    Ok(config)
}
