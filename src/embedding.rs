//! Embedding provider abstraction and the OpenAI-backed implementation.
//!
//! The [`Embedder`] trait is the seam between the sync pipeline and the
//! external embedding model: a pure function from text to a fixed-length
//! float vector, single or batched. The batch call is atomic — either every
//! input gets a vector, in input order, or the whole call fails with an
//! [`EmbeddingError`].
//!
//! Vector utilities for SQLite BLOB storage live here too:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].
//!
//! # Retry strategy
//!
//! The OpenAI client retries transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// Trait for embedding providers.
///
/// Implementations must be stateless with respect to the text they embed:
/// the same input always maps to the same vector space position, and batch
/// results come back in input order, one vector per input.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the fixed embedding dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts. Atomic: fails whole if any item fails, and
    /// the output order matches the input order one-to-one.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embedding provider backed by the OpenAI `POST /v1/embeddings` endpoint.
///
/// Requires an API key in the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// Create a provider from configuration.
    ///
    /// Fails when the config lacks `model`/`dims` or the API key is not in
    /// the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        if !config.is_enabled() {
            return Err(EmbeddingError::Disabled);
        }
        let model = config
            .model
            .clone()
            .ok_or_else(|| EmbeddingError::Provider("embedding.model not configured".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| EmbeddingError::Provider("embedding.dims not configured".into()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EmbeddingError::Provider("OPENAI_API_KEY not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Provider(e.to_string()))?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
                        return parse_embeddings_response(&json, texts.len(), self.dims);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbeddingError::Provider(format!(
                            "API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbeddingError::Provider(format!(
                        "API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbeddingError::Provider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbeddingError::Provider("embedding failed after retries".into())))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.call_api(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("empty response for single input".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.call_api(texts).await
    }
}

/// Stand-in used when `[embedding].provider = "disabled"`. Every call fails
/// with [`EmbeddingError::Disabled`] so callers surface a clear message
/// instead of silently storing garbage vectors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

/// Build the provider named by the configuration.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledEmbedder));
    }
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => Err(EmbeddingError::Provider(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

/// Parse the embeddings API response, enforcing the one-vector-per-input
/// and fixed-dimensionality contracts.
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected_count: usize,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::Malformed("missing data array".into()))?;

    if data.len() != expected_count {
        return Err(EmbeddingError::Malformed(format!(
            "expected {} embeddings, got {}",
            expected_count,
            data.len()
        )));
    }

    // The API documents data[] in input order, but carries an index field;
    // honor it so a reordered response still maps back to its input.
    let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; expected_count];

    for (pos, item) in data.iter().enumerate() {
        let raw = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbeddingError::Malformed("missing embedding field".into()))?;

        let vec: Vec<f32> = raw
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vec.len() != expected_dims {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} dims, got {}",
                expected_dims,
                vec.len()
            )));
        }

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        if index >= expected_count {
            return Err(EmbeddingError::Malformed(format!(
                "embedding index {} out of range",
                index
            )));
        }
        embeddings[index] = Some(vec);
    }

    embeddings
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| EmbeddingError::Malformed("duplicate embedding index".into()))
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_response_in_order() {
        let json = serde_json::json!({
            "data": [
                { "index": 0, "embedding": [1.0, 0.0] },
                { "index": 1, "embedding": [0.0, 1.0] },
            ]
        });
        let vecs = parse_embeddings_response(&json, 2, 2).unwrap();
        assert_eq!(vecs[0], vec![1.0, 0.0]);
        assert_eq!(vecs[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_parse_response_reordered() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });
        let vecs = parse_embeddings_response(&json, 2, 2).unwrap();
        assert_eq!(vecs[0], vec![1.0, 0.0]);
        assert_eq!(vecs[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_parse_response_wrong_dims_rejected() {
        let json = serde_json::json!({
            "data": [ { "index": 0, "embedding": [1.0, 0.0, 0.5] } ]
        });
        let err = parse_embeddings_response(&json, 1, 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::Malformed(_)));
    }

    #[test]
    fn test_parse_response_count_mismatch_rejected() {
        let json = serde_json::json!({
            "data": [ { "index": 0, "embedding": [1.0, 0.0] } ]
        });
        let err = parse_embeddings_response(&json, 2, 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::Malformed(_)));
    }

    #[test]
    fn test_parse_response_missing_data_rejected() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_embeddings_response(&json, 1, 2).is_err());
    }
}
