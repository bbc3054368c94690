//! Error taxonomy for the sync and retrieval pipeline.
//!
//! The agent-facing tool surface never raises these to its caller — every
//! failure there becomes a structured `{ success: false, message }` result.
//! Batch sync catches [`SyncError`] per article and continues; the webhook
//! ingress is the one place where a hard rejection (401) is correct.

use thiserror::Error;

/// Failure modes of syncing a single article into the vector store.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The requested article/slug does not exist in the CMS.
    #[error("article not found in CMS: {0}")]
    SourceNotFound(String),

    /// The article exists but yields no extractable text. Treated as a
    /// skip, not a failure, in batch statistics.
    #[error("no extractable content for article: {0}")]
    EmptyContent(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Persistence failed. The transactional upsert guarantees the prior
    /// row set stays visible when this happens mid-replace.
    #[error("vector store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("CMS request failed: {0}")]
    Source(#[from] anyhow::Error),
}

/// The external embedding call failed or returned malformed output.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,

    /// The provider returned an error (after retries, for retryable ones).
    #[error("embedding provider: {0}")]
    Provider(String),

    /// Wrong dimensionality, count mismatch, or empty result for
    /// non-empty input. The batch call fails atomically on any of these.
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

/// Webhook signature verification failures. All map to a 401 response.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature header missing while a webhook secret is configured")]
    Missing,

    #[error("request timestamp is older than the {0}s TTL")]
    Stale(u64),

    #[error("signature does not match the canonical request")]
    Mismatch,
}
