//! Core data models used throughout lectern.
//!
//! These types represent the chunk records, search hits, and grouped article
//! results that flow through the sync and retrieval pipeline.

use serde::Serialize;

/// A persisted chunk row: one contiguous, overlap-bounded slice of one
/// article's body text, in one locale.
///
/// Metadata (title, author, description, published date) is denormalized
/// onto every row so retrieval needs no join.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub article_id: String,
    pub slug: String,
    pub locale: String,
    pub title: String,
    pub short_description: Option<String>,
    pub author_name: Option<String>,
    /// RFC3339 publish timestamp from the CMS, if the article has one.
    pub published_date: Option<String>,
    /// Raw chunk text, without the injected context header.
    pub chunk_content: String,
    /// 0-based position within the article's chunk sequence.
    pub chunk_index: i64,
    /// Count of chunks for this (article_id, locale) at sync time.
    pub total_chunks: i64,
    pub embedding: Vec<f32>,
    pub tags: Vec<String>,
    pub last_synced_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A chunk row ready for insertion. The row id and created/updated
/// timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewChunkRecord {
    pub article_id: String,
    pub slug: String,
    pub locale: String,
    pub title: String,
    pub short_description: Option<String>,
    pub author_name: Option<String>,
    pub published_date: Option<String>,
    pub chunk_content: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub embedding: Vec<f32>,
    pub tags: Vec<String>,
}

/// A chunk row returned from similarity search, scored against the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: ChunkRecord,
    /// `1 - cosine_distance`, higher is closer.
    pub similarity: f64,
}

/// A matching chunk inside an [`ArticleMatch`], stripped to what callers
/// need for excerpts.
#[derive(Debug, Clone, Serialize)]
pub struct MatchingChunk {
    pub content: String,
    pub chunk_index: i64,
    pub similarity: f64,
}

/// Chunk-level search hits aggregated to one article.
///
/// Ranking uses max similarity so a single highly relevant passage can
/// surface its whole article even when the other chunks are weak matches.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleMatch {
    pub slug: String,
    pub locale: String,
    pub title: String,
    pub short_description: Option<String>,
    pub author_name: Option<String>,
    pub published_date: Option<String>,
    pub max_similarity: f64,
    pub avg_similarity: f64,
    /// This article's matching chunks, sorted by similarity descending.
    pub matching_chunks: Vec<MatchingChunk>,
}
