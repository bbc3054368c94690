//! Chunk store over SQLite.
//!
//! All persistence for the pipeline lives in one denormalized table,
//! `article_chunks`. Writes replace an article's chunk set atomically;
//! similarity search narrows candidates with SQL filters, then scans them
//! with the cosine computed in Rust.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{ArticleMatch, ChunkRecord, MatchingChunk, NewChunkRecord, SearchHit};

/// Filters and limits for [`similarity_search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum number of chunk hits to return.
    pub limit: i64,
    /// Hits must score strictly above this to be returned.
    pub threshold: f64,
    /// Restrict candidates to one locale.
    pub locale: Option<String>,
    /// Drop candidates from these slugs, used by recommendations so an
    /// article never recommends itself.
    pub exclude_slugs: Vec<String>,
}

/// Replace an article's chunk set for one locale.
///
/// Deletes existing rows for `(article_id, locale)` and inserts the new set
/// in a single transaction, so readers never observe a mix of old and new
/// chunks. Returns the number of rows inserted. An empty slice is a no-op.
///
/// All records in the slice must share one `(article_id, locale)` key; the
/// delete is keyed off the first record, so a mixed slice would leave stale
/// rows behind for the other keys.
pub async fn upsert_article_chunks(
    pool: &SqlitePool,
    chunks: &[NewChunkRecord],
) -> Result<usize, sqlx::Error> {
    let first = match chunks.first() {
        Some(first) => first,
        None => return Ok(0),
    };
    debug_assert!(
        chunks
            .iter()
            .all(|c| c.article_id == first.article_id && c.locale == first.locale),
        "upsert_article_chunks called with mixed (article_id, locale) keys"
    );

    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM article_chunks WHERE article_id = ? AND locale = ?")
        .bind(&first.article_id)
        .bind(&first.locale)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        let tags = serde_json::to_string(&chunk.tags).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            r#"
            INSERT INTO article_chunks (
                id, article_id, slug, locale, title, short_description,
                author_name, published_date, chunk_content, chunk_index,
                total_chunks, embedding, tags, last_synced_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&chunk.article_id)
        .bind(&chunk.slug)
        .bind(&chunk.locale)
        .bind(&chunk.title)
        .bind(&chunk.short_description)
        .bind(&chunk.author_name)
        .bind(&chunk.published_date)
        .bind(&chunk.chunk_content)
        .bind(chunk.chunk_index)
        .bind(chunk.total_chunks)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(tags)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(chunks.len())
}

/// Delete every stored chunk for an article, across all locales. Returns
/// the number of rows removed; deleting an unknown article is not an error.
pub async fn delete_article(pool: &SqlitePool, article_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM article_chunks WHERE article_id = ?")
        .bind(article_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete an article's chunks for one locale only.
pub async fn delete_article_locale(
    pool: &SqlitePool,
    article_id: &str,
    locale: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM article_chunks WHERE article_id = ? AND locale = ?")
        .bind(article_id)
        .bind(locale)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Brute-force cosine similarity search over the chunk table.
///
/// SQL narrows the candidate set (locale, slug exclusion); the cosine runs
/// in Rust over the surviving rows. Results are sorted by similarity
/// descending and truncated to `limit`. Embeddings with a dimension
/// mismatch score zero and fall below any positive threshold.
pub async fn similarity_search(
    pool: &SqlitePool,
    query_embedding: &[f32],
    opts: &SearchOptions,
) -> Result<Vec<SearchHit>, sqlx::Error> {
    let mut sql = String::from("SELECT * FROM article_chunks WHERE 1=1");
    if opts.locale.is_some() {
        sql.push_str(" AND locale = ?");
    }
    for _ in &opts.exclude_slugs {
        sql.push_str(" AND slug != ?");
    }

    let mut query = sqlx::query(&sql);
    if let Some(locale) = &opts.locale {
        query = query.bind(locale);
    }
    for slug in &opts.exclude_slugs {
        query = query.bind(slug);
    }

    let rows = query.fetch_all(pool).await?;

    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .map(|row| {
            let record = row_to_record(&row);
            let similarity = f64::from(cosine_similarity(query_embedding, &record.embedding));
            SearchHit { record, similarity }
        })
        .filter(|hit| hit.similarity > opts.threshold)
        .collect();

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(opts.limit.max(0) as usize);

    Ok(hits)
}

/// Fetch an article's chunks by slug and locale, ordered by chunk index.
pub async fn get_article_chunks(
    pool: &SqlitePool,
    slug: &str,
    locale: &str,
) -> Result<Vec<ChunkRecord>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM article_chunks WHERE slug = ? AND locale = ? ORDER BY chunk_index ASC",
    )
    .bind(slug)
    .bind(locale)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_record).collect())
}

/// Distinct article ids currently present in the store. Used by the
/// reconciliation pass to find articles the CMS no longer lists.
pub async fn list_all_article_ids(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query("SELECT DISTINCT article_id FROM article_chunks ORDER BY article_id")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("article_id")).collect())
}

/// Aggregate chunk-level hits into per-article matches.
///
/// Articles are keyed by `(slug, locale)`, ranked by their best chunk's
/// similarity, and truncated to `limit`. Each match keeps its chunks
/// sorted best-first so callers can lift an excerpt from the top one.
pub fn group_and_rank_by_article(hits: Vec<SearchHit>, limit: usize) -> Vec<ArticleMatch> {
    let mut matches: Vec<ArticleMatch> = Vec::new();

    for hit in hits {
        let key = (hit.record.slug.clone(), hit.record.locale.clone());
        let chunk = MatchingChunk {
            content: hit.record.chunk_content.clone(),
            chunk_index: hit.record.chunk_index,
            similarity: hit.similarity,
        };

        match matches
            .iter_mut()
            .find(|m| (m.slug.clone(), m.locale.clone()) == key)
        {
            Some(existing) => existing.matching_chunks.push(chunk),
            None => matches.push(ArticleMatch {
                slug: hit.record.slug,
                locale: hit.record.locale,
                title: hit.record.title,
                short_description: hit.record.short_description,
                author_name: hit.record.author_name,
                published_date: hit.record.published_date,
                max_similarity: 0.0,
                avg_similarity: 0.0,
                matching_chunks: vec![chunk],
            }),
        }
    }

    for m in &mut matches {
        m.matching_chunks.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        m.max_similarity = m
            .matching_chunks
            .first()
            .map(|c| c.similarity)
            .unwrap_or(0.0);
        m.avg_similarity = m.matching_chunks.iter().map(|c| c.similarity).sum::<f64>()
            / m.matching_chunks.len() as f64;
    }

    matches.sort_by(|a, b| {
        b.max_similarity
            .partial_cmp(&a.max_similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit);
    matches
}

/// Corpus-level counts for the status report.
#[derive(Debug, Clone)]
pub struct CorpusStats {
    pub total_chunks: i64,
    pub distinct_articles: i64,
    /// `(locale, chunk count)` pairs, largest first.
    pub locales: Vec<(String, i64)>,
    /// Unix timestamp of the most recent sync, if any rows exist.
    pub last_synced_at: Option<i64>,
}

pub async fn corpus_stats(pool: &SqlitePool) -> Result<CorpusStats, sqlx::Error> {
    let totals = sqlx::query(
        "SELECT COUNT(*) AS chunks, COUNT(DISTINCT article_id) AS articles, MAX(last_synced_at) AS last_sync FROM article_chunks",
    )
    .fetch_one(pool)
    .await?;

    let locale_rows = sqlx::query(
        "SELECT locale, COUNT(*) AS chunks FROM article_chunks GROUP BY locale ORDER BY chunks DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(CorpusStats {
        total_chunks: totals.get("chunks"),
        distinct_articles: totals.get("articles"),
        locales: locale_rows
            .iter()
            .map(|row| (row.get("locale"), row.get("chunks")))
            .collect(),
        last_synced_at: totals.get("last_sync"),
    })
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
    let blob: Vec<u8> = row.get("embedding");
    let tags_json: String = row.get("tags");

    ChunkRecord {
        id: row.get("id"),
        article_id: row.get("article_id"),
        slug: row.get("slug"),
        locale: row.get("locale"),
        title: row.get("title"),
        short_description: row.get("short_description"),
        author_name: row.get("author_name"),
        published_date: row.get("published_date"),
        chunk_content: row.get("chunk_content"),
        chunk_index: row.get("chunk_index"),
        total_chunks: row.get("total_chunks"),
        embedding: blob_to_vec(&blob),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
