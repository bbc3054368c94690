//! Store and sync pipeline tests against an in-memory SQLite database.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;

use lectern::cms::{ContentSource, SourceArticle};
use lectern::config::Config;
use lectern::embedding::Embedder;
use lectern::error::EmbeddingError;
use lectern::migrate;
use lectern::models::NewChunkRecord;
use lectern::store::{self, SearchOptions};
use lectern::sync::SyncService;
use lectern::tools::{RecommendRelatedArticles, Tool, ToolContext};

async fn test_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    pool
}

fn chunk(article_id: &str, slug: &str, locale: &str, index: i64, total: i64, embedding: Vec<f32>) -> NewChunkRecord {
    NewChunkRecord {
        article_id: article_id.to_string(),
        slug: slug.to_string(),
        locale: locale.to_string(),
        title: format!("Title of {slug}"),
        short_description: Some("A short description.".to_string()),
        author_name: Some("Test Author".to_string()),
        published_date: Some("2024-05-01T08:00:00Z".to_string()),
        chunk_content: format!("{slug} chunk {index}"),
        chunk_index: index,
        total_chunks: total,
        embedding,
        tags: vec![],
    }
}

fn chunks_for(article_id: &str, slug: &str, locale: &str, count: i64) -> Vec<NewChunkRecord> {
    (0..count)
        .map(|i| chunk(article_id, slug, locale, i, count, vec![1.0, 0.0, 0.0]))
        .collect()
}

#[tokio::test]
async fn test_upsert_replaces_previous_chunk_set() {
    let pool = test_pool().await;

    let first = chunks_for("a1", "essay", "en-US", 5);
    assert_eq!(store::upsert_article_chunks(&pool, &first).await.unwrap(), 5);

    // A shorter re-sync must leave no orphans from the longer first pass.
    let second = chunks_for("a1", "essay", "en-US", 3);
    assert_eq!(store::upsert_article_chunks(&pool, &second).await.unwrap(), 3);

    let stored = store::get_article_chunks(&pool, "essay", "en-US").await.unwrap();
    assert_eq!(stored.len(), 3);
    let indexes: Vec<i64> = stored.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert!(stored.iter().all(|c| c.total_chunks == 3));
}

#[tokio::test]
async fn test_upsert_empty_slice_is_noop() {
    let pool = test_pool().await;
    assert_eq!(store::upsert_article_chunks(&pool, &[]).await.unwrap(), 0);
}

#[tokio::test]
#[should_panic(expected = "mixed (article_id, locale) keys")]
async fn test_upsert_rejects_mixed_keys() {
    let pool = test_pool().await;
    // The delete is keyed off the first record, so one call must cover
    // exactly one (article_id, locale).
    let mut records = chunks_for("a1", "essay", "en-US", 1);
    records.extend(chunks_for("a2", "other", "en-US", 1));
    let _ = store::upsert_article_chunks(&pool, &records).await;
}

#[tokio::test]
async fn test_upsert_preserves_other_locales() {
    let pool = test_pool().await;
    store::upsert_article_chunks(&pool, &chunks_for("a1", "essay", "en-US", 2))
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &chunks_for("a1", "essay", "de-DE", 4))
        .await
        .unwrap();

    // Re-syncing one locale leaves the other untouched.
    store::upsert_article_chunks(&pool, &chunks_for("a1", "essay", "en-US", 1))
        .await
        .unwrap();

    assert_eq!(store::get_article_chunks(&pool, "essay", "en-US").await.unwrap().len(), 1);
    assert_eq!(store::get_article_chunks(&pool, "essay", "de-DE").await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_delete_article_is_idempotent() {
    let pool = test_pool().await;
    store::upsert_article_chunks(&pool, &chunks_for("a1", "essay", "en-US", 3))
        .await
        .unwrap();

    assert_eq!(store::delete_article(&pool, "a1").await.unwrap(), 3);
    assert_eq!(store::delete_article(&pool, "a1").await.unwrap(), 0);
    assert_eq!(store::delete_article(&pool, "never-existed").await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_article_locale_scoped() {
    let pool = test_pool().await;
    store::upsert_article_chunks(&pool, &chunks_for("a1", "essay", "en-US", 2))
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &chunks_for("a1", "essay", "de-DE", 2))
        .await
        .unwrap();

    assert_eq!(store::delete_article_locale(&pool, "a1", "de-DE").await.unwrap(), 2);
    assert_eq!(store::get_article_chunks(&pool, "essay", "en-US").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_similarity_search_orders_and_thresholds() {
    let pool = test_pool().await;

    // Three articles at controlled angles to the query vector [1, 0, 0]:
    // exact match, ~0.71, and orthogonal (filtered by any positive threshold).
    store::upsert_article_chunks(&pool, &[chunk("a1", "close", "en-US", 0, 1, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &[chunk("a2", "middling", "en-US", 0, 1, vec![1.0, 1.0, 0.0])])
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &[chunk("a3", "unrelated", "en-US", 0, 1, vec![0.0, 1.0, 0.0])])
        .await
        .unwrap();

    let opts = SearchOptions {
        limit: 10,
        threshold: 0.5,
        locale: Some("en-US".to_string()),
        exclude_slugs: Vec::new(),
    };
    let hits = store::similarity_search(&pool, &[1.0, 0.0, 0.0], &opts).await.unwrap();

    let slugs: Vec<&str> = hits.iter().map(|h| h.record.slug.as_str()).collect();
    assert_eq!(slugs, vec!["close", "middling"]);
    assert!(hits[0].similarity > hits[1].similarity);
    assert!(hits[1].similarity > 0.5);
}

#[tokio::test]
async fn test_similarity_search_locale_filter() {
    let pool = test_pool().await;
    store::upsert_article_chunks(&pool, &[chunk("a1", "essay", "en-US", 0, 1, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &[chunk("a1", "essay", "de-DE", 0, 1, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();

    let opts = SearchOptions {
        limit: 10,
        threshold: 0.0,
        locale: Some("de-DE".to_string()),
        exclude_slugs: Vec::new(),
    };
    let hits = store::similarity_search(&pool, &[1.0, 0.0, 0.0], &opts).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.locale, "de-DE");
}

#[tokio::test]
async fn test_similarity_search_excludes_slugs() {
    let pool = test_pool().await;
    store::upsert_article_chunks(&pool, &[chunk("a1", "source", "en-US", 0, 1, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &[chunk("a2", "other", "en-US", 0, 1, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();

    let opts = SearchOptions {
        limit: 10,
        threshold: 0.0,
        locale: None,
        exclude_slugs: vec!["source".to_string()],
    };
    let hits = store::similarity_search(&pool, &[1.0, 0.0, 0.0], &opts).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.slug, "other");
}

// -- sync pipeline with fake CMS and embedder ------------------------------

struct FakeCms {
    articles: Vec<SourceArticle>,
}

fn rich_text(paragraphs: &[&str]) -> serde_json::Value {
    let blocks: Vec<serde_json::Value> = paragraphs
        .iter()
        .map(|p| {
            json!({
                "nodeType": "paragraph",
                "content": [{ "nodeType": "text", "value": p }]
            })
        })
        .collect();
    json!({ "nodeType": "document", "content": blocks })
}

fn source_article(id: &str, slug: &str, body: serde_json::Value) -> SourceArticle {
    SourceArticle {
        id: id.to_string(),
        slug: slug.to_string(),
        title: format!("Title of {slug}"),
        short_description: Some("A short description.".to_string()),
        author_name: Some("Test Author".to_string()),
        published_date: Some("2024-05-01T08:00:00Z".to_string()),
        rich_content: body,
    }
}

#[async_trait]
impl ContentSource for FakeCms {
    async fn fetch_by_slug(&self, slug: &str, _locale: &str) -> anyhow::Result<Option<SourceArticle>> {
        Ok(self.articles.iter().find(|a| a.slug == slug).cloned())
    }

    async fn fetch_collection(&self, _locale: &str) -> anyhow::Result<Vec<SourceArticle>> {
        Ok(self.articles.clone())
    }
}

struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        // Deterministic direction derived from the text length, so distinct
        // inputs land at distinct but reproducible angles.
        let n = (text.len() % 7) as f32;
        Ok(vec![1.0, n * 0.1, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}

fn test_config() -> Config {
    let toml = r#"
        [db]
        path = ":memory:"

        [cms]
        graphql_url = "https://example.invalid/graphql"
        access_token_env = "UNUSED_TOKEN"

        [server]
        bind = "127.0.0.1:0"
    "#;
    toml::from_str(toml).unwrap()
}

fn sync_service(pool: SqlitePool, cms: FakeCms) -> SyncService {
    SyncService::new(pool, Arc::new(cms), Arc::new(FakeEmbedder), test_config())
}

#[tokio::test]
async fn test_sync_article_writes_contiguous_chunks() {
    let pool = test_pool().await;
    let body = rich_text(&[
        "The first paragraph talks about gardens and the changing seasons in some detail.",
        "The second paragraph wanders toward cooking, preserving, and the pantry shelf.",
        "The third paragraph closes with a note on patience and the long view of things.",
    ]);
    let cms = FakeCms { articles: vec![source_article("a1", "gardens", body)] };
    let service = sync_service(pool.clone(), cms);

    let written = service.sync_article("gardens", "en-US").await.unwrap();
    assert!(written >= 2, "body longer than one chunk should split");

    let stored = store::get_article_chunks(&pool, "gardens", "en-US").await.unwrap();
    assert_eq!(stored.len(), written);
    for (i, c) in stored.iter().enumerate() {
        assert_eq!(c.chunk_index, i as i64);
        assert_eq!(c.total_chunks, written as i64);
        assert_eq!(c.article_id, "a1");
        assert_eq!(c.embedding.len(), 3);
    }
}

#[tokio::test]
async fn test_sync_unknown_slug_fails() {
    let pool = test_pool().await;
    let service = sync_service(pool, FakeCms { articles: vec![] });
    let err = service.sync_article("ghost", "en-US").await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_sync_all_counts_and_reconciles() {
    let pool = test_pool().await;

    // A stale article in the store that the CMS no longer lists.
    store::upsert_article_chunks(&pool, &chunks_for("stale-id", "gone", "en-US", 2))
        .await
        .unwrap();

    let cms = FakeCms {
        articles: vec![
            source_article("a1", "alpha", rich_text(&["Plenty of text for the first article body."])),
            source_article("a2", "beta", rich_text(&["Plenty of text for the second article body."])),
            source_article("a3", "empty", json!({ "content": [] })),
        ],
    };
    let service = sync_service(pool.clone(), cms);

    let report = service.sync_all("en-US").await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.deleted, 1);

    let ids = store::list_all_article_ids(&pool).await.unwrap();
    assert_eq!(ids, vec!["a1", "a2"]);
}

#[tokio::test]
async fn test_sync_by_id_resolves_through_collection() {
    let pool = test_pool().await;
    let cms = FakeCms {
        articles: vec![source_article(
            "entry-9",
            "by-id",
            rich_text(&["Some body text that is long enough to produce at least one chunk."]),
        )],
    };
    let service = sync_service(pool.clone(), cms);

    let written = service.sync_article_by_id("entry-9", "en-US").await.unwrap();
    assert!(written >= 1);
    assert!(!store::get_article_chunks(&pool, "by-id", "en-US").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recommend_returns_partial_results() {
    let pool = test_pool().await;

    // Source article plus one related and one orthogonal article; with a
    // limit of 3 only the related one qualifies.
    store::upsert_article_chunks(&pool, &[chunk("a1", "source", "en-US", 0, 1, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &[chunk("a2", "related", "en-US", 0, 1, vec![0.9, 0.1, 0.0])])
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &[chunk("a3", "far", "en-US", 0, 1, vec![0.0, 0.0, 1.0])])
        .await
        .unwrap();

    let ctx = ToolContext {
        pool,
        embedder: Arc::new(FakeEmbedder),
        retrieval: Default::default(),
        default_locale: "en-US".to_string(),
    };

    let out = RecommendRelatedArticles
        .execute(&ctx, json!({ "slug": "source", "limit": 3 }))
        .await;

    assert_eq!(out["success"], true);
    let results = out["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["slug"], "related");

    // Partial results are stated plainly, not treated as an error.
    let message = out["message"].as_str().unwrap();
    assert!(message.contains("fewer than the requested 3"), "message: {message}");
    assert!(!message.to_lowercase().contains("sorry"));
}

#[tokio::test]
async fn test_corpus_stats() {
    let pool = test_pool().await;
    store::upsert_article_chunks(&pool, &chunks_for("a1", "alpha", "en-US", 3))
        .await
        .unwrap();
    store::upsert_article_chunks(&pool, &chunks_for("a2", "beta", "de-DE", 2))
        .await
        .unwrap();

    let stats = store::corpus_stats(&pool).await.unwrap();
    assert_eq!(stats.total_chunks, 5);
    assert_eq!(stats.distinct_articles, 2);
    assert_eq!(stats.locales.len(), 2);
    assert!(stats.last_synced_at.is_some());
}
