//! Sync orchestration: CMS article → plain text → chunks → embeddings →
//! stored rows.
//!
//! [`SyncService`] owns the pipeline. Concurrent syncs of the same
//! `(slug, locale)` are serialized through a keyed lock so two webhook
//! deliveries for one article cannot interleave their delete-then-insert
//! windows; different articles sync freely in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::cms::{extract_plain_text, truncate_to_char_budget, ContentSource, SourceArticle};
use crate::compose::{compose_for_embedding, ArticleContext};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::SyncError;
use crate::models::NewChunkRecord;
use crate::segment::split_text;
use crate::store;

/// Upper bound on a single embedding input, in approximate tokens. Chunks
/// are far smaller than this; the guard only matters for pathological
/// header content.
const EMBED_INPUT_TOKEN_BUDGET: usize = 8000;

/// Outcome counters for a full-corpus sync.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Articles whose chunk set was (re)written.
    pub synced: usize,
    /// Articles skipped for having no extractable text.
    pub skipped: usize,
    /// Articles that failed; each has an entry in `errors`.
    pub failed: usize,
    /// Stale articles removed by the reconciliation pass.
    pub deleted: usize,
    /// `(slug or id, message)` for every failure encountered.
    pub errors: Vec<(String, String)>,
}

pub struct SyncService {
    pool: SqlitePool,
    cms: Arc<dyn ContentSource>,
    embedder: Arc<dyn Embedder>,
    config: Config,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncService {
    pub fn new(
        pool: SqlitePool,
        cms: Arc<dyn ContentSource>,
        embedder: Arc<dyn Embedder>,
        config: Config,
    ) -> Self {
        Self {
            pool,
            cms,
            embedder,
            config,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn default_locale(&self) -> &str {
        &self.config.cms.default_locale
    }

    fn lock_for(&self, slug: &str, locale: &str) -> Arc<Mutex<()>> {
        let key = format!("{slug}\u{1f}{locale}");
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key).or_default().clone()
    }

    /// Sync one article by slug. Returns the number of chunks written.
    pub async fn sync_article(&self, slug: &str, locale: &str) -> Result<usize, SyncError> {
        let lock = self.lock_for(slug, locale);
        let _guard = lock.lock().await;

        let article = self
            .cms
            .fetch_by_slug(slug, locale)
            .await?
            .ok_or_else(|| SyncError::SourceNotFound(slug.to_string()))?;

        self.sync_fetched(&article, locale).await
    }

    /// Sync one article by its CMS entry id, as delivered by webhooks.
    /// The GraphQL collection is scanned for the id since the delivery
    /// payload carries no slug.
    pub async fn sync_article_by_id(
        &self,
        article_id: &str,
        locale: &str,
    ) -> Result<usize, SyncError> {
        let articles = self.cms.fetch_collection(locale).await?;
        let article = articles
            .into_iter()
            .find(|a| a.id == article_id)
            .ok_or_else(|| SyncError::SourceNotFound(article_id.to_string()))?;

        let lock = self.lock_for(&article.slug, locale);
        let _guard = lock.lock().await;
        self.sync_fetched(&article, locale).await
    }

    /// Remove an article's stored chunks across all locales. Returns the
    /// number of rows removed.
    pub async fn delete_article(&self, article_id: &str) -> Result<u64, SyncError> {
        Ok(store::delete_article(&self.pool, article_id).await?)
    }

    /// Sync the whole collection for one locale, then reconcile: stored
    /// articles the CMS no longer lists are deleted.
    ///
    /// Per-article failures are recorded and do not stop the pass.
    pub async fn sync_all(&self, locale: &str) -> Result<SyncReport, SyncError> {
        let articles = self.cms.fetch_collection(locale).await?;
        let mut report = SyncReport::default();

        println!("Syncing {} articles ({})", articles.len(), locale);

        for article in &articles {
            let lock = self.lock_for(&article.slug, locale);
            let _guard = lock.lock().await;

            match self.sync_fetched(article, locale).await {
                Ok(_) => report.synced += 1,
                Err(SyncError::EmptyContent(_)) => {
                    println!("  skipped (no content): {}", article.slug);
                    report.skipped += 1;
                }
                Err(e) => {
                    eprintln!("  failed: {}: {}", article.slug, e);
                    report.failed += 1;
                    report.errors.push((article.slug.clone(), e.to_string()));
                }
            }
        }

        self.reconcile(&articles, &mut report).await?;

        println!(
            "Sync complete: {} synced, {} skipped, {} failed, {} deleted",
            report.synced, report.skipped, report.failed, report.deleted
        );

        Ok(report)
    }

    /// Delete stored articles absent from the CMS collection. A failed
    /// delete gets one retry, then is recorded as a failure so a later
    /// pass can pick up the stale rows.
    async fn reconcile(
        &self,
        articles: &[SourceArticle],
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let live_ids: HashSet<&str> = articles.iter().map(|a| a.id.as_str()).collect();
        let stored_ids = store::list_all_article_ids(&self.pool).await?;

        for stale in stored_ids
            .iter()
            .filter(|id| !live_ids.contains(id.as_str()))
        {
            let mut outcome = store::delete_article(&self.pool, stale).await;
            if outcome.is_err() {
                outcome = store::delete_article(&self.pool, stale).await;
            }
            match outcome {
                Ok(rows) => {
                    println!("  removed stale article {} ({} chunks)", stale, rows);
                    report.deleted += 1;
                }
                Err(e) => {
                    eprintln!("  WARNING: could not remove stale article {}: {}", stale, e);
                    report.failed += 1;
                    report.errors.push((stale.clone(), e.to_string()));
                }
            }
        }

        Ok(())
    }

    async fn sync_fetched(
        &self,
        article: &SourceArticle,
        locale: &str,
    ) -> Result<usize, SyncError> {
        let text = extract_plain_text(&article.rich_content);
        if text.trim().is_empty() {
            return Err(SyncError::EmptyContent(article.slug.clone()));
        }

        let chunking = &self.config.chunking;
        let chunks = split_text(&text, chunking.chunk_size, chunking.chunk_overlap);
        if chunks.is_empty() {
            return Err(SyncError::EmptyContent(article.slug.clone()));
        }

        let context = ArticleContext {
            title: article.title.clone(),
            author: article.author_name.clone(),
            description: article.short_description.clone(),
        };
        let inputs: Vec<String> = compose_for_embedding(&context, &chunks)
            .into_iter()
            .map(|input| truncate_to_char_budget(&input, EMBED_INPUT_TOKEN_BUDGET))
            .collect();

        let mut embeddings = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.config.embedding.batch_size.max(1)) {
            embeddings.extend(self.embedder.embed_batch(batch).await?);
        }

        let total = chunks.len() as i64;
        let records: Vec<NewChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (content, embedding))| NewChunkRecord {
                article_id: article.id.clone(),
                slug: article.slug.clone(),
                locale: locale.to_string(),
                title: article.title.clone(),
                short_description: article.short_description.clone(),
                author_name: article.author_name.clone(),
                published_date: article.published_date.clone(),
                chunk_content: content,
                chunk_index: i as i64,
                total_chunks: total,
                embedding,
                tags: Vec::new(),
            })
            .collect();

        let written = store::upsert_article_chunks(&self.pool, &records).await?;
        println!("  synced {} ({} chunks)", article.slug, written);
        Ok(written)
    }
}
