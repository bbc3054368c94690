//! Agent-facing tool surface.
//!
//! Three retrieval tools are exposed to LLM agents over a uniform JSON
//! contract. Tools never raise: every outcome, including internal errors,
//! is a `{ "success": bool, "message": string, ... }` document the model
//! can read and recover from. Schemas are plain JSON Schema objects so the
//! registry can be advertised to any function-calling runtime.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::models::ArticleMatch;
use crate::store::{self, SearchOptions};

/// Shared dependencies handed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub pool: SqlitePool,
    pub embedder: Arc<dyn Embedder>,
    pub retrieval: RetrievalConfig,
    pub default_locale: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's arguments object.
    fn parameters_schema(&self) -> Value;
    /// Run the tool. Always returns a result envelope, never an error.
    async fn execute(&self, ctx: &ToolContext, params: Value) -> Value;
}

pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the standard three retrieval tools.
    pub fn standard() -> Self {
        Self {
            tools: vec![
                Arc::new(SearchKnowledgeBase),
                Arc::new(GetArticleContent),
                Arc::new(RecommendRelatedArticles),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Tool descriptors for the discovery endpoint.
    pub fn describe(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.parameters_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }
}

fn failure(message: impl Into<String>) -> Value {
    json!({ "success": false, "message": message.into() })
}

fn str_param(params: &Value, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
        .ok_or_else(|| anyhow!("missing required parameter: {key}"))
}

fn locale_param(params: &Value, ctx: &ToolContext) -> String {
    params
        .get("locale")
        .and_then(|v| v.as_str())
        .unwrap_or(&ctx.default_locale)
        .to_string()
}

fn limit_param(params: &Value, default: i64) -> i64 {
    params
        .get("limit")
        .and_then(|v| v.as_i64())
        .filter(|&l| l >= 1)
        .unwrap_or(default)
}

fn match_to_result(m: &ArticleMatch) -> Value {
    let excerpt = m
        .matching_chunks
        .first()
        .map(|c| c.content.as_str())
        .unwrap_or("");

    // Articles without a short description get an excerpt-derived one so
    // the agent always has something to show.
    let description = m.short_description.clone().unwrap_or_else(|| {
        if excerpt.chars().count() > 200 {
            format!("{}...", excerpt.chars().take(200).collect::<String>())
        } else {
            excerpt.to_string()
        }
    });

    // Ranking already happened; the raw score is internal and stays out of
    // the agent-facing payload.
    json!({
        "title": m.title,
        "slug": m.slug,
        "locale": m.locale,
        "description": description,
        "author": m.author_name,
        "publishedDate": m.published_date,
        "relevantExcerpt": excerpt,
    })
}

/// Semantic search over the whole corpus, grouped by article.
pub struct SearchKnowledgeBase;

#[async_trait]
impl Tool for SearchKnowledgeBase {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the article knowledge base semantically. Returns the most \
         relevant articles with an excerpt from each one's best-matching passage."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Natural-language search query" },
                "limit": { "type": "integer", "description": "Maximum number of articles to return" },
                "locale": { "type": "string", "description": "Locale code, e.g. en-US" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Value {
        let query = match str_param(&params, "query") {
            Ok(q) => q,
            Err(e) => return failure(e.to_string()),
        };
        let locale = locale_param(&params, ctx);
        let limit = limit_param(&params, ctx.retrieval.search_limit);

        let embedding = match ctx.embedder.embed(&query).await {
            Ok(v) => v,
            Err(e) => return failure(format!("could not embed query: {e}")),
        };

        // Over-fetch chunk hits so enough distinct articles survive grouping.
        let opts = SearchOptions {
            limit: limit * ctx.retrieval.overfetch_factor,
            threshold: ctx.retrieval.threshold,
            locale: Some(locale),
            exclude_slugs: Vec::new(),
        };
        let hits = match store::similarity_search(&ctx.pool, &embedding, &opts).await {
            Ok(hits) => hits,
            Err(e) => return failure(format!("search failed: {e}")),
        };

        let matches = store::group_and_rank_by_article(hits, limit.max(0) as usize);
        if matches.is_empty() {
            return failure(format!("No articles matched \"{query}\". Try rephrasing the query."));
        }
        let results: Vec<Value> = matches.iter().map(match_to_result).collect();

        json!({
            "success": true,
            "message": format!("Found {} matching articles", results.len()),
            "results": results,
        })
    }
}

/// Fetch one synced article's full text by slug.
pub struct GetArticleContent;

#[async_trait]
impl Tool for GetArticleContent {
    fn name(&self) -> &str {
        "get_article_content"
    }

    fn description(&self) -> &str {
        "Fetch the full text and metadata of one article by its slug."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string", "description": "Article slug" },
                "locale": { "type": "string", "description": "Locale code, e.g. en-US" }
            },
            "required": ["slug"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Value {
        let slug = match str_param(&params, "slug") {
            Ok(s) => s,
            Err(e) => return failure(e.to_string()),
        };
        let locale = locale_param(&params, ctx);

        let chunks = match store::get_article_chunks(&ctx.pool, &slug, &locale).await {
            Ok(chunks) => chunks,
            Err(e) => return failure(format!("lookup failed: {e}")),
        };

        let first = match chunks.first() {
            Some(first) => first.clone(),
            None => return failure(format!("article not found: {slug} ({locale})")),
        };

        // Chunks overlap at their boundaries; joined text can repeat a few
        // words there, which reads fine for an agent consumer.
        let content = chunks
            .iter()
            .map(|c| c.chunk_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        json!({
            "success": true,
            "message": format!("Retrieved article: {}", first.title),
            "article": {
                "title": first.title,
                "slug": first.slug,
                "locale": first.locale,
                "description": first.short_description,
                "author": first.author_name,
                "publishedDate": first.published_date,
                "totalChunks": first.total_chunks,
                "content": content,
            }
        })
    }
}

/// Recommend articles similar to a given one.
pub struct RecommendRelatedArticles;

#[async_trait]
impl Tool for RecommendRelatedArticles {
    fn name(&self) -> &str {
        "recommend_related_articles"
    }

    fn description(&self) -> &str {
        "Recommend articles related to a given article, ranked by semantic \
         similarity. The source article is never included in the results."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string", "description": "Slug of the source article" },
                "limit": { "type": "integer", "description": "Maximum number of recommendations" },
                "locale": { "type": "string", "description": "Locale code, e.g. en-US" }
            },
            "required": ["slug"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Value {
        let slug = match str_param(&params, "slug") {
            Ok(s) => s,
            Err(e) => return failure(e.to_string()),
        };
        let locale = locale_param(&params, ctx);
        let limit = limit_param(&params, ctx.retrieval.recommend_limit);

        let chunks = match store::get_article_chunks(&ctx.pool, &slug, &locale).await {
            Ok(chunks) => chunks,
            Err(e) => return failure(format!("lookup failed: {e}")),
        };
        // The first chunk opens with the article's lede, making its stored
        // embedding a usable whole-article representative.
        let representative = match chunks.first() {
            Some(first) => first.embedding.clone(),
            None => return failure(format!("article not found or not synced: {slug} ({locale})")),
        };

        let opts = SearchOptions {
            limit: (limit + 1) * ctx.retrieval.overfetch_factor,
            threshold: ctx.retrieval.threshold,
            locale: Some(locale),
            exclude_slugs: vec![slug.clone()],
        };
        let hits = match store::similarity_search(&ctx.pool, &representative, &opts).await {
            Ok(hits) => hits,
            Err(e) => return failure(format!("search failed: {e}")),
        };

        let matches = store::group_and_rank_by_article(hits, limit.max(0) as usize);
        if matches.is_empty() {
            return failure(format!("No related articles found for {slug}."));
        }
        let results: Vec<Value> = matches.iter().map(match_to_result).collect();

        // Fewer results than requested is a normal outcome on a small
        // corpus; the message states it plainly.
        let message = if (results.len() as i64) < limit {
            format!("Found {} related articles (fewer than the requested {limit})", results.len())
        } else {
            format!("Found {} related articles", results.len())
        };

        json!({
            "success": true,
            "message": message,
            "results": results,
        })
    }
}
