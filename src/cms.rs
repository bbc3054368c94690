//! CMS content source.
//!
//! The sync pipeline reads articles from a headless CMS through the
//! [`ContentSource`] trait: fetch one article by slug, or list the
//! collection for a locale. The production implementation,
//! [`ContentfulClient`], speaks the Contentful GraphQL Content API over
//! reqwest; tests substitute an in-memory source.
//!
//! Article bodies arrive as rich-text JSON documents; [`extract_plain_text`]
//! flattens them by walking the node tree and concatenating text leaves.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::CmsConfig;

/// An article as fetched from the CMS, before chunking.
#[derive(Debug, Clone)]
pub struct SourceArticle {
    /// Stable CMS entry id, shared across locales and versions.
    pub id: String,
    pub slug: String,
    pub title: String,
    pub short_description: Option<String>,
    pub author_name: Option<String>,
    /// RFC3339 publish timestamp, if published.
    pub published_date: Option<String>,
    /// Structured rich-text document; may be `Value::Null` for stubs.
    pub rich_content: Value,
}

/// Read-only view of the CMS used by the sync orchestrator.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch one article by slug and locale. `Ok(None)` when the slug does
    /// not exist for that locale.
    async fn fetch_by_slug(&self, slug: &str, locale: &str) -> Result<Option<SourceArticle>>;

    /// Fetch the article collection for a locale, up to the configured
    /// collection limit.
    async fn fetch_collection(&self, locale: &str) -> Result<Vec<SourceArticle>>;
}

/// Contentful GraphQL Content API client.
pub struct ContentfulClient {
    graphql_url: String,
    access_token: String,
    collection_limit: i64,
    client: reqwest::Client,
}

const ARTICLE_FIELDS: &str = r#"
    sys { id }
    slug
    title
    shortDescription
    publishedDate
    author { name }
    content { json }
"#;

impl ContentfulClient {
    pub fn new(config: &CmsConfig) -> Result<Self> {
        let access_token = std::env::var(&config.access_token_env)
            .with_context(|| format!("{} not set", config.access_token_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            graphql_url: config.graphql_url.clone(),
            access_token,
            collection_limit: config.collection_limit,
            client,
        })
    }

    async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let body = serde_json::json!({ "query": query, "variables": variables });

        let response = self
            .client
            .post(&self.graphql_url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("CMS request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("CMS API error {}: {}", status, text);
        }

        let json: Value = response.json().await.context("invalid CMS response")?;

        if let Some(errors) = json.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                bail!("CMS GraphQL errors: {}", serde_json::to_string(errors)?);
            }
        }

        Ok(json)
    }
}

#[async_trait]
impl ContentSource for ContentfulClient {
    async fn fetch_by_slug(&self, slug: &str, locale: &str) -> Result<Option<SourceArticle>> {
        let query = format!(
            r#"query ArticleBySlug($slug: String!, $locale: String!) {{
                pageBlogPostCollection(limit: 1, locale: $locale, where: {{ slug: $slug }}) {{
                    items {{ {ARTICLE_FIELDS} }}
                }}
            }}"#
        );

        let json = self
            .query(&query, serde_json::json!({ "slug": slug, "locale": locale }))
            .await?;

        let items = collection_items(&json)?;
        Ok(items.first().map(parse_article).transpose()?)
    }

    async fn fetch_collection(&self, locale: &str) -> Result<Vec<SourceArticle>> {
        let query = format!(
            r#"query ArticleCollection($locale: String!, $limit: Int!) {{
                pageBlogPostCollection(limit: $limit, locale: $locale) {{
                    items {{ {ARTICLE_FIELDS} }}
                }}
            }}"#
        );

        let json = self
            .query(
                &query,
                serde_json::json!({ "locale": locale, "limit": self.collection_limit }),
            )
            .await?;

        let items = collection_items(&json)?;
        items.iter().map(parse_article).collect()
    }
}

fn collection_items(json: &Value) -> Result<Vec<Value>> {
    let items = json
        .pointer("/data/pageBlogPostCollection/items")
        .and_then(|i| i.as_array())
        .cloned()
        .unwrap_or_default();
    // Contentful returns null entries for items the token cannot resolve.
    Ok(items.into_iter().filter(|i| !i.is_null()).collect())
}

fn parse_article(item: &Value) -> Result<SourceArticle> {
    let id = item
        .pointer("/sys/id")
        .and_then(|v| v.as_str())
        .context("CMS item missing sys.id")?
        .to_string();
    let slug = item
        .get("slug")
        .and_then(|v| v.as_str())
        .context("CMS item missing slug")?
        .to_string();

    Ok(SourceArticle {
        id,
        slug,
        title: item
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        short_description: item
            .get("shortDescription")
            .and_then(|v| v.as_str())
            .map(String::from),
        author_name: item
            .pointer("/author/name")
            .and_then(|v| v.as_str())
            .map(String::from),
        published_date: item
            .get("publishedDate")
            .and_then(|v| v.as_str())
            .map(String::from),
        rich_content: item.pointer("/content/json").cloned().unwrap_or(Value::Null),
    })
}

/// Flatten a rich-text JSON document into plain text.
///
/// Text leaves contribute their `value`; a node's children are joined with
/// spaces, top-level blocks with newlines, and the result has all runs of
/// whitespace collapsed to single spaces. Arbitrary nesting and missing or
/// null `content` arrays are tolerated.
pub fn extract_plain_text(document: &Value) -> String {
    let blocks = match document.get("content").and_then(|c| c.as_array()) {
        Some(blocks) => blocks,
        None => return String::new(),
    };

    let joined = blocks
        .iter()
        .map(extract_from_node)
        .collect::<Vec<_>>()
        .join("\n");

    collapse_whitespace(&joined)
}

fn extract_from_node(node: &Value) -> String {
    if node.get("nodeType").and_then(|t| t.as_str()) == Some("text") {
        return node
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
    }

    match node.get("content").and_then(|c| c.as_array()) {
        Some(children) => children
            .iter()
            .map(extract_from_node)
            .collect::<Vec<_>>()
            .join(" "),
        None => String::new(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate text to an approximate token budget (~4 chars per token),
/// cutting at a word boundary with an ellipsis. Guards the embedding
/// provider's input limit for pathological inputs.
pub fn truncate_to_char_budget(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * 4;

    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(pos) if pos > 0 => format!("{}...", &truncated[..pos]),
        _ => format!("{}...", truncated),
    }
}
