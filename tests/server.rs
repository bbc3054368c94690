//! Router-level tests for the webhook ingress path: a delivery that fails
//! signature verification must be rejected with 401 before any parsing or
//! sync work happens.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

use lectern::cms::{ContentSource, SourceArticle};
use lectern::config::Config;
use lectern::embedding::Embedder;
use lectern::error::EmbeddingError;
use lectern::migrate;
use lectern::server::{build_router, AppState};
use lectern::store;
use lectern::sync::SyncService;
use lectern::tools::{ToolContext, ToolRegistry};
use lectern::webhook::{build_canonical_request, sign_canonical};

const WEBHOOK_PATH: &str = "/webhooks/contentful";

struct FakeCms {
    articles: Vec<SourceArticle>,
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

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

fn published_article() -> SourceArticle {
    SourceArticle {
        id: "entry-1".to_string(),
        slug: "hello".to_string(),
        title: "Hello".to_string(),
        short_description: None,
        author_name: None,
        published_date: None,
        rich_content: json!({
            "nodeType": "document",
            "content": [{
                "nodeType": "paragraph",
                "content": [{
                    "nodeType": "text",
                    "value": "A body long enough to produce at least one stored chunk."
                }]
            }]
        }),
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

async fn app_state(pool: SqlitePool, secret: Option<&str>) -> AppState {
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder);
    let cms = Arc::new(FakeCms { articles: vec![published_article()] });
    let sync = Arc::new(SyncService::new(
        pool.clone(),
        cms,
        embedder.clone(),
        test_config(),
    ));
    AppState {
        sync,
        tools: Arc::new(ToolRegistry::standard()),
        tool_ctx: ToolContext {
            pool,
            embedder,
            retrieval: Default::default(),
            default_locale: "en-US".to_string(),
        },
        webhook_secret: secret.map(String::from),
        delete_on_removal: false,
        default_locale: "en-US".to_string(),
    }
}

fn publish_payload() -> String {
    json!({
        "sys": { "id": "entry-1", "contentType": { "sys": { "id": "pageBlogPost" } } },
        "fields": { "title": { "en-US": "Hello" } }
    })
    .to_string()
}

/// Headers a well-behaved sender would attach, signed with `secret`.
fn signed_delivery_headers(secret: &str, body: &str) -> Vec<(String, String)> {
    let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut headers = vec![
        ("x-contentful-timestamp".to_string(), now_ms.to_string()),
        (
            "x-contentful-topic".to_string(),
            "ContentManagement.Entry.publish".to_string(),
        ),
        (
            "x-contentful-signed-headers".to_string(),
            "x-contentful-timestamp,x-contentful-topic".to_string(),
        ),
    ];
    let canonical = build_canonical_request("POST", WEBHOOK_PATH, &headers, body).unwrap();
    headers.push((
        "x-contentful-signature".to_string(),
        sign_canonical(secret, &canonical),
    ));
    headers
}

fn delivery_request(headers: &[(String, String)], body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(body)).unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unsigned_delivery_rejected_and_store_untouched() {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    let router = build_router(app_state(pool.clone(), Some("topsecret")).await);

    // Topic header present, signature absent: a delivery the handler could
    // otherwise act on.
    let headers = vec![(
        "x-contentful-topic".to_string(),
        "ContentManagement.Entry.publish".to_string(),
    )];
    let response = router
        .oneshot(delivery_request(&headers, publish_payload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert!(body["error"].is_string());

    // Rejection happens before parsing; nothing was synced.
    assert!(store::list_all_article_ids(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tampered_signature_rejected() {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    let router = build_router(app_state(pool.clone(), Some("topsecret")).await);

    let body = publish_payload();
    // Signed with the wrong secret.
    let headers = signed_delivery_headers("other-secret", &body);
    let response = router.oneshot(delivery_request(&headers, body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(store::list_all_article_ids(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signed_publish_delivery_triggers_sync() {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    let router = build_router(app_state(pool.clone(), Some("topsecret")).await);

    let body = publish_payload();
    let headers = signed_delivery_headers("topsecret", &body);
    let response = router.oneshot(delivery_request(&headers, body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);

    let ids = store::list_all_article_ids(&pool).await.unwrap();
    assert_eq!(ids, vec!["entry-1"]);
}
