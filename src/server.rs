//! HTTP surface: webhook ingress plus the agent tool endpoints.
//!
//! Routes:
//! - `POST /webhooks/contentful` — signed CMS delivery, triggers sync
//! - `GET  /webhooks/contentful` — endpoint probe used by webhook setup
//! - `GET  /tools/list`          — tool discovery document
//! - `POST /tools/{name}`        — invoke one tool with a JSON arguments object
//! - `GET  /health`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::error::SyncError;
use crate::sync::SyncService;
use crate::tools::{ToolContext, ToolRegistry};
use crate::webhook::{self, WebhookEvent};

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncService>,
    pub tools: Arc<ToolRegistry>,
    pub tool_ctx: ToolContext,
    /// Shared webhook secret; `None` means signatures are not checked.
    pub webhook_secret: Option<String>,
    pub delete_on_removal: bool,
    pub default_locale: String,
}

/// JSON error response carrying an HTTP status.
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self { status: StatusCode::UNAUTHORIZED, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Read the webhook signing secret from an environment variable. A
/// set-but-empty variable counts as unset: verifying against an empty key
/// would reject every genuine delivery, so verification is disabled (with
/// the startup warning) instead.
pub fn webhook_secret_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/contentful", post(handle_webhook).get(probe))
        .route("/tools/list", get(list_tools))
        .route("/tools/{name}", post(invoke_tool))
        .route("/health", get(probe))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    if state.webhook_secret.is_none() {
        eprintln!("WARNING: no webhook secret configured; deliveries will not be verified");
    }

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("Listening on {}", config.server.bind);
    axum::serve(listener, router).await?;
    Ok(())
}

async fn probe() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(state.tools.describe())
}

async fn invoke_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, AppError> {
    let tool = state
        .tools
        .get(&name)
        .ok_or_else(|| AppError::not_found(format!("unknown tool: {name}")))?;

    let params = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    Ok(Json(tool.execute(&state.tool_ctx, params).await))
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let header_pairs: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    match &state.webhook_secret {
        Some(secret) => {
            let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
            webhook::verify_signature(
                secret,
                "POST",
                "/webhooks/contentful",
                &header_pairs,
                &body,
                now_ms,
            )
            .map_err(|e| AppError::unauthorized(e.to_string()))?;
        }
        None => eprintln!("WARNING: accepting unverified webhook delivery"),
    }

    let topic = webhook::topic_from_headers(&header_pairs)
        .ok_or_else(|| AppError::bad_request("missing topic header"))?;
    let payload: Value =
        serde_json::from_str(&body).map_err(|_| AppError::bad_request("invalid JSON payload"))?;

    match webhook::parse_event(&topic, &payload, &state.default_locale) {
        WebhookEvent::Publish { article_id, locales } => {
            let mut synced_chunks = 0;
            for locale in &locales {
                match state.sync.sync_article_by_id(&article_id, locale).await {
                    Ok(chunks) => synced_chunks += chunks,
                    // The delivery API can lag the management event; report
                    // without failing so the sender does not retry forever.
                    Err(SyncError::SourceNotFound(_)) => {
                        return Ok(Json(json!({
                            "success": false,
                            "message": format!("article {article_id} not yet available in {locale}"),
                        })));
                    }
                    Err(e) => return Err(AppError::internal(e.to_string())),
                }
            }
            Ok(Json(json!({
                "success": true,
                "message": format!("synced {article_id}"),
                "locales": locales,
                "chunks": synced_chunks,
            })))
        }
        WebhookEvent::Removal { article_id } => {
            if state.delete_on_removal {
                let removed = state
                    .sync
                    .delete_article(&article_id)
                    .await
                    .map_err(|e| AppError::internal(e.to_string()))?;
                Ok(Json(json!({
                    "success": true,
                    "message": format!("removed {article_id}"),
                    "chunks_removed": removed,
                })))
            } else {
                Ok(Json(json!({
                    "success": true,
                    "message": "removal acknowledged; deletion on removal is disabled",
                })))
            }
        }
        WebhookEvent::Ignored { reason } => Ok(Json(json!({
            "success": true,
            "message": format!("ignored: {reason}"),
        }))),
    }
}
