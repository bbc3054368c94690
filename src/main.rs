//! # Lectern CLI
//!
//! The `lectern` binary drives the content pipeline: database setup, CMS
//! sync, retrieval from the command line, and the HTTP server that hosts
//! the webhook ingress and agent tool endpoints.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lectern init` | Create the SQLite database and run schema migrations |
//! | `lectern sync all` | Sync the full article collection and reconcile deletions |
//! | `lectern sync article <slug>` | Sync one article by slug |
//! | `lectern search "<query>"` | Semantic search over the corpus |
//! | `lectern fetch <slug>` | Print a synced article's full text |
//! | `lectern recommend <slug>` | Recommend related articles |
//! | `lectern status` | Corpus statistics |
//! | `lectern serve` | Start the webhook + tools HTTP server |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use lectern::cms::ContentfulClient;
use lectern::config::{self, Config};
use lectern::embedding::build_embedder;
use lectern::server::{self, AppState};
use lectern::sync::SyncService;
use lectern::tools::{Tool, ToolContext, ToolRegistry};
use lectern::{db, migrate, status};

/// Lectern — keeps a CMS-backed article corpus chunked, embedded, and
/// searchable by AI agents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lectern.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lectern",
    about = "Lectern — CMS article sync, vector search, and agent retrieval tools",
    version,
    long_about = "Lectern syncs articles from a headless CMS into a SQLite vector store \
    (chunked, context-annotated, and embedded), serves semantic retrieval tools to LLM \
    agents over HTTP, and stays fresh through signed CMS webhooks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lectern.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the chunk table with its
    /// indexes. Idempotent — running it multiple times is safe.
    Init,

    /// Sync articles from the CMS into the vector store.
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },

    /// Semantic search over the synced corpus.
    ///
    /// Embeds the query and returns the best-matching articles with an
    /// excerpt from each one's most relevant passage.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of articles to return.
        #[arg(long)]
        limit: Option<i64>,

        /// Locale to search in (defaults to the configured locale).
        #[arg(long)]
        locale: Option<String>,
    },

    /// Print a synced article's metadata and full text.
    Fetch {
        /// Article slug.
        slug: String,

        #[arg(long)]
        locale: Option<String>,
    },

    /// Recommend articles related to a given one.
    Recommend {
        /// Slug of the source article.
        slug: String,

        /// Maximum number of recommendations.
        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        locale: Option<String>,
    },

    /// Show corpus statistics.
    Status,

    /// Start the HTTP server (webhook ingress + agent tool endpoints).
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

/// Sync subcommands.
#[derive(Subcommand)]
enum SyncTarget {
    /// Sync one article by slug.
    Article {
        slug: String,

        #[arg(long)]
        locale: Option<String>,
    },

    /// Sync the whole collection, then remove stored articles the CMS no
    /// longer lists.
    All {
        #[arg(long)]
        locale: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { target } => {
            let service = build_sync_service(&cfg).await?;
            match target {
                SyncTarget::Article { slug, locale } => {
                    let locale = locale.unwrap_or_else(|| cfg.cms.default_locale.clone());
                    let chunks = service.sync_article(&slug, &locale).await?;
                    println!("Synced {slug} ({locale}): {chunks} chunks");
                }
                SyncTarget::All { locale } => {
                    let locale = locale.unwrap_or_else(|| cfg.cms.default_locale.clone());
                    let report = service.sync_all(&locale).await?;
                    if report.failed > 0 {
                        anyhow::bail!("{} articles failed to sync", report.failed);
                    }
                }
            }
        }
        Commands::Search { query, limit, locale } => {
            let ctx = build_tool_context(&cfg).await?;
            let params = tool_params(
                json!({ "query": query }),
                limit,
                locale,
            );
            run_tool(&lectern::tools::SearchKnowledgeBase, &ctx, params).await?;
        }
        Commands::Fetch { slug, locale } => {
            let ctx = build_tool_context(&cfg).await?;
            let params = tool_params(json!({ "slug": slug }), None, locale);
            run_tool(&lectern::tools::GetArticleContent, &ctx, params).await?;
        }
        Commands::Recommend { slug, limit, locale } => {
            let ctx = build_tool_context(&cfg).await?;
            let params = tool_params(json!({ "slug": slug }), limit, locale);
            run_tool(&lectern::tools::RecommendRelatedArticles, &ctx, params).await?;
        }
        Commands::Status => {
            let pool = db::connect(&cfg).await?;
            status::print_status(&pool).await?;
        }
        Commands::Serve => {
            let service = Arc::new(build_sync_service(&cfg).await?);
            let tool_ctx = build_tool_context(&cfg).await?;
            let webhook_secret = server::webhook_secret_from_env(&cfg.webhook.secret_env);

            let state = AppState {
                sync: service,
                tools: Arc::new(ToolRegistry::standard()),
                tool_ctx,
                webhook_secret,
                delete_on_removal: cfg.webhook.delete_on_removal,
                default_locale: cfg.cms.default_locale.clone(),
            };
            server::serve(&cfg, state).await?;
        }
    }

    Ok(())
}

async fn build_sync_service(cfg: &Config) -> anyhow::Result<SyncService> {
    let pool = db::connect(cfg).await?;
    let cms = Arc::new(ContentfulClient::new(&cfg.cms)?);
    let embedder = build_embedder(&cfg.embedding)?;
    Ok(SyncService::new(pool, cms, embedder, cfg.clone()))
}

async fn build_tool_context(cfg: &Config) -> anyhow::Result<ToolContext> {
    let pool = db::connect(cfg).await?;
    let embedder = build_embedder(&cfg.embedding)?;
    Ok(ToolContext {
        pool,
        embedder,
        retrieval: cfg.retrieval.clone(),
        default_locale: cfg.cms.default_locale.clone(),
    })
}

fn tool_params(
    mut base: serde_json::Value,
    limit: Option<i64>,
    locale: Option<String>,
) -> serde_json::Value {
    if let Some(obj) = base.as_object_mut() {
        if let Some(limit) = limit {
            obj.insert("limit".to_string(), json!(limit));
        }
        if let Some(locale) = locale {
            obj.insert("locale".to_string(), json!(locale));
        }
    }
    base
}

/// Run a tool and print its result envelope. Exits non-zero on a failure
/// envelope so the command is usable from scripts.
async fn run_tool(
    tool: &dyn Tool,
    ctx: &ToolContext,
    params: serde_json::Value,
) -> anyhow::Result<()> {
    let result = tool.execute(ctx, params).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.get("success").and_then(|s| s.as_bool()) != Some(true) {
        anyhow::bail!("command did not succeed");
    }
    Ok(())
}
