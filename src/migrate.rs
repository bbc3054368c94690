use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the chunk table and its indexes. Idempotent.
///
/// SQLite has no approximate-nearest-neighbor index; similarity search is a
/// brute-force scan with the cosine computed in Rust, so only the key
/// lookups get indexes here.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS article_chunks (
            id TEXT PRIMARY KEY,
            article_id TEXT NOT NULL,
            slug TEXT NOT NULL,
            locale TEXT NOT NULL DEFAULT 'en-US',
            title TEXT NOT NULL,
            short_description TEXT,
            author_name TEXT,
            published_date TEXT,
            chunk_content TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            last_synced_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(article_id, locale, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_article_chunks_slug ON article_chunks(slug)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_article_chunks_article_id ON article_chunks(article_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_article_chunks_locale ON article_chunks(locale)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_article_chunks_article_chunk ON article_chunks(article_id, chunk_index)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
