//! Corpus status report for the CLI.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;

use crate::store;

pub async fn print_status(pool: &SqlitePool) -> Result<()> {
    let stats = store::corpus_stats(pool).await?;

    println!("Corpus status");
    println!("  articles: {}", stats.distinct_articles);
    println!("  chunks:   {}", stats.total_chunks);

    if !stats.locales.is_empty() {
        println!("  locales:");
        for (locale, chunks) in &stats.locales {
            println!("    {locale}: {chunks} chunks");
        }
    }

    match stats.last_synced_at {
        Some(ts) => match Utc.timestamp_opt(ts, 0).single() {
            Some(when) => println!("  last sync: {}", when.to_rfc3339()),
            None => println!("  last sync: {ts}"),
        },
        None => println!("  last sync: never"),
    }

    Ok(())
}
