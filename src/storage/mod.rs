use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::utils::Result;

pub mod dedup;
pub mod results;
pub mod settings;

pub use dedup::DedupCache;
pub use results::ResultStore;
pub use settings::SettingsSource;

/// Creates the pool and applies the idempotent schema.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    // An in-memory database exists per connection; keep a single one so
    // every component sees the same schema.
    let max_connections = if config.url.contains(":memory:") {
        1
    } else {
        config.max_connections
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout))
        .connect(&config.url)
        .await?;

    migrate(&pool).await?;
    info!(url = %config.url, "database ready");
    Ok(pool)
}

/// Schema creation; every statement is safe to re-run.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parser_settings (
            owner_id INTEGER PRIMARY KEY,
            keywords TEXT NOT NULL DEFAULT '',
            excluded_keywords TEXT NOT NULL DEFAULT '',
            min_price INTEGER NOT NULL DEFAULT 0,
            max_price INTEGER NOT NULL DEFAULT 0,
            min_rating REAL,
            seller_type TEXT NOT NULL DEFAULT 'any',
            check_interval INTEGER NOT NULL DEFAULT 180,
            max_items_per_hour INTEGER NOT NULL DEFAULT 100,
            windows INTEGER NOT NULL DEFAULT 1,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_default INTEGER NOT NULL DEFAULT 0,
            site TEXT NOT NULL DEFAULT 'avito',
            city TEXT NOT NULL DEFAULT 'Москва',
            exact_only INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS found_items (
            id TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            listing_id TEXT NOT NULL,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            price INTEGER NOT NULL,
            target_price INTEGER NOT NULL,
            economy INTEGER NOT NULL,
            economy_percent INTEGER NOT NULL,
            site TEXT NOT NULL,
            category TEXT,
            description TEXT,
            posted_date TEXT,
            views_count INTEGER,
            seller_name TEXT,
            seller_type TEXT,
            seller_rating REAL,
            reviews_count INTEGER,
            city TEXT,
            address TEXT,
            metro_json TEXT NOT NULL DEFAULT '[]',
            photos_json TEXT NOT NULL DEFAULT '[]',
            vehicle_json TEXT,
            relevance TEXT NOT NULL,
            freshness_score REAL,
            priority_score REAL,
            found_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_found_items_owner_url ON found_items(owner_id, url)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dedup_cache (
            listing_id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dedup_url ON dedup_cache(url)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    migrate(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_memory_database() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            acquire_timeout: 5,
        };
        let pool = connect(&config).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dedup_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
