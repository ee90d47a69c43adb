use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{debug, info};

use crate::sites::normalize_url;
use crate::utils::Result;

/// The rolling interval during which an already-notified listing stays
/// suppressed.
pub const DEDUP_WINDOW_HOURS: i64 = 24;

/// Durable suppression cache keyed by listing id and normalized url. Backed
/// by SQLite so it survives restarts and coordinates concurrent workers:
/// the database serializes `is_duplicate` / `record_sent` against each
/// other.
#[derive(Clone)]
pub struct DedupCache {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DedupEntry {
    pub listing_id: String,
    pub url: String,
    pub title: String,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DedupCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// True when either key exists with an unexpired timestamp. Expired
    /// rows are purged first.
    pub async fn is_duplicate(&self, listing_id: &str, url: &str) -> Result<bool> {
        self.purge_expired().await?;

        let normalized = normalize_url(url);
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS hits FROM dedup_cache
            WHERE (listing_id = ? OR url = ?) AND expires_at > ?
            "#,
        )
        .bind(listing_id)
        .bind(&normalized)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("hits") > 0)
    }

    /// Upserts the entry with expiry now + 24 h. Called only after a
    /// successful send.
    pub async fn record_sent(&self, listing_id: &str, url: &str, title: &str) -> Result<()> {
        let now = Utc::now();
        let expires = now + Duration::hours(DEDUP_WINDOW_HOURS);
        let normalized = normalize_url(url);

        sqlx::query(
            r#"
            INSERT INTO dedup_cache (listing_id, url, title, sent_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(listing_id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                sent_at = excluded.sent_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(listing_id)
        .bind(&normalized)
        .bind(title)
        .bind(now)
        .bind(expires)
        .execute(&self.pool)
        .await?;

        debug!(listing_id, "dedup entry recorded");
        Ok(())
    }

    /// Lazily drops expired rows; called before every read.
    pub async fn purge_expired(&self) -> Result<()> {
        sqlx::query("DELETE FROM dedup_cache WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Operator-triggered wipe. Cleared listings may notify again on their
    /// next observation.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dedup_cache")
            .execute(&self.pool)
            .await?;
        info!(removed = result.rows_affected(), "dedup cache cleared");
        Ok(result.rows_affected())
    }

    pub async fn len(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM dedup_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    pub async fn entry(&self, listing_id: &str) -> Result<Option<DedupEntry>> {
        let entry = sqlx::query_as::<_, DedupEntry>(
            "SELECT listing_id, url, title, sent_at, expires_at FROM dedup_cache WHERE listing_id = ?",
        )
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }
}
