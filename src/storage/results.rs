use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

use crate::models::{generate_id, ListingRecord};
use crate::utils::Result;

/// Durable per-owner listing rows for the dashboard. Append-mostly: a
/// repeat observation of the same canonical url within 24 h only refreshes
/// the advisory fields.
#[derive(Clone)]
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists one record under its owner. Returns `false` when the owner
    /// already has a row with this canonical url inside the 24 h window (the
    /// row's advisory fields are refreshed and no notification follows).
    /// The check and the write share one transaction, so concurrent
    /// dispatchers agree on a single inserter.
    pub async fn save(&self, record: &ListingRecord) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let threshold = Utc::now() - Duration::hours(24);

        let existing = sqlx::query(
            "SELECT id FROM found_items WHERE owner_id = ? AND url = ? AND found_at >= ? LIMIT 1",
        )
        .bind(record.owner_id)
        .bind(&record.url)
        .bind(threshold)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            let row_id: String = row.get("id");
            sqlx::query(
                "UPDATE found_items SET freshness_score = ?, priority_score = ? WHERE id = ?",
            )
            .bind(record.freshness_score)
            .bind(record.priority_score)
            .bind(&row_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            debug!(url = %record.url, "existing row refreshed, not re-persisted");
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO found_items (
                id, owner_id, listing_id, url, title, price, target_price,
                economy, economy_percent, site, category, description,
                posted_date, views_count, seller_name, seller_type,
                seller_rating, reviews_count, city, address, metro_json,
                photos_json, vehicle_json, relevance, freshness_score,
                priority_score, found_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(generate_id())
        .bind(record.owner_id)
        .bind(&record.id)
        .bind(&record.url)
        .bind(&record.title)
        .bind(record.price)
        .bind(record.target_price)
        .bind(record.economy())
        .bind(record.economy_percent())
        .bind(record.site)
        .bind(&record.category)
        .bind(&record.description)
        .bind(&record.posted_date)
        .bind(record.views_count)
        .bind(&record.seller_name)
        .bind(record.seller_type)
        .bind(record.seller_rating)
        .bind(record.reviews_count)
        .bind(&record.city)
        .bind(&record.address)
        .bind(serde_json::to_string(&record.metro_stations)?)
        .bind(serde_json::to_string(&record.photo_urls)?)
        .bind(
            record
                .vehicle
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(record.relevance)
        .bind(record.freshness_score)
        .bind(record.priority_score)
        .bind(record.found_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn count_for_owner(&self, owner_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM found_items WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    #[cfg(test)]
    pub async fn advisory_scores(&self, owner_id: i64, url: &str) -> Result<(Option<f64>, Option<f64>)> {
        let row = sqlx::query(
            "SELECT freshness_score, priority_score FROM found_items WHERE owner_id = ? AND url = ?",
        )
        .bind(owner_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok((row.get("freshness_score"), row.get("priority_score")))
    }
}
