use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

use crate::models::{SearchSpec, SellerFilter, Site};
use crate::utils::{AppError, Result};

/// Reads the per-owner settings row the web side maintains. The engine
/// loads it at start and re-reads it every few cycles; writes come from
/// outside the core.
#[derive(Clone)]
pub struct SettingsSource {
    pool: SqlitePool,
}

impl SettingsSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The active spec for an owner, or `NotFound` when no row exists.
    pub async fn load(&self, owner_id: i64) -> Result<SearchSpec> {
        let row = sqlx::query("SELECT * FROM parser_settings WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("parser_settings for owner {owner_id}"),
            })?;

        let keywords: String = row.get("keywords");
        let excluded: String = row.get("excluded_keywords");
        let site_raw: String = row.get("site");
        let seller_raw: String = row.get("seller_type");
        let windows: i64 = row.get("windows");
        let max_items: i64 = row.get("max_items_per_hour");

        let spec = SearchSpec {
            owner_id,
            keywords: SearchSpec::parse_keywords(&keywords),
            excluded_keywords: SearchSpec::parse_keywords(&excluded),
            price_min: row.get("min_price"),
            price_max: row.get("max_price"),
            min_rating: row.get("min_rating"),
            seller_filter: SellerFilter::parse(&seller_raw),
            site: Site::parse(&site_raw).unwrap_or(Site::Avito),
            city: row.get("city"),
            windows: (windows.clamp(1, 5)) as usize,
            exact_only: row.get::<i64, _>("exact_only") != 0,
            check_interval_secs: row.get::<i64, _>("check_interval").max(1) as u64,
            max_items_per_keyword: max_items.clamp(1, 50) as usize,
            settings_reload_cycles: 5,
        };

        debug!(owner_id, keywords = spec.keywords.len(), "settings loaded");
        Ok(spec)
    }

    pub async fn is_active(&self, owner_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT is_active FROM parser_settings WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("is_active") != 0).unwrap_or(false))
    }

    /// Upserts a settings row; used by operator tooling and tests.
    pub async fn save(&self, spec: &SearchSpec) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO parser_settings (
                owner_id, keywords, excluded_keywords, min_price, max_price,
                min_rating, seller_type, check_interval, max_items_per_hour,
                windows, is_active, site, city, exact_only, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, datetime('now'))
            ON CONFLICT(owner_id) DO UPDATE SET
                keywords = excluded.keywords,
                excluded_keywords = excluded.excluded_keywords,
                min_price = excluded.min_price,
                max_price = excluded.max_price,
                min_rating = excluded.min_rating,
                seller_type = excluded.seller_type,
                check_interval = excluded.check_interval,
                max_items_per_hour = excluded.max_items_per_hour,
                windows = excluded.windows,
                site = excluded.site,
                city = excluded.city,
                exact_only = excluded.exact_only,
                updated_at = datetime('now')
            "#,
        )
        .bind(spec.owner_id)
        .bind(spec.keywords.join(", "))
        .bind(spec.excluded_keywords.join(", "))
        .bind(spec.price_min)
        .bind(spec.price_max)
        .bind(spec.min_rating)
        .bind(match spec.seller_filter {
            SellerFilter::Any => "any",
            SellerFilter::Private => "private",
            SellerFilter::Dealer => "dealer",
        })
        .bind(spec.check_interval_secs as i64)
        .bind(spec.max_items_per_keyword as i64)
        .bind(spec.windows as i64)
        .bind(spec.site.as_str())
        .bind(&spec.city)
        .bind(spec.exact_only as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_pool;

    fn spec() -> SearchSpec {
        SearchSpec {
            owner_id: 1,
            keywords: vec!["iphone 13".to_string(), "mazda 6".to_string()],
            excluded_keywords: vec!["копия".to_string()],
            price_min: 10_000,
            price_max: 50_000,
            min_rating: Some(4.0),
            seller_filter: SellerFilter::Private,
            site: Site::Avito,
            city: "Москва".to_string(),
            windows: 2,
            exact_only: true,
            check_interval_secs: 120,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_load_missing_owner() {
        let source = SettingsSource::new(test_pool().await);
        let result = source.load(99).await;
        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let source = SettingsSource::new(test_pool().await);
        source.save(&spec()).await.unwrap();

        let loaded = source.load(1).await.unwrap();
        assert_eq!(loaded.keywords, vec!["iphone 13", "mazda 6"]);
        assert_eq!(loaded.excluded_keywords, vec!["копия"]);
        assert_eq!(loaded.price_min, 10_000);
        assert_eq!(loaded.price_max, 50_000);
        assert_eq!(loaded.min_rating, Some(4.0));
        assert_eq!(loaded.seller_filter, SellerFilter::Private);
        assert_eq!(loaded.site, Site::Avito);
        assert_eq!(loaded.windows, 2);
        assert!(loaded.exact_only);
        assert_eq!(loaded.check_interval_secs, 120);
    }

    #[tokio::test]
    async fn test_overwrite_is_picked_up() {
        let source = SettingsSource::new(test_pool().await);
        source.save(&spec()).await.unwrap();

        let mut updated = spec();
        updated.keywords = vec!["laptop".to_string()];
        updated.site = Site::AutoRu;
        source.save(&updated).await.unwrap();

        let loaded = source.load(1).await.unwrap();
        assert_eq!(loaded.keywords, vec!["laptop"]);
        assert_eq!(loaded.site, Site::AutoRu);
    }

    #[tokio::test]
    async fn test_window_count_clamped() {
        let source = SettingsSource::new(test_pool().await);
        let mut wide = spec();
        wide.windows = 9;
        source.save(&wide).await.unwrap();

        let loaded = source.load(1).await.unwrap();
        assert_eq!(loaded.windows, 5);
    }

    #[tokio::test]
    async fn test_is_active_defaults() {
        let source = SettingsSource::new(test_pool().await);
        assert!(!source.is_active(1).await.unwrap());
        source.save(&spec()).await.unwrap();
        assert!(source.is_active(1).await.unwrap());
    }
}
