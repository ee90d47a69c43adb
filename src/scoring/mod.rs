use std::path::Path;

use rand::Rng;
use tracing::info;

use crate::models::ListingRecord;

pub mod model;

pub use model::LinearModel;

/// Fallback horizon: a week-old listing scores zero freshness.
const FRESHNESS_HORIZON_HOURS: f64 = 168.0;

pub const FEATURE_COUNT: usize = 9;

/// Keyword flags fed to the model; «скидка» matches its whole word family.
const KW_NEW: &[&str] = &["новый", "новая", "новое", "новые"];
const KW_URGENT: &[&str] = &["срочно", "срочная", "срочный"];
const KW_DISCOUNT: &[&str] = &["скидк", "скидо"];
const KW_ORIGINAL: &[&str] = &["оригинал"];

/// Annotates records with the advisory freshness and priority scores. The
/// regression artifact is loaded once at startup; a missing or invalid
/// artifact switches the scorer to the deterministic fallback.
pub struct FreshnessScorer {
    freshness_model: Option<LinearModel>,
    price_model: Option<LinearModel>,
}

impl FreshnessScorer {
    pub fn new(freshness_path: Option<&Path>, price_path: Option<&Path>) -> Self {
        let freshness_model = freshness_path
            .and_then(LinearModel::load)
            .filter(|m| m.feature_count == FEATURE_COUNT);
        let price_model = price_path
            .and_then(LinearModel::load)
            .filter(|m| m.feature_count == FEATURE_COUNT);

        if freshness_model.is_none() {
            info!("freshness scorer running on the deterministic fallback");
        }

        Self {
            freshness_model,
            price_model,
        }
    }

    pub fn with_models(
        freshness_model: Option<LinearModel>,
        price_model: Option<LinearModel>,
    ) -> Self {
        Self {
            freshness_model,
            price_model,
        }
    }

    /// The fixed feature vector, in artifact order.
    pub fn features(record: &ListingRecord, hours_since_post: f64) -> [f64; FEATURE_COUNT] {
        let title = record.title.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| title.contains(w)) as u8 as f64;

        [
            (hours_since_post / FRESHNESS_HORIZON_HOURS).min(1.0),
            (record.views_count.unwrap_or(0) as f64 / 200.0).min(1.0),
            (record.price as f64 / 1_000_000.0).min(1.0),
            (record.title.chars().count() as f64 / 150.0).min(1.0),
            record.category.is_some() as u8 as f64,
            has_any(KW_NEW),
            has_any(KW_URGENT),
            has_any(KW_DISCOUNT),
            has_any(KW_ORIGINAL),
        ]
    }

    fn hours_since_post(record: &ListingRecord) -> f64 {
        record
            .posted_date
            .as_deref()
            .and_then(crate::sites::parse_time_listed)
            .unwrap_or(24.0)
    }

    /// Freshness in [0,1]; never gates dispatch.
    pub fn freshness(&self, record: &ListingRecord) -> f64 {
        let hours = Self::hours_since_post(record);

        let score = match &self.freshness_model {
            Some(model) => model
                .predict(&Self::features(record, hours))
                .unwrap_or_else(|| Self::fallback_freshness(hours)),
            None => Self::fallback_freshness(hours),
        };
        score.clamp(0.0, 1.0)
    }

    pub fn fallback_freshness(hours_since_post: f64) -> f64 {
        (1.0 - hours_since_post / FRESHNESS_HORIZON_HOURS).clamp(0.0, 1.0)
    }

    /// Optional market-price estimate; `None` keeps the adapter's target.
    pub fn target_price(&self, record: &ListingRecord) -> Option<i64> {
        let model = self.price_model.as_ref()?;
        let hours = Self::hours_since_post(record);
        let predicted = model.predict(&Self::features(record, hours))?;
        let target = (predicted * 1_000_000.0).round() as i64;
        (target > 0).then_some(crate::models::clamp_price(target))
    }

    /// Priority = freshness-heavy linear blend with a small random
    /// tie-break; batches dispatch in descending order.
    pub fn priority(&self, record: &ListingRecord, freshness: f64) -> f64 {
        let relative_economy = if record.price > 0 {
            (record.economy() as f64 / record.price as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let tie_break: f64 = rand::thread_rng().gen_range(0.0..1.0);

        0.6 * freshness + 0.3 * relative_economy + 0.1 * tie_break
    }

    /// Fills both advisory fields in place.
    pub fn annotate(&self, record: &mut ListingRecord) {
        if let Some(target) = self.target_price(record) {
            record.set_target_price(target);
        }
        let freshness = self.freshness(record);
        record.freshness_score = Some(freshness);
        record.priority_score = Some(self.priority(record, freshness));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingSummary, RelevanceClass, Site};

    fn record_with_title(title: &str) -> ListingRecord {
        let summary = ListingSummary {
            id: "1".to_string(),
            url: "https://www.avito.ru/items/1".to_string(),
            title: title.to_string(),
            price: 30_000,
            teaser_photo: None,
            time_listed_hours: Some(2.0),
            relevance: RelevanceClass::Exact,
        };
        let mut record = ListingRecord::new(&summary, Site::Avito, 1);
        record.posted_date = Some("2 часа назад".to_string());
        record.views_count = Some(100);
        record.category = Some("Телефоны".to_string());
        record
    }

    #[test]
    fn test_feature_vector_shape() {
        let record = record_with_title("Новый iPhone срочно, оригинал, скидка");
        let features = FreshnessScorer::features(&record, 2.0);
        assert_eq!(features.len(), FEATURE_COUNT);
        // The four keyword flags are all set
        assert_eq!(&features[5..9], &[1.0, 1.0, 1.0, 1.0]);
        // All features normalized into [0,1]
        assert!(features.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn test_keyword_flags_unset() {
        let record = record_with_title("iPhone 13 Pro");
        let features = FreshnessScorer::features(&record, 2.0);
        assert_eq!(&features[5..9], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fallback_freshness() {
        assert!((FreshnessScorer::fallback_freshness(0.0) - 1.0).abs() < 1e-9);
        assert!((FreshnessScorer::fallback_freshness(84.0) - 0.5).abs() < 1e-9);
        assert_eq!(FreshnessScorer::fallback_freshness(168.0), 0.0);
        assert_eq!(FreshnessScorer::fallback_freshness(500.0), 0.0);
    }

    #[test]
    fn test_scorer_without_artifact_uses_fallback() {
        let scorer = FreshnessScorer::with_models(None, None);
        let record = record_with_title("iPhone 13");
        // posted 2 hours ago → 1 - 2/168
        let expected = 1.0 - 2.0 / 168.0;
        assert!((scorer.freshness(&record) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_scorer_with_model() {
        let model = LinearModel {
            version: 1,
            feature_count: FEATURE_COUNT,
            weights: vec![0.0; FEATURE_COUNT],
            intercept: 0.75,
            mean: vec![0.0; FEATURE_COUNT],
            std: vec![1.0; FEATURE_COUNT],
        };
        let scorer = FreshnessScorer::with_models(Some(model), None);
        let record = record_with_title("iPhone 13");
        assert!((scorer.freshness(&record) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_freshness_is_clamped() {
        let model = LinearModel {
            version: 1,
            feature_count: FEATURE_COUNT,
            weights: vec![0.0; FEATURE_COUNT],
            intercept: 17.0,
            mean: vec![0.0; FEATURE_COUNT],
            std: vec![1.0; FEATURE_COUNT],
        };
        let scorer = FreshnessScorer::with_models(Some(model), None);
        assert_eq!(scorer.freshness(&record_with_title("x y z")), 1.0);
    }

    #[test]
    fn test_annotate_sets_advisory_fields() {
        let scorer = FreshnessScorer::with_models(None, None);
        let mut record = record_with_title("iPhone 13");
        scorer.annotate(&mut record);
        assert!(record.freshness_score.is_some());
        assert!(record.priority_score.is_some());
        let priority = record.priority_score.unwrap();
        assert!((0.0..=1.0).contains(&priority));
    }

    #[test]
    fn test_priority_rewards_economy() {
        let scorer = FreshnessScorer::with_models(None, None);
        let mut cheap = record_with_title("iPhone 13");
        cheap.set_target_price(45_000); // economy 15k on a 30k price

        let mut fair = record_with_title("iPhone 13");
        fair.set_target_price(30_000); // no economy

        // The economy term is worth up to 0.3 while the tie-break is 0.1,
        // so the deal must outrank the fair price regardless of randomness
        let p_cheap = scorer.priority(&cheap, 0.5);
        let p_fair = scorer.priority(&fair, 0.5);
        assert!(p_cheap > p_fair);
    }
}
