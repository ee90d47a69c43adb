use serde::{Deserialize, Serialize};

use crate::models::{ListingRecord, RelevanceClass, SearchSpec};

/// Why a listing was dropped. Rejections are silent skips, never errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RejectReason {
    PriceOutOfRange { price: i64, min: i64, max: i64 },
    RatingTooLow { rating: f64, min: f64 },
    SellerMismatch,
    ExcludedKeyword(String),
    NotExactMatch,
}

/// Applies the user's filters to an enriched record. Pure: the same record
/// and spec always produce the same verdict.
pub fn validate(record: &ListingRecord, spec: &SearchSpec) -> Result<(), RejectReason> {
    if record.price <= 0 {
        return Err(RejectReason::PriceOutOfRange {
            price: record.price,
            min: spec.price_min,
            max: spec.price_max,
        });
    }

    if spec.uses_price_filter() && (record.price < spec.price_min || record.price > spec.price_max)
    {
        return Err(RejectReason::PriceOutOfRange {
            price: record.price,
            min: spec.price_min,
            max: spec.price_max,
        });
    }

    if let (Some(min_rating), Some(rating)) = (spec.min_rating, record.seller_rating) {
        if rating < min_rating {
            return Err(RejectReason::RatingTooLow {
                rating,
                min: min_rating,
            });
        }
    }

    if !spec.seller_filter.accepts(record.seller_type) {
        return Err(RejectReason::SellerMismatch);
    }

    let title_lower = record.title.to_lowercase();
    for excluded in &spec.excluded_keywords {
        let needle = excluded.trim().to_lowercase();
        if !needle.is_empty() && title_lower.contains(&needle) {
            return Err(RejectReason::ExcludedKeyword(excluded.clone()));
        }
    }

    if spec.exact_only && record.relevance == RelevanceClass::Other {
        return Err(RejectReason::NotExactMatch);
    }

    Ok(())
}
