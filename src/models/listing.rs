use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{RelevanceClass, SellerType, Site};

/// Prices above this are treated as parse garbage and stored as 0.
pub const MAX_REASONABLE_PRICE: i64 = 10_000_000;

/// Clamps a parsed price into the reasonable range; anything outside is 0.
pub fn clamp_price(price: i64) -> i64 {
    if (0..=MAX_REASONABLE_PRICE).contains(&price) {
        price
    } else {
        0
    }
}

/// One entry of a search-results page, before the detail page is visited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingSummary {
    pub id: String,
    pub url: String,
    pub title: String,
    pub price: i64,
    pub teaser_photo: Option<String>,
    /// Hours since the listing was posted, estimated from the result list.
    pub time_listed_hours: Option<f64>,
    pub relevance: RelevanceClass,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetroStation {
    pub name: String,
    pub line_color: String,
    pub line_number: String,
    pub circle_color: String,
}

/// Vehicle characteristics from the Auto.ru summary grid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleSpec {
    pub year: Option<i32>,
    pub mileage: Option<String>,
    pub engine: Option<String>,
    pub transmission: Option<String>,
    pub drive: Option<String>,
    pub body: Option<String>,
    pub color: Option<String>,
    pub owners: Option<String>,
    pub pts: Option<String>,
    pub steering: Option<String>,
}

impl VehicleSpec {
    pub fn is_empty(&self) -> bool {
        self.year.is_none()
            && self.mileage.is_none()
            && self.engine.is_none()
            && self.transmission.is_none()
            && self.drive.is_none()
            && self.body.is_none()
            && self.color.is_none()
            && self.owners.is_none()
            && self.pts.is_none()
            && self.steering.is_none()
    }
}

/// A fully enriched listing, ready for validation and dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub price: i64,
    pub target_price: i64,
    pub site: Site,
    pub owner_id: i64,

    pub category: Option<String>,
    pub description: Option<String>,
    pub posted_date: Option<String>,
    pub views_count: Option<i64>,

    pub seller_name: Option<String>,
    pub seller_type: Option<SellerType>,
    pub seller_rating: Option<f64>,
    pub reviews_count: Option<i64>,

    pub city: Option<String>,
    pub address: Option<String>,
    pub metro_stations: Vec<MetroStation>,

    pub photo_urls: Vec<String>,
    pub vehicle: Option<VehicleSpec>,

    pub relevance: RelevanceClass,
    pub freshness_score: Option<f64>,
    pub priority_score: Option<f64>,

    pub found_at: DateTime<Utc>,
}

impl ListingRecord {
    pub fn new(summary: &ListingSummary, site: Site, owner_id: i64) -> Self {
        Self {
            id: summary.id.clone(),
            url: summary.url.clone(),
            title: summary.title.clone(),
            price: clamp_price(summary.price),
            target_price: clamp_price(summary.price),
            site,
            owner_id,
            category: None,
            description: None,
            posted_date: None,
            views_count: None,
            seller_name: None,
            seller_type: None,
            seller_rating: None,
            reviews_count: None,
            city: None,
            address: None,
            metro_stations: Vec::new(),
            photo_urls: summary.teaser_photo.iter().cloned().collect(),
            vehicle: None,
            relevance: summary.relevance,
            freshness_score: None,
            priority_score: None,
            found_at: Utc::now(),
        }
    }

    /// Target market price minus the seller's price. Non-negative means the
    /// listing is a deal.
    pub fn economy(&self) -> i64 {
        self.target_price - self.price
    }

    pub fn economy_percent(&self) -> i64 {
        if self.price > 0 {
            (self.economy() * 100) / self.price
        } else {
            0
        }
    }

    pub fn set_price(&mut self, price: i64) {
        self.price = clamp_price(price);
    }

    pub fn set_target_price(&mut self, target: i64) {
        self.target_price = clamp_price(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary() -> ListingSummary {
        ListingSummary {
            id: "7581377646".to_string(),
            url: "https://www.avito.ru/moskva/telefony/iphone_13_pro_7581377646".to_string(),
            title: "iPhone 13 Pro 128".to_string(),
            price: 29_500,
            teaser_photo: Some("https://10.img.avito.st/image/1/640x480/abc.jpg".to_string()),
            time_listed_hours: Some(2.0),
            relevance: RelevanceClass::Exact,
        }
    }

    #[test]
    fn test_clamp_price_in_range() {
        assert_eq!(clamp_price(0), 0);
        assert_eq!(clamp_price(29_500), 29_500);
        assert_eq!(clamp_price(MAX_REASONABLE_PRICE), MAX_REASONABLE_PRICE);
    }

    #[test]
    fn test_clamp_price_out_of_range() {
        assert_eq!(clamp_price(-1), 0);
        assert_eq!(clamp_price(MAX_REASONABLE_PRICE + 1), 0);
        assert_eq!(clamp_price(999_999_999_999), 0);
    }

    #[test]
    fn test_record_from_summary() {
        let record = ListingRecord::new(&sample_summary(), Site::Avito, 1);
        assert_eq!(record.id, "7581377646");
        assert_eq!(record.price, 29_500);
        assert_eq!(record.photo_urls.len(), 1);
        assert_eq!(record.relevance, RelevanceClass::Exact);
        assert_eq!(record.owner_id, 1);
    }

    #[test]
    fn test_economy_is_exact() {
        let mut record = ListingRecord::new(&sample_summary(), Site::Avito, 1);
        record.set_target_price(20_650);
        assert_eq!(record.economy(), 20_650 - 29_500);

        record.set_target_price(42_000);
        assert_eq!(record.economy(), 42_000 - 29_500);
        assert_eq!(record.economy_percent(), (12_500 * 100) / 29_500);
    }

    #[test]
    fn test_economy_percent_zero_price() {
        let mut record = ListingRecord::new(&sample_summary(), Site::Avito, 1);
        record.price = 0;
        assert_eq!(record.economy_percent(), 0);
    }

    #[test]
    fn test_oversized_price_stored_as_zero() {
        let mut summary = sample_summary();
        summary.price = 25_000_000;
        let record = ListingRecord::new(&summary, Site::Avito, 1);
        assert_eq!(record.price, 0);
    }

    #[test]
    fn test_vehicle_spec_is_empty() {
        assert!(VehicleSpec::default().is_empty());
        let spec = VehicleSpec {
            year: Some(2018),
            ..Default::default()
        };
        assert!(!spec.is_empty());
    }
}
