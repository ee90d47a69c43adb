use serde::{Deserialize, Serialize};

use crate::models::{SellerFilter, Site};

/// The inputs to one run of the engine, loaded from the owner's settings row.
/// Immutable within a cycle; the controller swaps the whole value at cycle
/// boundaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSpec {
    pub owner_id: i64,
    pub keywords: Vec<String>,
    pub excluded_keywords: Vec<String>,
    pub price_min: i64,
    pub price_max: i64,
    pub min_rating: Option<f64>,
    pub seller_filter: SellerFilter,
    pub site: Site,
    pub city: String,
    pub windows: usize,
    pub exact_only: bool,
    pub check_interval_secs: u64,
    pub max_items_per_keyword: usize,
    /// The settings row is re-read every this many cycles.
    pub settings_reload_cycles: u64,
}

impl SearchSpec {
    /// Splits a comma-separated keyword string, trimming blanks and dropping
    /// duplicates while keeping first-seen order.
    pub fn parse_keywords(raw: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for part in raw.split(',') {
            let keyword = part.trim().to_lowercase();
            if !keyword.is_empty() && !seen.contains(&keyword) {
                seen.push(keyword);
            }
        }
        seen
    }

    /// Keywords assigned to one window under round-robin distribution.
    pub fn keywords_for_window(&self, window_index: usize) -> Vec<String> {
        self.keywords
            .iter()
            .enumerate()
            .filter(|(i, _)| i % self.windows.max(1) == window_index)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn uses_price_filter(&self) -> bool {
        self.price_max > self.price_min && self.price_max > 0
    }
}

impl Default for SearchSpec {
    fn default() -> Self {
        Self {
            owner_id: 0,
            keywords: Vec::new(),
            excluded_keywords: Vec::new(),
            price_min: 0,
            price_max: 0,
            min_rating: None,
            seller_filter: SellerFilter::Any,
            site: Site::Avito,
            city: "Москва".to_string(),
            windows: 1,
            exact_only: false,
            check_interval_secs: 180,
            max_items_per_keyword: 20,
            settings_reload_cycles: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords_trims_and_dedupes() {
        let keywords = SearchSpec::parse_keywords("iphone 13, , Mazda 6 ,iphone 13");
        assert_eq!(keywords, vec!["iphone 13", "mazda 6"]);
    }

    #[test]
    fn test_parse_keywords_empty() {
        assert!(SearchSpec::parse_keywords("").is_empty());
        assert!(SearchSpec::parse_keywords(" , ,").is_empty());
    }

    #[test]
    fn test_round_robin_distribution() {
        let spec = SearchSpec {
            keywords: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
            windows: 2,
            ..Default::default()
        };
        assert_eq!(spec.keywords_for_window(0), vec!["a", "c", "e"]);
        assert_eq!(spec.keywords_for_window(1), vec!["b", "d"]);
    }

    #[test]
    fn test_single_window_gets_everything() {
        let spec = SearchSpec {
            keywords: vec!["a".into(), "b".into()],
            windows: 1,
            ..Default::default()
        };
        assert_eq!(spec.keywords_for_window(0), vec!["a", "b"]);
    }

    #[test]
    fn test_price_filter_flag() {
        let mut spec = SearchSpec::default();
        assert!(!spec.uses_price_filter());
        spec.price_min = 10_000;
        spec.price_max = 50_000;
        assert!(spec.uses_price_filter());
    }
}
