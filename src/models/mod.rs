use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod listing;
pub mod search_spec;
pub mod stats;

// Re-exports for convenience
pub use listing::*;
pub use search_spec::*;
pub use stats::*;

// Common enums used across models

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum Site {
    #[serde(rename = "avito")]
    #[sqlx(rename = "avito")]
    Avito,
    #[serde(rename = "auto.ru")]
    #[sqlx(rename = "auto.ru")]
    AutoRu,
}

impl Site {
    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Avito => "avito",
            Site::AutoRu => "auto.ru",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Site::Avito => "https://www.avito.ru",
            Site::AutoRu => "https://auto.ru",
        }
    }

    pub fn parse(value: &str) -> Option<Site> {
        match value.trim().to_lowercase().as_str() {
            "avito" => Some(Site::Avito),
            "auto.ru" | "auto_ru" | "autoru" => Some(Site::AutoRu),
            _ => None,
        }
    }
}

/// Seller classification as the marketplaces expose it. The Russian labels
/// are the persisted representation so the dashboard shows them verbatim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum SellerType {
    #[serde(rename = "Частное лицо")]
    #[sqlx(rename = "Частное лицо")]
    Private,
    #[serde(rename = "Компания")]
    #[sqlx(rename = "Компания")]
    Company,
}

impl Default for SellerType {
    fn default() -> Self {
        SellerType::Private
    }
}

impl SellerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SellerType::Private => "Частное лицо",
            SellerType::Company => "Компания",
        }
    }
}

/// User-side seller filter from the settings row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum SellerFilter {
    #[sqlx(rename = "any")]
    Any,
    #[sqlx(rename = "private")]
    Private,
    #[sqlx(rename = "dealer")]
    Dealer,
}

impl SellerFilter {
    pub fn parse(value: &str) -> SellerFilter {
        match value.trim().to_lowercase().as_str() {
            "private" | "частник" | "частное лицо" => SellerFilter::Private,
            "dealer" | "company" | "компания" | "магазин" => SellerFilter::Dealer,
            _ => SellerFilter::Any,
        }
    }

    pub fn accepts(&self, seller: Option<SellerType>) -> bool {
        match self {
            SellerFilter::Any => true,
            // An unknown seller type is never rejected outright
            SellerFilter::Private => !matches!(seller, Some(SellerType::Company)),
            SellerFilter::Dealer => !matches!(seller, Some(SellerType::Private)),
        }
    }
}

/// How strongly a result-list entry matches the user's query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum RelevanceClass {
    #[sqlx(rename = "exact")]
    Exact,
    #[sqlx(rename = "partial")]
    Partial,
    #[sqlx(rename = "other")]
    Other,
}

// Helper function to generate row ids in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_serialization() {
        assert_eq!(serde_json::to_string(&Site::Avito).unwrap(), "\"avito\"");
        assert_eq!(serde_json::to_string(&Site::AutoRu).unwrap(), "\"auto.ru\"");
    }

    #[test]
    fn test_site_parse() {
        assert_eq!(Site::parse("avito"), Some(Site::Avito));
        assert_eq!(Site::parse("Auto.ru"), Some(Site::AutoRu));
        assert_eq!(Site::parse("auto_ru"), Some(Site::AutoRu));
        assert_eq!(Site::parse("ebay"), None);
    }

    #[test]
    fn test_seller_type_labels() {
        assert_eq!(SellerType::Private.as_str(), "Частное лицо");
        assert_eq!(SellerType::Company.as_str(), "Компания");
    }

    #[test]
    fn test_seller_filter_accepts() {
        assert!(SellerFilter::Any.accepts(Some(SellerType::Company)));
        assert!(SellerFilter::Any.accepts(None));
        assert!(!SellerFilter::Private.accepts(Some(SellerType::Company)));
        assert!(SellerFilter::Private.accepts(Some(SellerType::Private)));
        // Unknown seller type passes both directional filters
        assert!(SellerFilter::Private.accepts(None));
        assert!(SellerFilter::Dealer.accepts(None));
    }

    #[test]
    fn test_seller_filter_parse_russian() {
        assert_eq!(SellerFilter::parse("Частник"), SellerFilter::Private);
        assert_eq!(SellerFilter::parse("магазин"), SellerFilter::Dealer);
        assert_eq!(SellerFilter::parse(""), SellerFilter::Any);
    }

    #[test]
    fn test_relevance_ordering() {
        // Exact sorts before partial, partial before other
        assert!(RelevanceClass::Exact < RelevanceClass::Partial);
        assert!(RelevanceClass::Partial < RelevanceClass::Other);
    }

    #[test]
    fn test_generate_id() {
        let id1 = generate_id();
        let id2 = generate_id();

        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 32);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
