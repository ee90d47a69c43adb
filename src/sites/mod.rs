use async_trait::async_trait;

use crate::models::{ListingRecord, ListingSummary, SearchSpec, Site};
use crate::utils::Result;

pub mod auto_ru;
pub mod avito;
pub mod city;
pub mod metro;
pub mod relevance;

pub use auto_ru::AutoRuAdapter;
pub use avito::AvitoAdapter;

/// Page titles that mean the marketplace bounced us. Anything else — missing
/// elements included — is not a block.
const BLOCK_TITLE_PHRASES: &[&str] = &[
    "подозрительная активность",
    "доступ ограничен",
    "вы робот",
    "подтвердите что вы не робот",
];

const BLOCK_URL_MARKERS: &[&str] = &["blocked", "captcha", "robot"];

/// Detail-page extraction progresses through these states; adapters trace
/// the transitions and record partial results from `CoreParsed` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailState {
    Opened,
    WaitingForCore,
    CoreParsed,
    GalleryOpened,
    GalleryPaged,
    Closed,
    Enriched,
}

/// Per-site extraction contract. One implementation per marketplace,
/// selected by the search spec. Blocks surface as `AppError::Blocked` from
/// either operation.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn site(&self) -> Site;

    /// Runs one keyword search and returns classified summaries, exact
    /// matches first.
    async fn search(&self, query: &str, spec: &SearchSpec) -> Result<Vec<ListingSummary>>;

    /// Visits the detail page and produces a fully enriched record.
    async fn enrich(&self, summary: &ListingSummary, spec: &SearchSpec) -> Result<ListingRecord>;
}

/// Block check over the navigated page's title and url.
pub fn is_blocked_page(title: &str, url: &str) -> bool {
    let title_lower = title.to_lowercase();
    if BLOCK_TITLE_PHRASES.iter().any(|p| title_lower.contains(p)) {
        return true;
    }

    let path = url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or("");
    BLOCK_URL_MARKERS.iter().any(|m| path.contains(m))
}

/// The minimal URL uniquely identifying a listing. Avito urls collapse to
/// `/items/{id}`; Auto.ru urls are already canonical and pass through.
pub fn canonical_url(site: Site, id: &str, original: &str) -> String {
    match site {
        Site::Avito => format!("https://www.avito.ru/items/{id}"),
        Site::AutoRu => original.split('?').next().unwrap_or(original).to_string(),
    }
}

/// Normalizes an arbitrary listing url for dedup keys. Idempotent.
pub fn normalize_url(url: &str) -> String {
    if url.contains("auto.ru") {
        return url.split('?').next().unwrap_or(url).to_string();
    }

    match avito::extract_listing_id(url) {
        Some(id) => canonical_url(Site::Avito, &id, url),
        None => url.split('?').next().unwrap_or(url).to_string(),
    }
}

/// Pulls the integral ruble amount out of a price string
/// ("29 500 ₽", "от 1 200 000 руб."). Returns 0 when no digits survive.
pub fn parse_price_text(text: &str) -> i64 {
    let digits: String = text
        .chars()
        .take_while(|c| *c != ',' && *c != '.')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Converts Russian relative posted-time phrases into hours.
pub fn parse_time_listed(text: &str) -> Option<f64> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if lower.contains("только что") || lower.contains("минуту") {
        return Some(0.1);
    }
    if lower.contains("сегодня") {
        return Some(3.0);
    }
    if lower.contains("вчера") {
        return Some(24.0);
    }

    let number: f64 = lower
        .split_whitespace()
        .find_map(|w| w.parse::<f64>().ok())
        .unwrap_or(1.0);

    if lower.contains("минут") {
        Some(number / 60.0)
    } else if lower.contains("час") {
        Some(number)
    } else if lower.contains("дн") || lower.contains("день") {
        Some(number * 24.0)
    } else if lower.contains("недел") {
        Some(number * 168.0)
    } else if lower.contains("месяц") {
        Some(number * 720.0)
    } else {
        None
    }
}
