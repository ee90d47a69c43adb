use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::form_urlencoded;

use crate::browser::BrowserWindow;
use crate::config::BrowserConfig;
use crate::models::{
    clamp_price, ListingRecord, ListingSummary, SearchSpec, SellerType, Site, VehicleSpec,
};
use crate::sites::{
    city::city_slug, is_blocked_page, metro, parse_price_text, parse_time_listed, relevance,
    DetailState, SiteAdapter,
};
use crate::utils::{AppError, Result};

const ITEM_SELECTORS: &[&str] = &[
    "div.ListingItem",
    "div[class*='ListingItem__main']",
    "div[class*='ListingCars__listItem']",
];

/// Detail-page core element.
const CORE_PRICE_SELECTOR: &str = ".OfferPriceCaption__price";

/// Dealer markers in seller names.
const DEALER_NAME_KEYWORDS: &[&str] = &[
    "автосалон",
    "дилер",
    "автоцентр",
    "авторусь",
    "автомир",
    "автомобил",
    "моторс",
    "авто-",
    "trade-in",
    "трейд-ин",
];

const PRIVATE_AVATAR_PATTERNS: &[&str] = &["get-yapic", "get-avatars-mds", "user-avatar"];
const DEALER_AVATAR_PATTERNS: &[&str] = &["get-autoru-dealers", "dealer", "shield"];

/// Extracts the numeric id from the slug tail of an Auto.ru offer url:
/// `/cars/used/sale/mazda/6/1115745178-02cd5655/`.
pub fn extract_listing_id(url: &str) -> Option<String> {
    let without_query = url.split('?').next().unwrap_or(url);
    let patterns = [r"/(\d+)-[0-9a-f]+/?$", r"/sale/.*/(\d+)/?$", r"/(\d{8,})/?$"];
    for pattern in patterns {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(without_query) {
                if let Some(id) = caps.get(1) {
                    return Some(id.as_str().to_string());
                }
            }
        }
    }
    None
}

/// Rewrites a Yandex-hosted thumbnail to the original-quality variant.
pub fn rewrite_image_url(url: &str) -> String {
    if !url.contains("avatars.mds.yandex.net") {
        return url.split('?').next().unwrap_or(url).to_string();
    }

    if let Ok(re) =
        Regex::new(r"(https://avatars\.mds\.yandex\.net/get-autoru-[^/]+/[^/]+/[^/]+)/[^/?]+")
    {
        if let Some(caps) = re.captures(url) {
            return format!("{}/orig", &caps[1]);
        }
    }

    let stripped = url.split('?').next().unwrap_or(url);
    if stripped.contains("/get-autoru-") && !stripped.ends_with("/orig") {
        if let Ok(re) = Regex::new(r"/\d+x\d+[a-z]*$") {
            return re.replace(stripped, "/orig").to_string();
        }
    }
    stripped.to_string()
}

/// Observable seller signals collected from the card; the classification
/// rule is pure so the tie-break stays pinned by tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SellerSignals {
    pub has_shield_badge: bool,
    pub has_rating_pill: bool,
    pub avatar_url: Option<String>,
    pub name: Option<String>,
}

fn is_private_avatar(avatar_url: &str) -> bool {
    let lower = avatar_url.to_lowercase();
    let private = PRIVATE_AVATAR_PATTERNS.iter().any(|p| lower.contains(p));
    let dealer = DEALER_AVATAR_PATTERNS.iter().any(|p| lower.contains(p));
    private && !dealer
}

fn is_dealer_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    DEALER_NAME_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Scores the signals into private vs dealer. Shield badge or rating pill
/// wins outright; when the avatar looks private but the name looks like a
/// dealer, the verdict is private.
pub fn classify_seller(signals: &SellerSignals) -> SellerType {
    if signals.has_shield_badge || signals.has_rating_pill {
        return SellerType::Company;
    }

    let dealer_by_name = signals.name.as_deref().map(is_dealer_name).unwrap_or(false);

    match &signals.avatar_url {
        Some(avatar) if is_private_avatar(avatar) => SellerType::Private,
        Some(avatar)
            if DEALER_AVATAR_PATTERNS
                .iter()
                .any(|p| avatar.to_lowercase().contains(p)) =>
        {
            SellerType::Company
        }
        Some(_) if !dealer_by_name => SellerType::Private,
        Some(_) => SellerType::Company,
        None if dealer_by_name => SellerType::Company,
        None => SellerType::Private,
    }
}

fn select_first<'a>(node: &'a ElementRef, selectors: &[&str]) -> Option<ElementRef<'a>> {
    for raw in selectors {
        if let Ok(selector) = Selector::parse(raw) {
            if let Some(found) = node.select(&selector).next() {
                return Some(found);
            }
        }
    }
    None
}

fn text_of(node: &ElementRef) -> String {
    node.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn first_text(node: &ElementRef, selectors: &[&str]) -> Option<String> {
    select_first(node, selectors)
        .map(|n| text_of(&n))
        .filter(|t| !t.is_empty())
}

/// Parses one listing search page into classified summaries.
pub fn parse_search_results(html: &str, query: &str) -> Vec<ListingSummary> {
    let document = Html::parse_document(html);

    let mut nodes = Vec::new();
    for raw in ITEM_SELECTORS {
        let selector = match Selector::parse(raw) {
            Ok(s) => s,
            Err(_) => continue,
        };
        nodes = document.select(&selector).collect::<Vec<_>>();
        if !nodes.is_empty() {
            break;
        }
    }

    let mut summaries = Vec::new();
    for node in &nodes {
        let link_el = select_first(
            node,
            &["a.ListingItemTitle__link", "a[href*='/sale/']", "a"],
        );
        let (title, link) = match link_el {
            Some(el) => {
                let href = el.value().attr("href").unwrap_or_default();
                (text_of(&el), href.to_string())
            }
            None => continue,
        };
        if title.chars().count() <= 3 || link.is_empty() {
            continue;
        }
        let link = if link.starts_with("http") {
            link
        } else {
            format!("https://auto.ru{link}")
        };

        let id = match extract_listing_id(&link) {
            Some(id) => id,
            None => continue,
        };

        let price = first_text(
            node,
            &[
                ".ListingItemPrice__content",
                "[class*='ListingItemPrice']",
                "[class*='price']",
            ],
        )
        .map(|t| parse_price_text(&t))
        .unwrap_or(0);
        if price <= 0 {
            continue;
        }

        let teaser = select_first(node, &["img"])
            .and_then(|el| el.value().attr("src").or(el.value().attr("data-src")))
            .map(rewrite_image_url);

        let time_listed = first_text(node, &["[class*='ListingItem__date']", ".MetroListPlace__date"])
            .and_then(|t| parse_time_listed(&t));

        summaries.push(ListingSummary {
            id,
            url: link,
            title: title.clone(),
            price: clamp_price(price),
            teaser_photo: teaser,
            time_listed_hours: time_listed,
            relevance: relevance::classify(&title, query),
        });
    }

    summaries.sort_by_key(|s| s.relevance);
    summaries
}

/// Fields from one Auto.ru offer page. Vehicle characteristics come from the
/// summary grid and are always present (possibly partially filled).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DetailData {
    pub title: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub posted_date: Option<String>,
    pub views_count: Option<i64>,
    pub seller_name: Option<String>,
    pub seller_type: SellerType,
    pub city: Option<String>,
    pub address: Option<String>,
    pub metro_names: Vec<String>,
    pub vehicle: VehicleSpec,
    pub photos: Vec<String>,
}

fn grid_value(document: &Html, row_class: &str) -> Option<String> {
    let raw = format!(".CardInfoRow_{row_class} .CardInfoRow__cell:last-child");
    if let Ok(selector) = Selector::parse(&raw) {
        if let Some(el) = document.select(&selector).next() {
            let value = text_of(&el);
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    // Older markup keeps the value in the second span of the row
    let fallback = format!(".CardInfoRow_{row_class} span:last-child");
    if let Ok(selector) = Selector::parse(&fallback) {
        if let Some(el) = document.select(&selector).next() {
            let value = text_of(&el);
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Parses an offer page.
pub fn parse_detail_page(html: &str) -> DetailData {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let mut data = DetailData::default();

    data.title = first_text(
        &root,
        &["h1.CardHead__title", "h1[class*='CardHead']", "h1"],
    );

    data.price = first_text(
        &root,
        &[
            ".OfferPriceCaption__price",
            "[class*='OfferPriceCaption']",
            "[class*='PriceUsedOffer']",
        ],
    )
    .map(|t| parse_price_text(&t))
    .filter(|p| *p > 0);

    data.description = first_text(
        &root,
        &[".CardDescriptionHTML", "[class*='CardDescription__text']"],
    );

    data.posted_date = first_text(
        &root,
        &["[class*='CardHead__infoItem_creationDate']", ".CardHead__creationDate"],
    );

    data.views_count = first_text(
        &root,
        &["[class*='CardHead__infoItem_views']", ".CardHead__views"],
    )
    .map(|t| parse_price_text(&t))
    .filter(|v| *v > 0);

    data.vehicle = VehicleSpec {
        year: grid_value(&document, "year").and_then(|y| parse_price_text(&y).try_into().ok()),
        mileage: grid_value(&document, "kmAge"),
        engine: grid_value(&document, "engine"),
        transmission: grid_value(&document, "transmission"),
        drive: grid_value(&document, "drive"),
        body: grid_value(&document, "bodytype"),
        color: grid_value(&document, "color"),
        owners: grid_value(&document, "ownersCount"),
        pts: grid_value(&document, "pts"),
        steering: grid_value(&document, "wheel"),
    };

    // Seller card
    data.seller_name = first_text(
        &root,
        &[
            ".CardSellerNamePlace2__name",
            "[class*='CardSellerName']",
            "[class*='SellerName']",
        ],
    );

    let shield = select_first(
        &root,
        &[
            ".CardSellerNamePlace2__official-dealer-sign",
            "[class*='dealer-badge']",
            "[class*='official-dealer']",
        ],
    )
    .is_some();
    let rating_pill = select_first(
        &root,
        &["[class*='SellerRating']", "[class*='RatingBadge']"],
    )
    .is_some();
    let avatar = select_first(
        &root,
        &["[class*='SellerAvatar'] img", "[class*='CardSellerNamePlace'] img"],
    )
    .and_then(|el| el.value().attr("src"))
    .map(|s| s.to_string());

    data.seller_type = classify_seller(&SellerSignals {
        has_shield_badge: shield,
        has_rating_pill: rating_pill,
        avatar_url: avatar,
        name: data.seller_name.clone(),
    });

    data.city = first_text(
        &root,
        &[".MetroListPlace__regionName", "[class*='MetroListPlace__region']"],
    );
    data.address = first_text(&root, &["[class*='SellerPlace__address']"]);

    if let Ok(selector) =
        Selector::parse(".MetroListPlace__station, [class*='MetroList__station']")
    {
        for el in document.select(&selector) {
            let name = text_of(&el);
            if !name.is_empty() && !data.metro_names.contains(&name) {
                data.metro_names.push(name);
            }
        }
    }

    // Gallery thumbnails on the page itself
    if let Ok(selector) =
        Selector::parse("img[src*='avatars.mds.yandex.net'], img[data-src*='avatars.mds.yandex.net']")
    {
        for el in document.select(&selector) {
            if let Some(src) = el.value().attr("src").or(el.value().attr("data-src")) {
                let full = rewrite_image_url(src);
                if !data.photos.contains(&full) {
                    data.photos.push(full);
                }
            }
            if data.photos.len() >= 50 {
                break;
            }
        }
    }

    data
}

/// Auto.ru extraction over one exclusively owned browser window.
pub struct AutoRuAdapter {
    window: Arc<BrowserWindow>,
    element_wait: Duration,
}

impl AutoRuAdapter {
    pub fn new(window: Arc<BrowserWindow>, config: &BrowserConfig) -> Self {
        Self {
            window,
            element_wait: Duration::from_secs(config.element_wait_timeout_secs),
        }
    }

    /// Search url with newest-first sort and price bounds.
    pub fn build_search_url(query: &str, spec: &SearchSpec) -> String {
        let encoded_query: String =
            form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let mut url = format!(
            "https://auto.ru/{}/cars/all/?sort=cr_date-desc&query={}",
            city_slug(&spec.city),
            encoded_query
        );
        if spec.uses_price_filter() {
            if spec.price_min > 0 {
                url.push_str(&format!("&price_from={}", spec.price_min));
            }
            if spec.price_max > 0 {
                url.push_str(&format!("&price_to={}", spec.price_max));
            }
        }
        url
    }

    async fn check_block(&self) -> Result<()> {
        let title = self.window.title().await.unwrap_or_default();
        let url = self.window.current_url().await.unwrap_or_default();
        if is_blocked_page(&title, &url) {
            return Err(AppError::Blocked(title));
        }
        Ok(())
    }
}

#[async_trait]
impl SiteAdapter for AutoRuAdapter {
    fn site(&self) -> Site {
        Site::AutoRu
    }

    async fn search(&self, query: &str, spec: &SearchSpec) -> Result<Vec<ListingSummary>> {
        let url = Self::build_search_url(query, spec);
        info!(window = self.window.index(), %url, "auto.ru search");

        self.window.navigate(&url).await?;
        self.check_block().await?;

        self.window
            .wait_for_element("div.ListingItem", self.element_wait)
            .await?;

        let html = self.window.content().await?;
        let mut summaries = parse_search_results(&html, query);
        summaries.truncate(spec.max_items_per_keyword);
        Ok(summaries)
    }

    async fn enrich(&self, summary: &ListingSummary, spec: &SearchSpec) -> Result<ListingRecord> {
        let mut state = DetailState::Opened;
        debug!(id = %summary.id, ?state, "offer page");
        self.window.navigate(&summary.url).await?;
        self.check_block().await?;

        state = DetailState::WaitingForCore;
        let core_found = self
            .window
            .wait_for_element(CORE_PRICE_SELECTOR, self.element_wait)
            .await?;
        if !core_found {
            debug!(id = %summary.id, "price caption missing, parsing partial page");
        }
        state = DetailState::CoreParsed;
        debug!(id = %summary.id, ?state, "offer page");

        let html = self.window.content().await?;
        let detail = parse_detail_page(&html);

        let mut record = ListingRecord::new(summary, Site::AutoRu, spec.owner_id);
        if let Some(title) = detail.title {
            record.title = title;
        }
        if let Some(price) = detail.price {
            record.set_price(price);
            record.set_target_price(price);
        }
        record.description = detail.description;
        record.posted_date = detail.posted_date;
        record.views_count = detail.views_count;
        record.seller_name = detail.seller_name;
        record.seller_type = Some(detail.seller_type);
        record.city = detail.city.or_else(|| Some(spec.city.clone()));
        record.address = detail.address;
        record.metro_stations = detail
            .metro_names
            .iter()
            .map(|n| metro::station_info(n))
            .collect();
        record.category = Some("Автомобили".to_string());
        record.vehicle = Some(detail.vehicle);

        let mut photos = detail.photos;
        if photos.is_empty() {
            photos = summary.teaser_photo.iter().cloned().collect();
        }
        photos.truncate(50);
        record.photo_urls = photos;

        state = DetailState::Enriched;
        debug!(id = %record.id, ?state, photos = record.photo_urls.len(), "offer page");

        Ok(record)
    }
}
