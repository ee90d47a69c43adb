use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::browser::BrowserWindow;
use crate::config::BrowserConfig;
use crate::models::{
    clamp_price, ListingRecord, ListingSummary, MetroStation, SearchSpec, Site,
};
use crate::sites::{
    canonical_url, city::city_slug, is_blocked_page, metro, parse_price_text, parse_time_listed,
    relevance, DetailState, SiteAdapter,
};
use crate::utils::{AppError, Result};

/// Result-list node selectors, tried in order until one yields nodes.
const ITEM_SELECTORS: &[&str] = &[
    "div[data-marker='item']",
    "div.iva-item-root",
    "div[itemtype='http://schema.org/Product']",
];

const TITLE_SELECTORS: &[&str] = &[
    "[data-marker='item-title']",
    "h3[itemprop='name']",
    "[itemprop='name']",
    "h3",
];

const PRICE_SELECTORS: &[&str] = &[
    "meta[itemprop='price']",
    "[data-marker='item-price']",
    "span[data-marker='item-price']",
    "[itemprop='price']",
];

const LINK_SELECTORS: &[&str] = &[
    "a[data-marker='item-title']",
    "a[itemprop='url']",
    "a[href*='avito.ru']",
    "a",
];

/// Detail-page core element; the state machine waits on this before parsing.
const CORE_PRICE_SELECTOR: &str = "[data-marker='item-view/item-price']";

const GALLERY_TRIGGER_SELECTORS: &[&str] = &[
    "[data-marker='image-frame/image-wrapper']",
    "img[data-marker='image-preview/image']",
    ".image-frame-preview",
    "[data-marker*='image'] img",
];

const GALLERY_NEXT_SELECTORS: &[&str] = &[
    "[data-marker='extended-gallery-frame/control-right']",
    ".image-gallery-right-nav",
    "[data-marker='extended-gallery/navigation-right']",
];

/// Thumbnail → full-size substitutions for avito.st image hosts.
const IMAGE_SIZE_REWRITES: &[(&str, &str)] = &[
    ("64x48", "1280x960"),
    ("128x96", "1280x960"),
    ("256x192", "1280x960"),
    ("200x200", "1280x960"),
    ("300x300", "1280x960"),
    ("400x300", "1280x960"),
    ("640x480", "1280x960"),
];

const MAX_GALLERY_PHOTOS: usize = 50;

/// Extracts the numeric listing id from an Avito url. Ids are 9–10 digits;
/// the shorter patterns cover legacy category urls.
pub fn extract_listing_id(url: &str) -> Option<String> {
    let without_query = url.split('?').next().unwrap_or(url);
    let patterns = [
        r"avito\.ru/items/(\d+)$",
        r"avito\.ru/.+_(\d{9,10})$",
        r"avito\.ru/.+/(\d{9,10})$",
        r"_(\d+)$",
        r"/(\d+)$",
    ];

    for pattern in patterns {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(without_query) {
                let id = caps.get(1).map(|m| m.as_str().to_string());
                if let Some(id) = id {
                    if !id.is_empty() {
                        return Some(id);
                    }
                }
            }
        }
    }
    None
}

/// Rewrites an avito.st thumbnail url to its highest-resolution variant.
pub fn rewrite_image_url(url: &str) -> String {
    if !url.contains("avito.st") {
        return url.to_string();
    }
    for (small, large) in IMAGE_SIZE_REWRITES {
        if url.contains(small) {
            return url.replacen(small, large, 1);
        }
    }
    url.to_string()
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

/// Parses one search-results page into classified summaries. Pure so the
/// extraction is testable on static HTML.
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
        let title = match first_text(node, TITLE_SELECTORS) {
            Some(t) if t.chars().count() > 3 => t,
            _ => continue,
        };

        let price = select_first(node, PRICE_SELECTORS)
            .map(|el| {
                el.value()
                    .attr("content")
                    .map(parse_price_text)
                    .filter(|p| *p > 0)
                    .unwrap_or_else(|| parse_price_text(&text_of(&el)))
            })
            .unwrap_or(0);
        if price <= 0 {
            continue;
        }

        let link = select_first(node, LINK_SELECTORS)
            .and_then(|el| el.value().attr("href"))
            .map(|href| {
                if href.starts_with("http") {
                    href.to_string()
                } else {
                    format!("https://www.avito.ru{href}")
                }
            });
        let link = match link {
            Some(l) => l,
            None => continue,
        };

        let id = match extract_listing_id(&link) {
            Some(id) => id,
            None => continue,
        };

        let teaser = select_first(node, &["img"])
            .and_then(|el| el.value().attr("src").or(el.value().attr("data-src")))
            .map(rewrite_image_url);

        let time_listed = first_text(node, &["[data-marker='item-date']", ".date-text"])
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

    // Exact matches first, partials second, everything else last
    summaries.sort_by_key(|s| s.relevance);
    summaries
}

/// Fields extracted from one detail page.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DetailData {
    pub title: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub posted_date: Option<String>,
    pub views_count: Option<i64>,
    pub seller_name: Option<String>,
    pub seller_rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub metro_stations: Vec<MetroStation>,
    pub photos: Vec<String>,
}

/// Parses a detail page. Missing fields stay `None`; a captcha page yields
/// an empty struct (the block check runs before this).
pub fn parse_detail_page(html: &str) -> DetailData {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let mut data = DetailData::default();

    data.title = first_text(
        &root,
        &[
            "h1[data-marker='item-view/title-info']",
            "[data-marker='item-view/title-info']",
            "h1[itemprop='name']",
            "h1",
        ],
    );

    data.price = select_first(&root, &["[data-marker='item-view/item-price']"])
        .map(|el| {
            el.value()
                .attr("content")
                .map(parse_price_text)
                .filter(|p| *p > 0)
                .unwrap_or_else(|| parse_price_text(&text_of(&el)))
        })
        .or_else(|| {
            select_first(&root, &["meta[itemprop='price']"])
                .and_then(|el| el.value().attr("content"))
                .map(parse_price_text)
        })
        .filter(|p| *p > 0);

    data.description = first_text(
        &root,
        &[
            "[data-marker='item-view/item-description']",
            "[itemprop='description']",
        ],
    );

    data.posted_date = first_text(
        &root,
        &["[data-marker='item-view/item-date']", ".title-info-metadata-item"],
    )
    .map(|t| t.trim_start_matches("· ").to_string());

    data.views_count = first_text(
        &root,
        &["[data-marker='item-view/total-views']", ".title-info-views"],
    )
    .map(|t| parse_price_text(&t))
    .filter(|v| *v > 0);

    data.seller_name = first_text(
        &root,
        &[
            "[data-marker='seller-info/name']",
            "[data-marker='seller-link/name']",
            ".seller-info-name",
        ],
    );

    data.seller_rating = first_text(
        &root,
        &["[data-marker='seller-info/score']", ".seller-info-rating-score"],
    )
    .and_then(|t| t.trim().replace(',', ".").parse::<f64>().ok());

    data.reviews_count = first_text(
        &root,
        &[
            "[data-marker='seller-info/summary']",
            "[data-marker='rating-caption/rating']",
        ],
    )
    .map(|t| parse_price_text(&t))
    .filter(|v| *v > 0);

    // Last breadcrumb is the leaf category
    if let Ok(selector) = Selector::parse("[data-marker='breadcrumbs'] span[itemprop='name']") {
        data.category = document
            .select(&selector)
            .last()
            .map(|el| text_of(&el))
            .filter(|t| !t.is_empty());
    }

    data.address = first_text(
        &root,
        &[".style-item-address__string", "[itemprop='address']"],
    );
    if let Some(address) = &data.address {
        data.city = address
            .split(',')
            .next()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
    }

    // Georeference rows carry station names; the embedded table supplies
    // line numbers and colors
    if let Ok(selector) =
        Selector::parse(".style-item-address-georeferences-item__content, [data-marker='georeferences-item']")
    {
        for el in document.select(&selector) {
            let name = text_of(&el);
            if name.is_empty() {
                continue;
            }
            let station = metro::station_info(name.trim());
            if !data.metro_stations.iter().any(|s| s.name == station.name) {
                data.metro_stations.push(station);
            }
        }
    }
    if data.metro_stations.is_empty() {
        if let Some(address) = &data.address {
            data.metro_stations = metro::find_stations_in_text(address);
        }
    }

    data.photos = extract_page_photos(&document);
    data
}

/// Photo urls visible on the detail page itself (pre-gallery).
fn extract_page_photos(document: &Html) -> Vec<String> {
    let mut photos = Vec::new();
    if let Ok(selector) = Selector::parse("img[src*='avito.st'], img[data-src*='avito.st']") {
        for el in document.select(&selector) {
            if let Some(src) = el.value().attr("src").or(el.value().attr("data-src")) {
                let full = rewrite_image_url(src);
                if !photos.contains(&full) {
                    photos.push(full);
                }
            }
            if photos.len() >= MAX_GALLERY_PHOTOS {
                break;
            }
        }
    }
    photos
}

/// The image currently shown in the opened gallery overlay.
pub fn extract_gallery_image(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for raw in [
        "[data-marker='extended-gallery/frame-img']",
        "[data-marker='extended-gallery-frame/image']",
        "img[class*='extended-gallery']",
    ] {
        if let Ok(selector) = Selector::parse(raw) {
            if let Some(el) = document.select(&selector).next() {
                if let Some(src) = el.value().attr("src") {
                    if src.contains("avito.st") {
                        return Some(rewrite_image_url(src));
                    }
                }
            }
        }
    }
    None
}

/// Avito extraction over one exclusively owned browser window.
pub struct AvitoAdapter {
    window: Arc<BrowserWindow>,
    element_wait: Duration,
}

impl AvitoAdapter {
    pub fn new(window: Arc<BrowserWindow>, config: &BrowserConfig) -> Self {
        Self {
            window,
            element_wait: Duration::from_secs(config.element_wait_timeout_secs),
        }
    }

    /// Search url with the city slug, price bounds and newest-first sort.
    pub fn build_search_url(query: &str, spec: &SearchSpec, page: u32) -> String {
        let encoded_query: String =
            form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let mut url = format!(
            "https://www.avito.ru/{}?q={}",
            city_slug(&spec.city),
            encoded_query
        );

        if spec.uses_price_filter() {
            if spec.price_min > 0 {
                url.push_str(&format!("&pmin={}", spec.price_min));
            }
            if spec.price_max > 0 {
                url.push_str(&format!("&pmax={}", spec.price_max));
            }
        }

        // s=104 is the site's "newest first" sort
        url.push_str("&s=104");

        if page > 1 {
            url.push_str(&format!("&p={page}"));
        }
        url
    }

    /// Consulted after every navigation.
    async fn check_block(&self) -> Result<()> {
        let title = self.window.title().await.unwrap_or_default();
        let url = self.window.current_url().await.unwrap_or_default();
        if is_blocked_page(&title, &url) {
            return Err(AppError::Blocked(title));
        }
        Ok(())
    }

    /// Opens the gallery and pages it, collecting up to 50 full-size urls.
    /// Stops after two consecutive already-seen frames. Failures are
    /// non-fatal; the caller keeps whatever the page yielded.
    async fn collect_gallery_photos(&self, state: &mut DetailState) -> Vec<String> {
        let mut photos = Vec::new();

        let opened = self
            .window
            .click_first(GALLERY_TRIGGER_SELECTORS)
            .await
            .unwrap_or(false);
        if !opened {
            debug!("gallery did not open, keeping page photos");
            return photos;
        }
        *state = DetailState::GalleryOpened;
        tokio::time::sleep(Duration::from_millis(800)).await;

        let mut consecutive_dupes = 0;
        for _ in 0..MAX_GALLERY_PHOTOS {
            let html = match self.window.content().await {
                Ok(html) => html,
                Err(e) => {
                    warn!("gallery read failed: {e}");
                    break;
                }
            };

            match extract_gallery_image(&html) {
                Some(url) if !photos.contains(&url) => {
                    photos.push(url);
                    consecutive_dupes = 0;
                }
                Some(_) => {
                    consecutive_dupes += 1;
                    if consecutive_dupes >= 2 {
                        break;
                    }
                }
                None => break,
            }

            let advanced = self
                .window
                .click_first(GALLERY_NEXT_SELECTORS)
                .await
                .unwrap_or(false);
            if !advanced {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        *state = DetailState::GalleryPaged;
        photos
    }
}

#[async_trait]
impl SiteAdapter for AvitoAdapter {
    fn site(&self) -> Site {
        Site::Avito
    }

    async fn search(&self, query: &str, spec: &SearchSpec) -> Result<Vec<ListingSummary>> {
        let url = Self::build_search_url(query, spec, 1);
        info!(window = self.window.index(), %url, "avito search");

        self.window.navigate(&url).await?;
        self.check_block().await?;

        self.window
            .wait_for_element("div[data-marker='item']", self.element_wait)
            .await?;

        let html = self.window.content().await?;
        let mut summaries = parse_search_results(&html, query);
        summaries.truncate(spec.max_items_per_keyword);
        Ok(summaries)
    }

    async fn enrich(&self, summary: &ListingSummary, spec: &SearchSpec) -> Result<ListingRecord> {
        let mut state = DetailState::Opened;
        debug!(id = %summary.id, ?state, "detail page");
        self.window.navigate(&summary.url).await?;
        self.check_block().await?;

        state = DetailState::WaitingForCore;
        let core_found = self
            .window
            .wait_for_element(CORE_PRICE_SELECTOR, self.element_wait)
            .await?;
        if !core_found {
            debug!(id = %summary.id, "core price block missing, parsing partial page");
        }
        state = DetailState::CoreParsed;
        debug!(id = %summary.id, ?state, "detail page");

        let html = self.window.content().await?;
        let detail = parse_detail_page(&html);

        let mut record = ListingRecord::new(summary, Site::Avito, spec.owner_id);
        record.url = canonical_url(Site::Avito, &summary.id, &summary.url);
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
        record.seller_rating = detail.seller_rating;
        record.reviews_count = detail.reviews_count;
        record.category = detail.category;
        record.address = detail.address;
        record.city = detail.city.or_else(|| Some(spec.city.clone()));
        record.metro_stations = detail.metro_stations;

        let gallery = self.collect_gallery_photos(&mut state).await;
        let mut photos = if gallery.is_empty() {
            detail.photos
        } else {
            gallery
        };
        if photos.is_empty() {
            photos = summary.teaser_photo.iter().cloned().collect();
        }
        photos.truncate(MAX_GALLERY_PHOTOS);
        record.photo_urls = photos;

        state = DetailState::Closed;
        debug!(id = %summary.id, ?state, "detail page");
        self.check_block().await?;
        state = DetailState::Enriched;
        debug!(id = %record.id, ?state, photos = record.photo_urls.len(), "detail page");

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelevanceClass;

    const SEARCH_FIXTURE: &str = r#"
        <html><body>
        <div data-marker="item" itemtype="http://schema.org/Product">
            <a data-marker="item-title" href="/moskva/telefony/iphone_13_pro_128_7581377646">
                <h3 itemprop="name">iPhone 13 Pro 128</h3>
            </a>
            <meta itemprop="price" content="29500">
            <span data-marker="item-price">29 500 ₽</span>
            <img src="https://10.img.avito.st/image/1/640x480/aaa.jpg">
            <div data-marker="item-date">2 часа назад</div>
        </div>
        <div data-marker="item">
            <a data-marker="item-title" href="/moskva/telefony/iphone_13_pro_256_7581377647">
                <h3 itemprop="name">iPhone 13 Pro 256</h3>
            </a>
            <meta itemprop="price" content="42000">
            <img src="https://10.img.avito.st/image/1/640x480/bbb.jpg">
        </div>
        <div data-marker="item">
            <a data-marker="item-title" href="/moskva/planshety/ipad_7581377648">
                <h3 itemprop="name">iPad</h3>
            </a>
            <meta itemprop="price" content="15000">
        </div>
        </body></html>
    "#;

    #[test]
    fn test_extract_listing_id_patterns() {
        assert_eq!(
            extract_listing_id("https://www.avito.ru/moskva/telefony/iphone_13_7581377646"),
            Some("7581377646".to_string())
        );
        assert_eq!(
            extract_listing_id("https://www.avito.ru/items/7581377646"),
            Some("7581377646".to_string())
        );
        assert_eq!(
            extract_listing_id("https://www.avito.ru/items/7581377646?slocation=1"),
            Some("7581377646".to_string())
        );
        assert_eq!(extract_listing_id("https://www.avito.ru/moskva"), None);
    }

    #[test]
    fn test_parse_search_results_extracts_all_fields() {
        let summaries = parse_search_results(SEARCH_FIXTURE, "iphone 13");
        assert_eq!(summaries.len(), 3);

        let first = &summaries[0];
        assert_eq!(first.id, "7581377646");
        assert_eq!(first.price, 29_500);
        assert_eq!(first.title, "iPhone 13 Pro 128");
        assert!(first.url.starts_with("https://www.avito.ru/"));
        assert_eq!(
            first.teaser_photo.as_deref(),
            Some("https://10.img.avito.st/image/1/1280x960/aaa.jpg")
        );
        assert_eq!(first.time_listed_hours, Some(2.0));
    }

    #[test]
    fn test_search_results_ordered_by_relevance() {
        let summaries = parse_search_results(SEARCH_FIXTURE, "iphone 13");
        let classes: Vec<_> = summaries.iter().map(|s| s.relevance).collect();
        assert_eq!(
            classes,
            vec![
                RelevanceClass::Exact,
                RelevanceClass::Exact,
                RelevanceClass::Other
            ]
        );
        // The iPad sorts last
        assert_eq!(summaries[2].id, "7581377648");
    }

    #[test]
    fn test_image_rewrite() {
        assert_eq!(
            rewrite_image_url("https://10.img.avito.st/image/1/640x480/abc.jpg"),
            "https://10.img.avito.st/image/1/1280x960/abc.jpg"
        );
        assert_eq!(
            rewrite_image_url("https://10.img.avito.st/image/1/128x96/abc.jpg"),
            "https://10.img.avito.st/image/1/1280x960/abc.jpg"
        );
        // Non-avito hosts pass through
        assert_eq!(
            rewrite_image_url("https://example.com/640x480/abc.jpg"),
            "https://example.com/640x480/abc.jpg"
        );
    }

    #[test]
    fn test_build_search_url() {
        let spec = SearchSpec {
            city: "Москва".to_string(),
            price_min: 10_000,
            price_max: 50_000,
            ..Default::default()
        };
        let url = AvitoAdapter::build_search_url("iphone 13", &spec, 1);
        assert!(url.starts_with("https://www.avito.ru/moskva?q=iphone+13"));
        assert!(url.contains("pmin=10000"));
        assert!(url.contains("pmax=50000"));
        assert!(url.contains("s=104"));
        assert!(!url.contains("&p="));
    }

    #[test]
    fn test_build_search_url_pagination_and_no_price() {
        let spec = SearchSpec {
            city: "Сочи".to_string(),
            ..Default::default()
        };
        let url = AvitoAdapter::build_search_url("куртка", &spec, 3);
        assert!(url.starts_with("https://www.avito.ru/sochi?q="));
        assert!(!url.contains("pmin"));
        assert!(url.contains("&p=3"));
    }

    #[test]
    fn test_parse_detail_page() {
        let html = r#"
            <html><body>
            <h1 data-marker="item-view/title-info">iPhone 13 Pro 128</h1>
            <div data-marker="item-view/item-price" content="29500">29 500 ₽</div>
            <div data-marker="item-view/item-description">Отличное состояние, комплект полный.</div>
            <span data-marker="item-view/item-date">· 2 часа назад</span>
            <span data-marker="item-view/total-views">153 просмотра</span>
            <div data-marker="seller-info/name">Александр</div>
            <span data-marker="seller-info/score">4,8</span>
            <span data-marker="seller-info/summary">23 отзыва</span>
            <div data-marker="breadcrumbs">
                <span itemprop="name">Электроника</span>
                <span itemprop="name">Телефоны</span>
            </div>
            <div class="style-item-address__string">Москва, ул. Тверская, 1</div>
            <div class="style-item-address-georeferences-item__content">Таганская</div>
            <img src="https://10.img.avito.st/image/1/640x480/photo1.jpg">
            </body></html>
        "#;

        let detail = parse_detail_page(html);
        assert_eq!(detail.title.as_deref(), Some("iPhone 13 Pro 128"));
        assert_eq!(detail.price, Some(29_500));
        assert_eq!(detail.posted_date.as_deref(), Some("2 часа назад"));
        assert_eq!(detail.views_count, Some(153));
        assert_eq!(detail.seller_name.as_deref(), Some("Александр"));
        assert_eq!(detail.seller_rating, Some(4.8));
        assert_eq!(detail.reviews_count, Some(23));
        assert_eq!(detail.category.as_deref(), Some("Телефоны"));
        assert_eq!(detail.city.as_deref(), Some("Москва"));
        assert_eq!(detail.metro_stations.len(), 1);
        assert_eq!(detail.metro_stations[0].name, "Таганская");
        assert_eq!(detail.metro_stations[0].line_number, "5");
        assert_eq!(detail.photos.len(), 1);
        assert!(detail.photos[0].contains("1280x960"));
    }

    #[test]
    fn test_parse_detail_page_partial() {
        // Core timeout path: whatever was found is kept, the rest is None
        let detail = parse_detail_page("<html><body><h1>Что-то</h1></body></html>");
        assert_eq!(detail.title.as_deref(), Some("Что-то"));
        assert_eq!(detail.price, None);
        assert!(detail.photos.is_empty());
        assert!(detail.metro_stations.is_empty());
    }

    #[test]
    fn test_extract_gallery_image() {
        let html = r#"<img data-marker="extended-gallery/frame-img"
                        src="https://10.img.avito.st/image/1/640x480/g1.jpg">"#;
        assert_eq!(
            extract_gallery_image(html),
            Some("https://10.img.avito.st/image/1/1280x960/g1.jpg".to_string())
        );
        assert_eq!(extract_gallery_image("<html></html>"), None);
    }
}
