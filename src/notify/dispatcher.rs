use std::time::Duration;

use tracing::{info, warn};

use crate::models::ListingRecord;
use crate::notify::message;
use crate::notify::telegram::{PhotoBuffer, TelegramApi};
use crate::storage::{DedupCache, ResultStore};
use crate::utils::Result;

const MAX_ALBUM_PHOTOS: usize = 5;

/// Persists one durable row and sends one chat message per surviving
/// listing: a media album when photos exist, a two-button text message
/// otherwise. The dedup cache is written only after a successful send.
pub struct NotificationDispatcher {
    api: TelegramApi,
    results: ResultStore,
    dedup: DedupCache,
    http: reqwest::Client,
    media_fetch_timeout: Duration,
    album_delay: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        api: TelegramApi,
        results: ResultStore,
        dedup: DedupCache,
        media_fetch_timeout: Duration,
    ) -> Self {
        Self {
            api,
            results,
            dedup,
            http: reqwest::Client::new(),
            media_fetch_timeout,
            // Pause before album sends to avoid burstiness against the API
            album_delay: Duration::from_secs(2),
        }
    }

    /// Shortens the pre-album pause; used by the test suite.
    pub fn with_album_delay(mut self, delay: Duration) -> Self {
        self.album_delay = delay;
        self
    }

    /// Returns `true` only when a message actually went out. A row that
    /// already exists within 24 h, or a failed send, both yield `false`; the
    /// failed send leaves no cache entry so the listing may be re-sent on
    /// its next observation.
    pub async fn process_and_notify(
        &self,
        record: &ListingRecord,
        economy: i64,
        economy_percent: i64,
        owner_id: i64,
    ) -> Result<bool> {
        let mut record = record.clone();
        record.owner_id = owner_id;

        if !self.results.save(&record).await? {
            return Ok(false);
        }

        let body = message::compose(&record, economy, economy_percent);
        let photos = self.fetch_photos(&record.photo_urls).await;

        let sent = if photos.is_empty() {
            let keyboard = TelegramApi::notification_keyboard(&record.url, &record.id);
            match self
                .api
                .send_message(self.api.chat_id(), &body, Some(keyboard))
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!(id = %record.id, "text notification failed: {e}");
                    false
                }
            }
        } else {
            tokio::time::sleep(self.album_delay).await;
            match self
                .api
                .send_media_group(self.api.chat_id(), &photos, &body)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    // No fallback to text: the listing stays un-notified
                    // until its next observation inside the 24 h window
                    warn!(id = %record.id, "album send failed: {e}");
                    false
                }
            }
        };

        if !sent {
            return Ok(false);
        }

        self.dedup
            .record_sent(&record.id, &record.url, &record.title)
            .await?;
        info!(id = %record.id, title = %record.title, "notification sent");
        Ok(true)
    }

    /// Best-effort concurrent download of up to five photos; a photo that
    /// fails is silently dropped from the album.
    async fn fetch_photos(&self, urls: &[String]) -> Vec<PhotoBuffer> {
        let fetches = urls
            .iter()
            .take(MAX_ALBUM_PHOTOS)
            .map(|url| self.fetch_one(url));
        let results = futures::future::join_all(fetches).await;

        let mut photos = Vec::new();
        for (i, (url, result)) in urls.iter().zip(results).enumerate() {
            match result {
                Ok(bytes) if !bytes.is_empty() => photos.push(PhotoBuffer {
                    file_name: format!("photo{i}.jpg"),
                    bytes,
                }),
                Ok(_) => warn!(%url, "empty photo body dropped"),
                Err(e) => warn!(%url, "photo fetch failed, dropped: {e}"),
            }
        }
        photos
    }

    async fn fetch_one(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .timeout(self.media_fetch_timeout)
            .send()
            .await?
            .error_for_status()
            .map_err(crate::utils::AppError::Http)?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramConfig;
    use crate::models::{ListingSummary, RelevanceClass, Site};
    use crate::storage::test_pool;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn telegram_config(api_base: &str) -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:token".to_string(),
            chat_id: 42,
            admin_chat_id: None,
            api_base: api_base.to_string(),
            text_timeout_secs: 5,
            album_timeout_secs: 5,
            media_fetch_timeout_secs: 2,
        }
    }

    fn record(photos: Vec<String>) -> ListingRecord {
        let summary = ListingSummary {
            id: "7581377646".to_string(),
            url: "https://www.avito.ru/items/7581377646".to_string(),
            title: "iPhone 13 Pro 128".to_string(),
            price: 29_500,
            teaser_photo: None,
            time_listed_hours: Some(2.0),
            relevance: RelevanceClass::Exact,
        };
        let mut record = ListingRecord::new(&summary, Site::Avito, 1);
        record.set_target_price(42_000);
        record.photo_urls = photos;
        record
    }

    async fn dispatcher(server: &MockServer) -> (NotificationDispatcher, DedupCache, ResultStore)
    {
        let pool = test_pool().await;
        let dedup = DedupCache::new(pool.clone());
        let results = ResultStore::new(pool);
        let api = TelegramApi::new(&telegram_config(&server.uri()), 42);
        let dispatcher = NotificationDispatcher::new(
            api,
            results.clone(),
            dedup.clone(),
            Duration::from_secs(2),
        )
        .with_album_delay(Duration::from_millis(0));
        (dispatcher, dedup, results)
    }

    #[tokio::test]
    async fn test_text_path_sends_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:token/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, dedup, results) = dispatcher(&server).await;
        let record = record(vec![]);

        let sent = dispatcher
            .process_and_notify(&record, 12_500, 42, 1)
            .await
            .unwrap();
        assert!(sent);
        assert!(dedup
            .is_duplicate("7581377646", &record.url)
            .await
            .unwrap());
        assert_eq!(results.count_for_owner(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_album_path_with_mocked_photo_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xd8, 0xff]))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:token/sendMediaGroup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, dedup, _) = dispatcher(&server).await;
        let record = record(vec![format!("{}/photo.jpg", server.uri())]);

        let sent = dispatcher
            .process_and_notify(&record, 0, 0, 1)
            .await
            .unwrap();
        assert!(sent);
        assert!(dedup
            .is_duplicate("7581377646", &record.url)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failed_photo_fetch_falls_back_to_text() {
        // All photos fail to download → the album is empty → text path
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:token/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, _, _) = dispatcher(&server).await;
        let record = record(vec![format!("{}/gone.jpg", server.uri())]);
        let sent = dispatcher
            .process_and_notify(&record, 0, 0, 1)
            .await
            .unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn test_failed_album_send_leaves_no_cache_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:token/sendMediaGroup"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"ok": false, "description": "boom"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, dedup, results) = dispatcher(&server).await;
        let record = record(vec![format!("{}/photo.jpg", server.uri())]);

        let sent = dispatcher
            .process_and_notify(&record, 0, 0, 1)
            .await
            .unwrap();
        assert!(!sent);
        assert!(!dedup
            .is_duplicate("7581377646", &record.url)
            .await
            .unwrap());
        // The durable row exists; only the cache write is withheld
        assert_eq!(results.count_for_owner(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_repeat_within_window_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:token/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, _, results) = dispatcher(&server).await;
        let record = record(vec![]);

        assert!(dispatcher
            .process_and_notify(&record, 0, 0, 1)
            .await
            .unwrap());
        // Second observation inside 24 h: advisory refresh only, no message
        assert!(!dispatcher
            .process_and_notify(&record, 0, 0, 1)
            .await
            .unwrap());
        assert_eq!(results.count_for_owner(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_at_most_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:token/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, _, results) = dispatcher(&server).await;
        let dispatcher = std::sync::Arc::new(dispatcher);
        let record = record(vec![]);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let dispatcher = dispatcher.clone();
            let record = record.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.process_and_notify(&record, 0, 0, 1).await
            }));
        }

        let mut sent_count = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                sent_count += 1;
            }
        }
        assert_eq!(sent_count, 1);
        assert_eq!(results.count_for_owner(1).await.unwrap(), 1);
    }
}
