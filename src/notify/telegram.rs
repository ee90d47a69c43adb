use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::utils::{AppError, Result};

/// Photos already fetched to memory for one album.
#[derive(Debug, Clone)]
pub struct PhotoBuffer {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Thin Bot API client. Text sends get three attempts with a 2 s backoff;
/// album sends get exactly one attempt with extended timeouts.
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: i64,
    admin_chat_id: i64,
    text_timeout: Duration,
    album_timeout: Duration,
}

impl TelegramApi {
    pub fn new(config: &TelegramConfig, admin_chat_id: i64) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            chat_id: config.chat_id,
            admin_chat_id,
            text_timeout: Duration::from_secs(config.text_timeout_secs),
            album_timeout: Duration::from_secs(config.album_timeout_secs),
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn check_response(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        let body: ApiResponse = response.json().await.unwrap_or(ApiResponse {
            ok: false,
            description: Some(format!("unparseable response (HTTP {status})")),
        });
        if !status.is_success() || !body.ok {
            return Err(AppError::Telegram(format!(
                "HTTP {status}: {}",
                body.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// The two-button inline keyboard attached to text notifications.
    pub fn notification_keyboard(listing_url: &str, listing_id: &str) -> serde_json::Value {
        json!({
            "inline_keyboard": [[
                { "text": "🔗 Перейти к объявлению", "url": listing_url },
                { "text": "⭐ Добавить в избранное", "callback_data": format!("favorite_{listing_id}") }
            ]]
        })
    }

    /// HTML text message with three attempts and a 2 s backoff between them.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<()> {
        let strategy = FixedInterval::from_millis(2_000).take(2);
        let api = self;
        let markup = &reply_markup;

        Retry::spawn(strategy, move || async move {
            let mut body = json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            });
            if let Some(markup) = markup {
                body["reply_markup"] = markup.clone();
            }

            let response = api
                .client
                .post(api.method_url("sendMessage"))
                .timeout(api.text_timeout)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    warn!("sendMessage attempt failed: {e}");
                    AppError::Http(e)
                })?;

            Self::check_response(response).await.map_err(|e| {
                warn!("sendMessage rejected: {e}");
                e
            })
        })
        .await?;

        debug!(chat_id, "text message sent");
        Ok(())
    }

    /// One album of up to five photos; the first item carries the caption.
    /// Albums take no reply markup and are never retried.
    pub async fn send_media_group(
        &self,
        chat_id: i64,
        photos: &[PhotoBuffer],
        caption: &str,
    ) -> Result<()> {
        if photos.is_empty() {
            return Err(AppError::Telegram("empty media group".to_string()));
        }

        let mut media = Vec::new();
        for (i, _) in photos.iter().take(5).enumerate() {
            let mut item = json!({
                "type": "photo",
                "media": format!("attach://photo{i}"),
            });
            if i == 0 {
                item["caption"] = json!(caption);
                item["parse_mode"] = json!("HTML");
            }
            media.push(item);
        }

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("media", serde_json::to_string(&media)?);
        for (i, photo) in photos.iter().take(5).enumerate() {
            form = form.part(
                format!("photo{i}"),
                Part::bytes(photo.bytes.clone()).file_name(photo.file_name.clone()),
            );
        }

        let response = self
            .client
            .post(self.method_url("sendMediaGroup"))
            .timeout(self.album_timeout)
            .multipart(form)
            .send()
            .await?;

        Self::check_response(response).await?;
        debug!(chat_id, photos = photos.len().min(5), "media group sent");
        Ok(())
    }

    /// Operator alert into the admin chat; failures are logged, never fatal.
    pub async fn send_alert(&self, text: &str) -> Result<()> {
        self.send_message(self.admin_chat_id, text, None).await
    }
}
