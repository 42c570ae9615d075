// Minimal Telegram Bot API client. It deliberately exposes only the calls
// the moderation pipeline needs.

use super::models::{ApiResponse, InlineKeyboardMarkup, SentMessage, Update};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Options for outbound messages.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub html: bool,
    pub disable_web_page_preview: bool,
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

/// Outbound chat actions the moderation pipeline performs. All of them are
/// best-effort from the caller's point of view: failures are logged and the
/// pipeline continues.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> Result<SentMessage, TelegramError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError>;

    async fn ban_chat_member(&self, chat_id: i64, user_id: i64) -> Result<(), TelegramError>;

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
        show_alert: bool,
    ) -> Result<(), TelegramError>;

    async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError>;

    async fn unpin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError>;
}

pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Result<Self, TelegramError> {
        // Timeout must stay above the long-poll window of get_updates
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        if !body.ok {
            return Err(TelegramError::Api(
                body.description
                    .unwrap_or_else(|| format!("{} failed without description", method)),
            ));
        }

        body.result
            .ok_or_else(|| TelegramError::Api(format!("{} returned an empty result", method)))
    }

    /// Long-poll the Bot API for the next batch of updates.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }
}

#[async_trait]
impl ChatApi for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> Result<SentMessage, TelegramError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if options.html {
            payload["parse_mode"] = json!("HTML");
        }
        if options.disable_web_page_preview {
            payload["disable_web_page_preview"] = json!(true);
        }
        if let Some(markup) = &options.reply_markup {
            payload["reply_markup"] = serde_json::to_value(markup)
                .map_err(|e| TelegramError::Api(e.to_string()))?;
        }

        self.call("sendMessage", payload).await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        self.call::<bool>(
            "deleteMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn ban_chat_member(&self, chat_id: i64, user_id: i64) -> Result<(), TelegramError> {
        self.call::<bool>(
            "banChatMember",
            json!({ "chat_id": chat_id, "user_id": user_id }),
        )
        .await?;
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
        show_alert: bool,
    ) -> Result<(), TelegramError> {
        self.call::<bool>(
            "answerCallbackQuery",
            json!({
                "callback_query_id": callback_query_id,
                "text": text,
                "show_alert": show_alert,
            }),
        )
        .await?;
        Ok(())
    }

    async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        self.call::<bool>(
            "pinChatMessage",
            json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "disable_notification": true,
            }),
        )
        .await?;
        Ok(())
    }

    async fn unpin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        self.call::<bool>(
            "unpinChatMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }
}
