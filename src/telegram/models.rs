// Serde models for the Telegram Bot API payloads the bot exchanges.
//
// Only the fields the moderation pipeline reads are modeled; everything
// else in an update is ignored by serde.

use serde::{Deserialize, Serialize};

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    /// The bot only moderates group and supergroup chats.
    pub fn is_group(&self) -> bool {
        self.kind == "group" || self.kind == "supergroup"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    #[serde(default)]
    pub chat: Option<Chat>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub new_chat_members: Option<Vec<User>>,
    // Service-message markers; presence of any of these means the update
    // carries no moderatable content.
    pub left_chat_member: Option<serde_json::Value>,
    pub new_chat_title: Option<serde_json::Value>,
    pub new_chat_photo: Option<serde_json::Value>,
    pub delete_chat_photo: Option<serde_json::Value>,
    pub group_chat_created: Option<serde_json::Value>,
    pub pinned_message: Option<serde_json::Value>,
    pub message_auto_delete_timer_changed: Option<serde_json::Value>,
    pub video_chat_started: Option<serde_json::Value>,
    pub video_chat_ended: Option<serde_json::Value>,
    pub video_chat_participants_invited: Option<serde_json::Value>,
}

impl Message {
    pub fn is_service(&self) -> bool {
        self.new_chat_members.is_some()
            || self.left_chat_member.is_some()
            || self.new_chat_title.is_some()
            || self.new_chat_photo.is_some()
            || self.delete_chat_photo.is_some()
            || self.group_chat_created.is_some()
            || self.pinned_message.is_some()
            || self.message_auto_delete_timer_changed.is_some()
            || self.video_chat_started.is_some()
            || self.video_chat_ended.is_some()
            || self.video_chat_participants_invited.is_some()
    }

    /// Text and caption merged the way the moderation rules see them.
    pub fn combined_text(&self) -> String {
        let text = self.text.as_deref().unwrap_or("");
        match self.caption.as_deref() {
            Some(caption) if !caption.is_empty() => {
                format!("{}\n{}", text, caption).trim().to_string()
            }
            _ => text.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_text_merges_text_and_caption() {
        let message = Message {
            message_id: 1,
            text: Some("заголовок".to_string()),
            caption: Some("подпись".to_string()),
            ..Default::default()
        };
        assert_eq!(message.combined_text(), "заголовок\nподпись");

        let text_only = Message {
            message_id: 1,
            text: Some("  только текст  ".to_string()),
            ..Default::default()
        };
        assert_eq!(text_only.combined_text(), "только текст");
    }

    #[test]
    fn service_markers_are_detected() {
        let plain = Message {
            message_id: 1,
            text: Some("привет".to_string()),
            ..Default::default()
        };
        assert!(!plain.is_service());

        let pinned = Message {
            message_id: 2,
            pinned_message: Some(serde_json::json!({})),
            ..Default::default()
        };
        assert!(pinned.is_service());
    }

    #[test]
    fn update_parses_from_bot_api_json() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 42,
                "from": {"id": 7, "is_bot": false, "first_name": "Иван"},
                "chat": {"id": -100123, "type": "supergroup"},
                "text": "привет #анонс"
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert!(message.chat.as_ref().unwrap().is_group());
        assert_eq!(message.combined_text(), "привет #анонс");
        assert_eq!(message.from.unwrap().id, 7);
    }
}
