// Telegram-specific moderation orchestration - wires inbound updates through
// the gates, the format check and the ladder, and admin callbacks through
// the approval workflow.
//
// Every outbound action is best-effort: its failure is logged and the rest
// of the pipeline continues. Timed notice deletions run as detached tasks.

use crate::config::BotConfig;
use crate::core::moderation::format::{
    escape_html, has_bypass_tag, has_required_tag, normalize_for_duplicate, participant_name,
};
use crate::core::moderation::{
    parse_callback_action, ApprovalService, CallbackAction, DailyStatEvent, DuplicateGate,
    MessageStore, ModerationMode, ModerationService, ModerationStore, PendingMessage, RateGate,
    ResolutionLookup, ReviewAction, ViolationOutcome,
};
use crate::telegram::api::{ChatApi, SendOptions};
use crate::telegram::models::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update, User};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct Moderator<C, S, M>
where
    C: ChatApi + 'static,
    S: ModerationStore,
    M: MessageStore,
{
    api: Arc<C>,
    moderation: Arc<ModerationService<S>>,
    approval: Arc<ApprovalService<M>>,
    config: Arc<BotConfig>,
    rate_gate: RateGate,
    duplicate_gate: DuplicateGate,
    /// Last pinned approved message per chat, so a new pin replaces it.
    pinned_approved: DashMap<i64, i64>,
}

impl<C, S, M> Moderator<C, S, M>
where
    C: ChatApi + 'static,
    S: ModerationStore,
    M: MessageStore,
{
    pub fn new(
        api: Arc<C>,
        moderation: Arc<ModerationService<S>>,
        approval: Arc<ApprovalService<M>>,
        config: Arc<BotConfig>,
    ) -> Self {
        let rate_gate = RateGate::new(config.rate_limit_window_ms, config.rate_limit_max_messages);
        let duplicate_gate = DuplicateGate::new(config.duplicate_window_ms);
        Self {
            api,
            moderation,
            approval,
            config,
            rate_gate,
            duplicate_gate,
            pinned_approved: DashMap::new(),
        }
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        }
    }

    /// Drop dormant gate entries. Called by the periodic sweep.
    pub fn prune_gates(&self) {
        let now = Utc::now();
        self.rate_gate.prune(now);
        self.duplicate_gate.prune(now);
    }

    async fn handle_message(&self, message: Message) {
        let chat = match &message.chat {
            Some(chat) if chat.is_group() => chat.clone(),
            _ => return,
        };
        let user = match &message.from {
            Some(user) => user.clone(),
            None => return,
        };
        if self.config.is_whitelisted(user.id) {
            return;
        }

        let chat_id = chat.id;
        let message_id = message.message_id;

        if let Some(new_members) = &message.new_chat_members {
            if self.config.ban_bot_adders && new_members.iter().any(|member| member.is_bot) {
                match self.api.ban_chat_member(chat_id, user.id).await {
                    Ok(()) => {
                        self.moderation
                            .increment_stat(chat_id, DailyStatEvent::UsersBanned)
                            .await;
                        tracing::info!(chat_id, user_id = user.id, "user banned for adding a bot");
                    }
                    Err(e) => {
                        tracing::warn!(chat_id, user_id = user.id, "failed to ban bot adder: {}", e)
                    }
                }
                return;
            }
        }

        if message.is_service() {
            return;
        }

        let raw_text = message.combined_text();

        let now = Utc::now();
        if self.rate_gate.hit(chat_id, user.id, now) {
            if let Err(e) = self.api.delete_message(chat_id, message_id).await {
                tracing::warn!(chat_id, message_id, "failed to delete rate-limited message: {}", e);
            }
            self.moderation
                .increment_stat(chat_id, DailyStatEvent::RateLimited)
                .await;
            tracing::info!(chat_id, user_id = user.id, message_id, "message rate limited");
            return;
        }

        let normalized = normalize_for_duplicate(&raw_text);
        if self.duplicate_gate.check(chat_id, user.id, &normalized, now) {
            if let Err(e) = self.api.delete_message(chat_id, message_id).await {
                tracing::warn!(chat_id, message_id, "failed to delete duplicate message: {}", e);
            }
            self.moderation
                .increment_stat(chat_id, DailyStatEvent::MessagesDeleted)
                .await;
            tracing::info!(chat_id, user_id = user.id, message_id, "duplicate message deleted");
            return;
        }

        if has_bypass_tag(&raw_text, &self.config.bypass_tags) {
            self.moderation.clear_violations(chat_id, user.id).await;
            self.moderation
                .increment_stat(chat_id, DailyStatEvent::MessagesBypassed)
                .await;
            tracing::info!(chat_id, user_id = user.id, message_id, "message bypassed by tag");
            return;
        }

        if has_required_tag(&raw_text, &self.config.required_tag) {
            return;
        }

        match self.config.mode {
            ModerationMode::Enforce => {
                self.enforce_format(chat_id, &user, message_id).await;
            }
            ModerationMode::Review => {
                self.defer_to_review(chat_id, &user, message_id, raw_text)
                    .await;
            }
        }
    }

    /// Auto-enforce path: delete the message and walk the warn/ban ladder.
    async fn enforce_format(&self, chat_id: i64, user: &User, message_id: i64) {
        match self.api.delete_message(chat_id, message_id).await {
            Ok(()) => {
                self.moderation
                    .increment_stat(chat_id, DailyStatEvent::MessagesDeleted)
                    .await;
                tracing::info!(chat_id, user_id = user.id, message_id, "message deleted, missing required tag");
            }
            Err(e) => {
                tracing::warn!(chat_id, message_id, "failed to delete non-conforming message: {}", e);
            }
        }

        let outcome = self.moderation.assess_violation(chat_id, user.id).await;

        if !outcome.decision.should_ban {
            self.send_format_notice(chat_id, user, &outcome).await;
        } else {
            match self.api.ban_chat_member(chat_id, user.id).await {
                Ok(()) => {
                    // Ban resets the ledger; a future rejoin starts clean
                    self.moderation.clear_violations(chat_id, user.id).await;
                    self.moderation
                        .increment_stat(chat_id, DailyStatEvent::UsersBanned)
                        .await;
                    tracing::info!(
                        chat_id,
                        user_id = user.id,
                        violations = outcome.next_count,
                        "user banned after format violations"
                    );
                    return;
                }
                Err(e) => {
                    // Keep the incremented count so the sticky ban fires again
                    tracing::warn!(chat_id, user_id = user.id, "failed to ban user: {}", e);
                }
            }
        }

        self.moderation
            .persist_count(
                chat_id,
                user.id,
                outcome.next_count,
                outcome.warning_issued,
                Utc::now(),
            )
            .await;
    }

    /// Post the deletion notice and schedule its own removal.
    async fn send_format_notice(&self, chat_id: i64, user: &User, outcome: &ViolationOutcome) {
        let name = escape_html(&participant_name(
            user.first_name.as_deref(),
            user.last_name.as_deref(),
            user.username.as_deref(),
        ));
        let warning_suffix = if outcome.decision.should_warn {
            " Это предупреждение."
        } else {
            ""
        };
        let text = format!(
            "<a href=\"tg://user?id={}\">{}</a>, сообщение удалено.{} Перед публикацией прочитайте формат: {}",
            user.id, name, warning_suffix, self.config.format_guide_url
        );

        let options = SendOptions {
            html: true,
            ..SendOptions::default()
        };
        match self.api.send_message(chat_id, &text, options).await {
            Ok(notice) => {
                if outcome.decision.should_warn {
                    self.moderation
                        .increment_stat(chat_id, DailyStatEvent::WarningsSent)
                        .await;
                }

                // Detached timer: the notice cleans itself up without
                // holding the message pipeline open
                let api = Arc::clone(&self.api);
                let delete_after = Duration::from_millis(self.config.warning_delete_after_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(delete_after).await;
                    if let Err(e) = api.delete_message(chat_id, notice.message_id).await {
                        tracing::warn!(chat_id, "failed to delete format notice: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::warn!(chat_id, user_id = user.id, "failed to send format notice: {}", e);
            }
        }
    }

    /// Review path: capture the message and prompt the admin instead of
    /// enforcing.
    async fn defer_to_review(&self, chat_id: i64, user: &User, message_id: i64, raw_text: String) {
        let pending = PendingMessage {
            chat_id,
            user_id: user.id,
            message_id,
            raw_text,
        };
        self.approval.begin_review(pending.clone(), Utc::now()).await;

        let name = participant_name(
            user.first_name.as_deref(),
            user.last_name.as_deref(),
            user.username.as_deref(),
        );
        let prompt = format!(
            "Сообщение на модерацию\nchat_id: {}\nот: {} (id {})\n\n{}",
            chat_id, name, user.id, pending.raw_text
        );
        let keyboard = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![
                InlineKeyboardButton {
                    text: "Опубликовать".to_string(),
                    callback_data: CallbackAction::encode(ReviewAction::Approve, chat_id, message_id),
                },
                InlineKeyboardButton {
                    text: "Отклонить".to_string(),
                    callback_data: CallbackAction::encode(ReviewAction::Reject, chat_id, message_id),
                },
            ]],
        };
        let options = SendOptions {
            reply_markup: Some(keyboard),
            ..SendOptions::default()
        };

        match self
            .api
            .send_message(self.config.admin_user_id, &prompt, options)
            .await
        {
            Ok(sent) => {
                self.approval
                    .record_review_prompt(chat_id, message_id, sent.message_id)
                    .await;
                tracing::info!(chat_id, user_id = user.id, message_id, "message deferred to review");
            }
            Err(e) => {
                tracing::warn!(chat_id, message_id, "failed to send review prompt: {}", e);
            }
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        let data = callback.data.clone().unwrap_or_default();
        if !data.starts_with("approve:") && !data.starts_with("reject:") {
            return;
        }

        let action = match parse_callback_action(&data) {
            Some(action) => action,
            None => {
                self.answer(&callback.id, "Некорректные данные.", true).await;
                return;
            }
        };

        let pending = match self.approval.resolve(callback.from.id, &action).await {
            ResolutionLookup::Found(pending) => pending,
            ResolutionLookup::Unauthorized => {
                self.answer(&callback.id, "Только админ может подтверждать.", true)
                    .await;
                return;
            }
            ResolutionLookup::NotFound => {
                self.answer(&callback.id, "Запись не найдена в pending.", true)
                    .await;
                return;
            }
        };

        let review_message_id = callback.message.as_ref().map(|m| m.message_id);

        match action.action {
            ReviewAction::Reject => self.reject(&callback, &pending, review_message_id).await,
            ReviewAction::Approve => self.approve(&callback, &pending, review_message_id).await,
        }
    }

    /// Reject: drop the pending item, leave the source message untouched.
    async fn reject(
        &self,
        callback: &CallbackQuery,
        pending: &PendingMessage,
        review_message_id: Option<i64>,
    ) {
        self.approval
            .finish_rejection(pending.chat_id, pending.message_id)
            .await;

        self.retract_review_prompt(review_message_id).await;

        let summary = format!(
            "Отклонено\nchat_id: {}\nsource_message_id: {}\nsource_unchanged: yes",
            pending.chat_id, pending.message_id
        );
        if let Err(e) = self
            .api
            .send_message(self.config.admin_user_id, &summary, SendOptions::default())
            .await
        {
            tracing::warn!("failed to notify admin about rejection: {}", e);
        }

        self.answer(&callback.id, "Отклонено.", false).await;
        tracing::info!(
            chat_id = pending.chat_id,
            source_message_id = pending.message_id,
            "message rejected by admin"
        );
    }

    /// Approve: publish the stored text, then best-effort remove the source
    /// and retract the prompt. A failed publish aborts the transition.
    async fn approve(
        &self,
        callback: &CallbackQuery,
        pending: &PendingMessage,
        review_message_id: Option<i64>,
    ) {
        let options = SendOptions {
            disable_web_page_preview: true,
            ..SendOptions::default()
        };
        let sent = match self
            .api
            .send_message(pending.chat_id, &pending.raw_text, options)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!(
                    chat_id = pending.chat_id,
                    "failed to publish approved message: {}",
                    e
                );
                self.answer(&callback.id, "Не удалось отправить сообщение.", true)
                    .await;
                return;
            }
        };

        let source_deleted = match self
            .api
            .delete_message(pending.chat_id, pending.message_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    chat_id = pending.chat_id,
                    message_id = pending.message_id,
                    "failed to delete approved source message: {}",
                    e
                );
                false
            }
        };

        self.approval.finish_approval(pending, Utc::now()).await;

        if self.config.pin_approved_messages {
            self.pin_approved(pending.chat_id, sent.message_id).await;
        }

        self.retract_review_prompt(review_message_id).await;
        self.answer(&callback.id, "Готово.", false).await;
        tracing::info!(
            chat_id = pending.chat_id,
            source_message_id = pending.message_id,
            sent_message_id = sent.message_id,
            source_deleted,
            "message approved"
        );
    }

    /// Pin the freshly published message, replacing the previous pin.
    async fn pin_approved(&self, chat_id: i64, message_id: i64) {
        if let Some(previous) = self.pinned_approved.get(&chat_id).map(|entry| *entry) {
            if let Err(e) = self.api.unpin_chat_message(chat_id, previous).await {
                tracing::warn!(chat_id, message_id = previous, "failed to unpin previous message: {}", e);
            }
        }
        match self.api.pin_chat_message(chat_id, message_id).await {
            Ok(()) => {
                self.pinned_approved.insert(chat_id, message_id);
            }
            Err(e) => {
                tracing::warn!(chat_id, message_id, "failed to pin approved message: {}", e);
            }
        }
    }

    async fn retract_review_prompt(&self, review_message_id: Option<i64>) {
        if let Some(review_message_id) = review_message_id {
            if let Err(e) = self
                .api
                .delete_message(self.config.admin_user_id, review_message_id)
                .await
            {
                tracing::warn!(review_message_id, "failed to retract review prompt: {}", e);
            }
        }
    }

    async fn answer(&self, callback_id: &str, text: &str, alert: bool) {
        if let Err(e) = self.api.answer_callback_query(callback_id, text, alert).await {
            tracing::warn!("failed to answer callback query: {}", e);
        }
    }
}
