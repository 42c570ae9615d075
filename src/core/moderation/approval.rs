// Approval workflow - pending review items and their resolution.
//
// A flagged message becomes a Pending item keyed by (chat_id, message_id).
// The durable record is the source of truth; the in-memory map is a cache
// that self-heals from the store after a restart. A resolved item is gone
// from both, so resolving it again safely reports not-found.

use super::moderation_models::{MessageRecord, PendingMessage};
use super::moderation_service::ModerationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Port for the durable message records behind the approval workflow.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save_message_record(&self, record: &MessageRecord) -> Result<(), ModerationError>;

    /// Remember the id of the review prompt so it can be retracted later.
    async fn set_review_message_id(
        &self,
        chat_id: i64,
        message_id: i64,
        review_message_id: i64,
    ) -> Result<(), ModerationError>;

    /// Load a record that is still pending; resolved records do not match.
    async fn load_pending_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<PendingMessage>, ModerationError>;

    async fn mark_approved(
        &self,
        chat_id: i64,
        message_id: i64,
        admin_user_id: i64,
        approved_at: DateTime<Utc>,
    ) -> Result<(), ModerationError>;

    async fn delete_message_record(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), ModerationError>;
}

/// The verb an admin action carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn verb(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
        }
    }
}

/// A parsed admin action: verb plus the pending key it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackAction {
    pub action: ReviewAction,
    pub chat_id: i64,
    pub message_id: i64,
}

impl CallbackAction {
    /// Token the review prompt buttons carry.
    pub fn encode(action: ReviewAction, chat_id: i64, message_id: i64) -> String {
        format!("{}:{}:{}", action.verb(), chat_id, message_id)
    }
}

/// Parse a colon-delimited `"<verb>:<chatId>:<messageId>"` token. Wrong
/// arity, unknown verbs and non-integer ids are rejected.
pub fn parse_callback_action(data: &str) -> Option<CallbackAction> {
    let parts: Vec<&str> = data.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let action = match parts[0] {
        "approve" => ReviewAction::Approve,
        "reject" => ReviewAction::Reject,
        _ => return None,
    };

    let chat_id = parts[1].parse::<i64>().ok()?;
    let message_id = parts[2].parse::<i64>().ok()?;

    Some(CallbackAction {
        action,
        chat_id,
        message_id,
    })
}

/// What screening an admin action yielded.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionLookup {
    Unauthorized,
    NotFound,
    Found(PendingMessage),
}

/// Pending review items: an in-memory cache in front of the durable store,
/// plus the transitions that resolve them.
pub struct ApprovalService<S: MessageStore> {
    store: S,
    admin_user_id: i64,
    pending: DashMap<(i64, i64), PendingMessage>,
}

impl<S: MessageStore> ApprovalService<S> {
    pub fn new(store: S, admin_user_id: i64) -> Self {
        Self {
            store,
            admin_user_id,
            pending: DashMap::new(),
        }
    }

    /// Only the configured admin may resolve pending items.
    pub fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.admin_user_id
    }

    /// Capture a message for review: persist the pending record and cache
    /// it. A failed write is logged and the cache entry still stands for
    /// the current process lifetime.
    pub async fn begin_review(&self, message: PendingMessage, now: DateTime<Utc>) {
        let record = MessageRecord::pending(&message, now);
        if let Err(e) = self.store.save_message_record(&record).await {
            tracing::error!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                "failed to persist pending message: {}",
                e
            );
        }
        self.pending
            .insert((message.chat_id, message.message_id), message);
    }

    /// Record the review prompt's own id against the pending item.
    pub async fn record_review_prompt(&self, chat_id: i64, message_id: i64, review_message_id: i64) {
        if let Err(e) = self
            .store
            .set_review_message_id(chat_id, message_id, review_message_id)
            .await
        {
            tracing::error!(chat_id, message_id, "failed to record review prompt id: {}", e);
        }
    }

    /// Look a pending item up, preferring the cache and falling back to the
    /// durable store (self-healing against cache loss).
    pub async fn find_pending(&self, chat_id: i64, message_id: i64) -> Option<PendingMessage> {
        if let Some(cached) = self.pending.get(&(chat_id, message_id)) {
            return Some(cached.clone());
        }

        match self.store.load_pending_message(chat_id, message_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(chat_id, message_id, "failed to load pending message: {}", e);
                None
            }
        }
    }

    /// Approve transition bookkeeping: mark the durable record approved with
    /// the admin identity and timestamp, then drop it from cache and store.
    pub async fn finish_approval(&self, message: &PendingMessage, now: DateTime<Utc>) {
        self.pending.remove(&(message.chat_id, message.message_id));

        if let Err(e) = self
            .store
            .mark_approved(message.chat_id, message.message_id, self.admin_user_id, now)
            .await
        {
            tracing::error!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                "failed to mark message approved: {}",
                e
            );
        }
        if let Err(e) = self
            .store
            .delete_message_record(message.chat_id, message.message_id)
            .await
        {
            tracing::error!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                "failed to delete approved message record: {}",
                e
            );
        }
    }

    /// Screen an inbound admin action: authorization first, then the
    /// cache-first lookup. Absent keys resolve to `NotFound` without error.
    pub async fn resolve(&self, actor_id: i64, action: &CallbackAction) -> ResolutionLookup {
        if !self.is_admin(actor_id) {
            return ResolutionLookup::Unauthorized;
        }
        match self.find_pending(action.chat_id, action.message_id).await {
            Some(pending) => ResolutionLookup::Found(pending),
            None => ResolutionLookup::NotFound,
        }
    }

    /// Reject transition bookkeeping: drop the item, leave the source alone.
    pub async fn finish_rejection(&self, chat_id: i64, message_id: i64) {
        self.pending.remove(&(chat_id, message_id));
        if let Err(e) = self.store.delete_message_record(chat_id, message_id).await {
            tracing::error!(chat_id, message_id, "failed to delete rejected message record: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::ReviewStatus;

    /// In-memory store for testing
    struct MockMessageStore {
        records: DashMap<(i64, i64), MessageRecord>,
    }

    impl MockMessageStore {
        fn new() -> Self {
            Self {
                records: DashMap::new(),
            }
        }
    }

    #[async_trait]
    impl MessageStore for MockMessageStore {
        async fn save_message_record(&self, record: &MessageRecord) -> Result<(), ModerationError> {
            self.records
                .insert((record.chat_id, record.message_id), record.clone());
            Ok(())
        }

        async fn set_review_message_id(
            &self,
            chat_id: i64,
            message_id: i64,
            review_message_id: i64,
        ) -> Result<(), ModerationError> {
            if let Some(mut record) = self.records.get_mut(&(chat_id, message_id)) {
                record.review_message_id = Some(review_message_id);
            }
            Ok(())
        }

        async fn load_pending_message(
            &self,
            chat_id: i64,
            message_id: i64,
        ) -> Result<Option<PendingMessage>, ModerationError> {
            Ok(self
                .records
                .get(&(chat_id, message_id))
                .filter(|r| r.status == ReviewStatus::Pending)
                .map(|r| PendingMessage {
                    chat_id: r.chat_id,
                    user_id: r.user_id,
                    message_id: r.message_id,
                    raw_text: r.raw_text.clone(),
                }))
        }

        async fn mark_approved(
            &self,
            chat_id: i64,
            message_id: i64,
            admin_user_id: i64,
            approved_at: DateTime<Utc>,
        ) -> Result<(), ModerationError> {
            if let Some(mut record) = self.records.get_mut(&(chat_id, message_id)) {
                record.status = ReviewStatus::Approved;
                record.admin_user_id = Some(admin_user_id);
                record.approved_at = Some(approved_at);
            }
            Ok(())
        }

        async fn delete_message_record(
            &self,
            chat_id: i64,
            message_id: i64,
        ) -> Result<(), ModerationError> {
            self.records.remove(&(chat_id, message_id));
            Ok(())
        }
    }

    fn pending(chat_id: i64, message_id: i64) -> PendingMessage {
        PendingMessage {
            chat_id,
            user_id: 7,
            message_id,
            raw_text: "текст без тега".to_string(),
        }
    }

    #[test]
    fn parses_valid_action_tokens() {
        let parsed = parse_callback_action("approve:-1001234:42").unwrap();
        assert_eq!(parsed.action, ReviewAction::Approve);
        assert_eq!(parsed.chat_id, -1001234);
        assert_eq!(parsed.message_id, 42);

        let parsed = parse_callback_action("reject:5:6").unwrap();
        assert_eq!(parsed.action, ReviewAction::Reject);
    }

    #[test]
    fn rejects_malformed_action_tokens() {
        assert!(parse_callback_action("").is_none());
        assert!(parse_callback_action("approve:1").is_none());
        assert!(parse_callback_action("approve:1:2:3").is_none());
        assert!(parse_callback_action("delete:1:2").is_none());
        assert!(parse_callback_action("approve:abc:2").is_none());
        assert!(parse_callback_action("approve:1:2.5").is_none());
    }

    #[test]
    fn encode_round_trips_through_parse() {
        let token = CallbackAction::encode(ReviewAction::Reject, -100, 42);
        let parsed = parse_callback_action(&token).unwrap();
        assert_eq!(parsed.action, ReviewAction::Reject);
        assert_eq!(parsed.chat_id, -100);
        assert_eq!(parsed.message_id, 42);
    }

    #[tokio::test]
    async fn approve_round_trip_removes_the_item() {
        let service = ApprovalService::new(MockMessageStore::new(), 500);
        let now = Utc::now();

        service.begin_review(pending(-100, 42), now).await;

        let found = service.find_pending(-100, 42).await.unwrap();
        service.finish_approval(&found, now).await;

        // A second resolution with the same key reports not-found
        assert!(service.find_pending(-100, 42).await.is_none());
    }

    #[tokio::test]
    async fn reject_round_trip_removes_the_item() {
        let service = ApprovalService::new(MockMessageStore::new(), 500);
        let now = Utc::now();

        service.begin_review(pending(-100, 42), now).await;
        service.finish_rejection(-100, 42).await;

        assert!(service.find_pending(-100, 42).await.is_none());
    }

    #[tokio::test]
    async fn lookup_falls_back_to_durable_store() {
        let store = MockMessageStore::new();
        let message = pending(-100, 42);
        store
            .save_message_record(&MessageRecord::pending(&message, Utc::now()))
            .await
            .unwrap();

        // Fresh service: simulates a restart that lost the cache
        let service = ApprovalService::new(store, 500);

        let found = service.find_pending(-100, 42).await.unwrap();
        assert_eq!(found, message);
    }

    #[tokio::test]
    async fn resolved_record_no_longer_loads_from_store() {
        let service = ApprovalService::new(MockMessageStore::new(), 500);
        let now = Utc::now();
        let message = pending(-100, 42);

        service.begin_review(message.clone(), now).await;
        service.finish_approval(&message, now).await;

        // Even with a cold cache the store holds nothing pending
        assert!(service.find_pending(-100, 42).await.is_none());
    }

    #[tokio::test]
    async fn unknown_key_is_a_safe_no_op() {
        let service = ApprovalService::new(MockMessageStore::new(), 500);

        assert!(service.find_pending(-100, 99).await.is_none());
        service.finish_rejection(-100, 99).await;
    }

    #[test]
    fn only_configured_admin_is_authorized() {
        let service = ApprovalService::new(MockMessageStore::new(), 500);
        assert!(service.is_admin(500));
        assert!(!service.is_admin(501));
    }

    #[tokio::test]
    async fn resolve_screens_actor_before_lookup() {
        let service = ApprovalService::new(MockMessageStore::new(), 500);
        let message = pending(-100, 42);
        service.begin_review(message.clone(), Utc::now()).await;

        let action = parse_callback_action("approve:-100:42").unwrap();
        assert_eq!(
            service.resolve(501, &action).await,
            ResolutionLookup::Unauthorized
        );
        assert_eq!(
            service.resolve(500, &action).await,
            ResolutionLookup::Found(message)
        );

        let absent = parse_callback_action("reject:-100:99").unwrap();
        assert_eq!(service.resolve(500, &absent).await, ResolutionLookup::NotFound);
    }
}
