// Moderation domain models - data structures for the format-moderation system.
//
// These are pure domain types with no Telegram dependencies.
// The telegram layer will convert these to Bot API actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the escalation ladder decided for a violation count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationDecision {
    /// Warning fires exactly once, on the count equal to the threshold
    pub should_warn: bool,
    /// Ban is sticky: true for every count at or above the threshold
    pub should_ban: bool,
}

/// Outcome of assessing one qualifying violation.
#[derive(Debug, Clone, Copy)]
pub struct ViolationOutcome {
    /// The count after this violation
    pub next_count: u32,
    pub decision: ModerationDecision,
    /// Whether a warning has been issued for this user, now or previously
    pub warning_issued: bool,
}

/// Durable per-(chat, user) violation counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub chat_id: i64,
    pub user_id: i64,
    pub count: u32,
    pub warning_issued: bool,
    pub updated_at: DateTime<Utc>,
}

/// A message awaiting admin disposition, keyed by (chat_id, message_id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub message_id: i64,
    pub raw_text: String,
}

/// Review state of a captured message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pending,
    Approved,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
        }
    }
}

/// Durable record backing the approval workflow. The in-memory pending map is
/// only a cache in front of this.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub chat_id: i64,
    pub user_id: i64,
    pub message_id: i64,
    pub raw_text: String,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub admin_user_id: Option<i64>,
    pub review_message_id: Option<i64>,
}

impl MessageRecord {
    /// Build a fresh pending record for a message entering review.
    pub fn pending(message: &PendingMessage, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: message.chat_id,
            user_id: message.user_id,
            message_id: message.message_id,
            raw_text: message.raw_text.clone(),
            status: ReviewStatus::Pending,
            created_at: now,
            approved_at: None,
            admin_user_id: None,
            review_message_id: None,
        }
    }
}

/// Per-chat, per-day counters that moderation events feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyStatEvent {
    MessagesDeleted,
    WarningsSent,
    UsersBanned,
    MessagesBypassed,
    RateLimited,
}

impl DailyStatEvent {
    /// Column name in the daily stats table.
    pub fn column(&self) -> &'static str {
        match self {
            DailyStatEvent::MessagesDeleted => "messages_deleted",
            DailyStatEvent::WarningsSent => "warnings_sent",
            DailyStatEvent::UsersBanned => "users_banned",
            DailyStatEvent::MessagesBypassed => "messages_bypassed",
            DailyStatEvent::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for DailyStatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// How non-conforming messages are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationMode {
    /// Delete immediately and walk the warn/ban ladder
    Enforce,
    /// Capture for admin approval instead of enforcing
    Review,
}

impl std::str::FromStr for ModerationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "enforce" => Ok(ModerationMode::Enforce),
            "review" => Ok(ModerationMode::Review),
            other => Err(format!("unknown moderation mode: {}", other)),
        }
    }
}
