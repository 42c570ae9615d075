// Violation-ledger service - core business logic for the warn/ban ladder.
//
// The ledger itself is a durable per-(chat, user) counter behind the
// ModerationStore port. Enforcement ordering is owned by the orchestrator:
// the ban reset only happens after the transport ban succeeded, so a failed
// ban leaves the incremented count persisted and the sticky ban fires again
// on the next message.
//
// NO Telegram dependencies here - just pure domain logic.

use super::moderation_models::{DailyStatEvent, ViolationOutcome, ViolationRecord};
use super::moderation_policy::decide_moderation_action;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Port for the durable violation ledger and daily statistics.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn get_violation(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<Option<ViolationRecord>, ModerationError>;

    async fn upsert_violation(&self, record: &ViolationRecord) -> Result<(), ModerationError>;

    async fn delete_violation(&self, chat_id: i64, user_id: i64) -> Result<(), ModerationError>;

    /// Delete every record older than the cutoff. Returns how many were removed.
    async fn delete_violations_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ModerationError>;

    async fn increment_daily_stat(
        &self,
        chat_id: i64,
        day: NaiveDate,
        event: DailyStatEvent,
    ) -> Result<(), ModerationError>;
}

/// Ledger operations around the pure escalation policy.
///
/// Store failures never escalate out of this service: reads degrade to "no
/// record" (fail open) and writes are logged and dropped, per the
/// best-effort error model.
pub struct ModerationService<S: ModerationStore> {
    store: S,
    warning_at_violation: u32,
    ban_at_violation: u32,
    violation_ttl: Duration,
}

impl<S: ModerationStore> ModerationService<S> {
    pub fn new(
        store: S,
        warning_at_violation: u32,
        ban_at_violation: u32,
        violation_ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            warning_at_violation,
            ban_at_violation,
            violation_ttl: Duration::hours(violation_ttl_hours),
        }
    }

    /// Read the current record, compute the incremented count and evaluate
    /// the ladder. Does not persist anything.
    pub async fn assess_violation(&self, chat_id: i64, user_id: i64) -> ViolationOutcome {
        let current = match self.store.get_violation(chat_id, user_id).await {
            Ok(record) => record,
            Err(e) => {
                // Fail open: a broken read degrades to count = 0
                tracing::error!(chat_id, user_id, "failed to read violation record: {}", e);
                None
            }
        };

        let previously_warned = current.as_ref().map(|r| r.warning_issued).unwrap_or(false);
        let next_count = current.map(|r| r.count).unwrap_or(0) + 1;
        let decision =
            decide_moderation_action(next_count, self.warning_at_violation, self.ban_at_violation);

        ViolationOutcome {
            next_count,
            decision,
            warning_issued: decision.should_warn || previously_warned,
        }
    }

    /// Upsert the record after a non-ban violation.
    pub async fn persist_count(
        &self,
        chat_id: i64,
        user_id: i64,
        count: u32,
        warning_issued: bool,
        now: DateTime<Utc>,
    ) {
        let record = ViolationRecord {
            chat_id,
            user_id,
            count,
            warning_issued,
            updated_at: now,
        };
        if let Err(e) = self.store.upsert_violation(&record).await {
            tracing::error!(chat_id, user_id, "failed to upsert violation record: {}", e);
        }
    }

    /// Reset the ledger for a user: bypass-tag use and post-ban cleanup.
    pub async fn clear_violations(&self, chat_id: i64, user_id: i64) {
        if let Err(e) = self.store.delete_violation(chat_id, user_id).await {
            tracing::error!(chat_id, user_id, "failed to reset violation record: {}", e);
        }
    }

    /// Dormancy sweep: delete records not updated within the TTL.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> u64 {
        let cutoff = now - self.violation_ttl;
        match self.store.delete_violations_before(cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "expired violation records swept");
                }
                removed
            }
            Err(e) => {
                tracing::error!("violation sweep failed: {}", e);
                0
            }
        }
    }

    /// Bump one of the per-chat daily counters.
    pub async fn increment_stat(&self, chat_id: i64, event: DailyStatEvent) {
        let day = Utc::now().date_naive();
        if let Err(e) = self.store.increment_daily_stat(chat_id, day, event).await {
            tracing::error!(chat_id, stat = %event, "failed to increment daily stat: {}", e);
        }
    }
}
