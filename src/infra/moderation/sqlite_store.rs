// SQLite-backed moderation store for persistent ledger and review data.
//
// Tables:
// - format_violations: Per-(chat, user) violation counters
// - moderation_messages: Message records for the approval workflow
// - moderation_daily_stats: Per-(chat, day) moderation counters

use crate::core::moderation::{
    DailyStatEvent, MessageRecord, MessageStore, ModerationError, ModerationStore, PendingMessage,
    ReviewStatus, ViolationRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Row, Sqlite};

#[derive(Clone)]
pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS format_violations (
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                violation_count INTEGER NOT NULL DEFAULT 0,
                warning_issued BOOLEAN NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_messages (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                raw_text TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                approved_at TEXT,
                admin_user_id INTEGER,
                review_message_id INTEGER,
                PRIMARY KEY (chat_id, message_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_daily_stats (
                chat_id INTEGER NOT NULL,
                day TEXT NOT NULL,
                messages_deleted INTEGER NOT NULL DEFAULT 0,
                warnings_sent INTEGER NOT NULL DEFAULT 0,
                users_banned INTEGER NOT NULL DEFAULT 0,
                messages_bypassed INTEGER NOT NULL DEFAULT 0,
                rate_limited INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, day)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(())
    }

    fn parse_datetime(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }
}

#[async_trait]
impl ModerationStore for SqliteModerationStore {
    async fn get_violation(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<Option<ViolationRecord>, ModerationError> {
        let row = sqlx::query(
            r#"
            SELECT violation_count, warning_issued, updated_at
            FROM format_violations
            WHERE chat_id = ? AND user_id = ?
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(row.map(|row| {
            let updated_at: String = row.get("updated_at");
            ViolationRecord {
                chat_id,
                user_id,
                count: row.get::<i64, _>("violation_count") as u32,
                warning_issued: row.get("warning_issued"),
                updated_at: Self::parse_datetime(&updated_at),
            }
        }))
    }

    async fn upsert_violation(&self, record: &ViolationRecord) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO format_violations (chat_id, user_id, violation_count, warning_issued, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chat_id, user_id) DO UPDATE SET
                violation_count = excluded.violation_count,
                warning_issued = excluded.warning_issued,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.chat_id)
        .bind(record.user_id)
        .bind(record.count as i64)
        .bind(record.warning_issued)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_violation(&self, chat_id: i64, user_id: i64) -> Result<(), ModerationError> {
        sqlx::query("DELETE FROM format_violations WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_violations_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ModerationError> {
        let result = sqlx::query("DELETE FROM format_violations WHERE updated_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn increment_daily_stat(
        &self,
        chat_id: i64,
        day: NaiveDate,
        event: DailyStatEvent,
    ) -> Result<(), ModerationError> {
        // event.column() is a static identifier, never user input
        let column = event.column();
        let query = format!(
            r#"
            INSERT INTO moderation_daily_stats (chat_id, day, {column}, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(chat_id, day) DO UPDATE SET
                {column} = {column} + 1,
                updated_at = excluded.updated_at
            "#
        );

        sqlx::query(&query)
            .bind(chat_id)
            .bind(day.format("%Y-%m-%d").to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteModerationStore {
    async fn save_message_record(&self, record: &MessageRecord) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_messages (
                chat_id, message_id, user_id, raw_text, status,
                created_at, approved_at, admin_user_id, review_message_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chat_id, message_id) DO UPDATE SET
                user_id = excluded.user_id,
                raw_text = excluded.raw_text,
                status = excluded.status,
                created_at = excluded.created_at,
                approved_at = excluded.approved_at,
                admin_user_id = excluded.admin_user_id,
                review_message_id = excluded.review_message_id
            "#,
        )
        .bind(record.chat_id)
        .bind(record.message_id)
        .bind(record.user_id)
        .bind(&record.raw_text)
        .bind(record.status.as_str())
        .bind(record.created_at.to_rfc3339())
        .bind(record.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(record.admin_user_id)
        .bind(record.review_message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn set_review_message_id(
        &self,
        chat_id: i64,
        message_id: i64,
        review_message_id: i64,
    ) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            UPDATE moderation_messages
            SET review_message_id = ?
            WHERE chat_id = ? AND message_id = ?
            "#,
        )
        .bind(review_message_id)
        .bind(chat_id)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn load_pending_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<PendingMessage>, ModerationError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, raw_text
            FROM moderation_messages
            WHERE chat_id = ? AND message_id = ? AND status = 'pending'
            "#,
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(row.map(|row| PendingMessage {
            chat_id,
            user_id: row.get("user_id"),
            message_id,
            raw_text: row.get("raw_text"),
        }))
    }

    async fn mark_approved(
        &self,
        chat_id: i64,
        message_id: i64,
        admin_user_id: i64,
        approved_at: DateTime<Utc>,
    ) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            UPDATE moderation_messages
            SET status = ?, admin_user_id = ?, approved_at = ?
            WHERE chat_id = ? AND message_id = ?
            "#,
        )
        .bind(ReviewStatus::Approved.as_str())
        .bind(admin_user_id)
        .bind(approved_at.to_rfc3339())
        .bind(chat_id)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_message_record(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), ModerationError> {
        sqlx::query("DELETE FROM moderation_messages WHERE chat_id = ? AND message_id = ?")
            .bind(chat_id)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;
        Ok(())
    }
}
