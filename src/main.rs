// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite storage)
// - `telegram/` = Telegram-specific adapters (Bot API client, update handling)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the background sweep task
// 4. Run the long-poll update loop

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "telegram/telegram_layer.rs"]
mod telegram;

mod config;

use crate::config::BotConfig;
use crate::core::moderation::{ApprovalService, ModerationService};
use crate::infra::moderation::SqliteModerationStore;
use crate::telegram::api::TelegramClient;
use crate::telegram::update_handler::Moderator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Long-poll window passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 50;

/// Pause after a failed getUpdates call before retrying.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Interval between expired-record sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = Arc::new(BotConfig::from_env().expect("Invalid configuration"));

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    // Keep the runtime database in a dedicated folder so the repo root stays tidy.
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).expect("Failed to create data directory");
        }
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", config.database_path))
        .await
        .expect("Failed to connect to moderation DB");
    let store = SqliteModerationStore::new(pool);
    store.migrate().await.expect("Failed to migrate moderation DB");

    let moderation_service = Arc::new(ModerationService::new(
        store.clone(),
        config.warning_at_violation,
        config.ban_at_violation,
        config.violation_ttl_hours,
    ));
    let approval_service = Arc::new(ApprovalService::new(store.clone(), config.admin_user_id));

    let api = Arc::new(
        TelegramClient::new(&config.bot_token).expect("Failed to create Telegram client"),
    );

    let moderator = Arc::new(Moderator::new(
        Arc::clone(&api),
        Arc::clone(&moderation_service),
        Arc::clone(&approval_service),
        Arc::clone(&config),
    ));

    // Background sweep: expired violation records and dormant gate entries.
    {
        let moderation_service = Arc::clone(&moderation_service);
        let moderator = Arc::clone(&moderator);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SWEEP_INTERVAL).await;
                moderation_service.sweep_expired(Utc::now()).await;
                moderator.prune_gates();
            }
        });
    }

    tracing::info!(mode = ?config.mode, "bot is starting up");

    // ========================================================================
    // UPDATE LOOP
    // ========================================================================
    // Long-poll getUpdates and fan each update out to its own task.

    let mut offset: i64 = 0;
    loop {
        let updates = match api.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("getUpdates failed: {}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let moderator = Arc::clone(&moderator);
            tokio::spawn(async move {
                moderator.handle_update(update).await;
            });
        }
    }
}
