// Telegram layer - Bot API wire types, the HTTP client and the update
// orchestrator that drives the moderation core.

#[path = "models.rs"]
pub mod models;

#[path = "api.rs"]
pub mod api;

#[path = "update_handler.rs"]
pub mod update_handler;
