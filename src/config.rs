// Process configuration, loaded from the environment (with .env support).
//
// Validation is fatal: a misconfigured bot refuses to start instead of
// moderating with broken thresholds.

use crate::core::moderation::ModerationMode;
use anyhow::{bail, Context};
use std::collections::HashSet;

const DEFAULT_FORMAT_GUIDE_URL: &str = "https://t.me/all_12steps/11031";
const DEFAULT_REQUIRED_TAG: &str = "#анонс";
const DEFAULT_BYPASS_TAGS: &str = "оффтоп";
const DEFAULT_DATABASE_PATH: &str = "data/moderation.db";

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub admin_user_id: i64,
    pub required_tag: String,
    pub format_guide_url: String,
    pub warning_delete_after_ms: u64,
    pub warning_at_violation: u32,
    pub ban_at_violation: u32,
    pub violation_ttl_hours: i64,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_messages: u32,
    pub duplicate_window_ms: u64,
    pub whitelist_user_ids: HashSet<i64>,
    pub bypass_tags: HashSet<String>,
    pub mode: ModerationMode,
    pub ban_bot_adders: bool,
    pub pin_approved_messages: bool,
    pub database_path: String,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup so tests do not have to
    /// mutate the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bot_token = lookup("TOKEN").context("TOKEN is required")?;
        if bot_token.trim().is_empty() {
            bail!("TOKEN must not be empty");
        }

        let admin_user_id: i64 = lookup("ADMIN_USER_ID")
            .context("ADMIN_USER_ID is required")?
            .trim()
            .parse()
            .context("ADMIN_USER_ID must be an integer")?;
        if admin_user_id <= 0 {
            bail!("ADMIN_USER_ID must be a positive integer");
        }

        let required_tag =
            lookup("REQUIRED_TAG").unwrap_or_else(|| DEFAULT_REQUIRED_TAG.to_string());
        let format_guide_url =
            lookup("FORMAT_GUIDE_URL").unwrap_or_else(|| DEFAULT_FORMAT_GUIDE_URL.to_string());

        let warning_delete_after_ms =
            parse_number(&lookup, "WARNING_DELETE_AFTER_MS", 5_000)?;
        let warning_at_violation = parse_number(&lookup, "WARNING_AT_VIOLATION", 2)?;
        let ban_at_violation = parse_number(&lookup, "BAN_AT_VIOLATION", 3)?;
        let violation_ttl_hours = parse_number(&lookup, "VIOLATION_TTL_HOURS", 336)?;
        let rate_limit_window_ms = parse_number(&lookup, "RATE_LIMIT_WINDOW_MS", 10_000)?;
        let rate_limit_max_messages = parse_number(&lookup, "RATE_LIMIT_MAX_MESSAGES", 3)?;
        let duplicate_window_ms = parse_number(&lookup, "DUPLICATE_WINDOW_MS", 30_000)?;

        if warning_at_violation == 0 {
            bail!("WARNING_AT_VIOLATION must be > 0");
        }
        if ban_at_violation <= warning_at_violation {
            bail!("BAN_AT_VIOLATION must be > WARNING_AT_VIOLATION");
        }
        if violation_ttl_hours <= 0 {
            bail!("VIOLATION_TTL_HOURS must be > 0");
        }
        if rate_limit_window_ms == 0 {
            bail!("RATE_LIMIT_WINDOW_MS must be > 0");
        }
        if rate_limit_max_messages == 0 {
            bail!("RATE_LIMIT_MAX_MESSAGES must be > 0");
        }
        if duplicate_window_ms == 0 {
            bail!("DUPLICATE_WINDOW_MS must be > 0");
        }

        // The admin is always exempt from the gates and the ladder
        let mut whitelist_user_ids = parse_user_ids(lookup("WHITELIST_USER_IDS").as_deref());
        whitelist_user_ids.insert(admin_user_id);

        let bypass_tags = lookup("BYPASS_TAGS")
            .unwrap_or_else(|| DEFAULT_BYPASS_TAGS.to_string())
            .split(',')
            .map(|tag| tag.trim().trim_start_matches('#').to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();

        let mode = lookup("MODERATION_MODE")
            .unwrap_or_else(|| "enforce".to_string())
            .parse::<ModerationMode>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("MODERATION_MODE must be 'enforce' or 'review'")?;

        let ban_bot_adders = parse_bool(&lookup, "BAN_BOT_ADDERS", true)?;
        let pin_approved_messages = parse_bool(&lookup, "PIN_APPROVED_MESSAGES", false)?;

        let database_path =
            lookup("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        Ok(Self {
            bot_token,
            admin_user_id,
            required_tag,
            format_guide_url,
            warning_delete_after_ms,
            warning_at_violation,
            ban_at_violation,
            violation_ttl_hours,
            rate_limit_window_ms,
            rate_limit_max_messages,
            duplicate_window_ms,
            whitelist_user_ids,
            bypass_tags,
            mode,
            ban_bot_adders,
            pin_approved_messages,
            database_path,
        })
    }

    pub fn is_whitelisted(&self, user_id: i64) -> bool {
        user_id == self.admin_user_id || self.whitelist_user_ids.contains(&user_id)
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> anyhow::Result<bool> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => bail!("{} must be a boolean, got '{}'", key, other),
        },
        None => Ok(default),
    }
}

/// Comma-separated user ids; non-integers and non-positive values are dropped.
fn parse_user_ids(raw: Option<&str>) -> HashSet<i64> {
    raw.unwrap_or_default()
        .split(',')
        .filter_map(|value| value.trim().parse::<i64>().ok())
        .filter(|value| *value > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([("TOKEN", "123:abc"), ("ADMIN_USER_ID", "500")])
    }

    fn config_from(vars: HashMap<&'static str, &'static str>) -> anyhow::Result<BotConfig> {
        BotConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_are_applied() {
        let config = config_from(base_vars()).unwrap();

        assert_eq!(config.warning_at_violation, 2);
        assert_eq!(config.ban_at_violation, 3);
        assert_eq!(config.violation_ttl_hours, 336);
        assert_eq!(config.rate_limit_window_ms, 10_000);
        assert_eq!(config.rate_limit_max_messages, 3);
        assert_eq!(config.mode, ModerationMode::Enforce);
        assert!(config.ban_bot_adders);
        assert!(!config.pin_approved_messages);
        assert!(config.bypass_tags.contains("оффтоп"));
    }

    #[test]
    fn missing_token_is_fatal() {
        let mut vars = base_vars();
        vars.remove("TOKEN");
        assert!(config_from(vars).is_err());
    }

    #[test]
    fn non_positive_admin_is_fatal() {
        let mut vars = base_vars();
        vars.insert("ADMIN_USER_ID", "0");
        assert!(config_from(vars).is_err());
    }

    #[test]
    fn ban_threshold_must_exceed_warning_threshold() {
        let mut vars = base_vars();
        vars.insert("WARNING_AT_VIOLATION", "3");
        vars.insert("BAN_AT_VIOLATION", "3");
        assert!(config_from(vars).is_err());
    }

    #[test]
    fn zero_rate_limit_window_is_fatal() {
        let mut vars = base_vars();
        vars.insert("RATE_LIMIT_WINDOW_MS", "0");
        assert!(config_from(vars).is_err());
    }

    #[test]
    fn unknown_mode_is_fatal() {
        let mut vars = base_vars();
        vars.insert("MODERATION_MODE", "yolo");
        assert!(config_from(vars).is_err());
    }

    #[test]
    fn whitelist_parses_and_always_includes_admin() {
        let mut vars = base_vars();
        vars.insert("WHITELIST_USER_IDS", "10, 20,junk,-5,30");
        let config = config_from(vars).unwrap();

        assert!(config.is_whitelisted(10));
        assert!(config.is_whitelisted(20));
        assert!(config.is_whitelisted(30));
        assert!(config.is_whitelisted(500));
        assert!(!config.is_whitelisted(-5));
        assert!(!config.is_whitelisted(40));
    }

    #[test]
    fn bypass_tags_are_normalized() {
        let mut vars = base_vars();
        vars.insert("BYPASS_TAGS", "#Оффтоп, ВОПРОС ,");
        let config = config_from(vars).unwrap();

        assert!(config.bypass_tags.contains("оффтоп"));
        assert!(config.bypass_tags.contains("вопрос"));
        assert_eq!(config.bypass_tags.len(), 2);
    }
}
