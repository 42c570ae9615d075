// Text rules for the required-tag format: tag matching, hashtag extraction,
// duplicate normalization and the small helpers the warning notices need.

use std::collections::HashSet;

/// Case-insensitive containment check for the required tag.
pub fn has_required_tag(text: &str, required_tag: &str) -> bool {
    if required_tag.is_empty() {
        return true;
    }
    text.to_lowercase().contains(&required_tag.to_lowercase())
}

/// Pull `#`-prefixed tokens (letters, digits, underscore) out of a message.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '#' {
            continue;
        }
        let mut tag = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                tag.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if !tag.is_empty() {
            tags.push(tag);
        }
    }

    tags
}

/// True when the message carries a recognized bypass hashtag.
pub fn has_bypass_tag(text: &str, bypass_tags: &HashSet<String>) -> bool {
    if text.is_empty() {
        return false;
    }
    extract_hashtags(text)
        .iter()
        .any(|tag| bypass_tags.contains(&tag.to_lowercase()))
}

/// Normalization for duplicate detection: lowercase, collapse whitespace
/// runs to single spaces, trim.
pub fn normalize_for_duplicate(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape the characters Telegram's HTML parse mode cares about.
pub fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Display name for a participant: full name, then username, then a
/// generic fallback.
pub fn participant_name(
    first_name: Option<&str>,
    last_name: Option<&str>,
    username: Option<&str>,
) -> String {
    let full_name = [first_name, last_name]
        .iter()
        .filter_map(|part| *part)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();

    if !full_name.is_empty() {
        return full_name;
    }
    if let Some(username) = username {
        if !username.is_empty() {
            return username.to_string();
        }
    }
    "Участник".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bypass_set(tags: &[&str]) -> HashSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn required_tag_is_case_insensitive() {
        assert!(has_required_tag("Встреча в 19:00 #Анонс", "#анонс"));
        assert!(has_required_tag("#АНОНС завтра", "#анонс"));
        assert!(!has_required_tag("встреча завтра", "#анонс"));
    }

    #[test]
    fn extracts_unicode_hashtags() {
        let tags = extract_hashtags("привет #оффтоп и #tag_2, конец#хвост");
        assert_eq!(tags, vec!["оффтоп", "tag_2", "хвост"]);
    }

    #[test]
    fn bare_hash_is_not_a_tag() {
        assert!(extract_hashtags("# пусто # #").is_empty());
    }

    #[test]
    fn bypass_tag_matches_case_insensitively() {
        let tags = bypass_set(&["оффтоп"]);
        assert!(has_bypass_tag("сегодня #Оффтоп", &tags));
        assert!(!has_bypass_tag("сегодня без тегов", &tags));
        assert!(!has_bypass_tag("", &tags));
    }

    #[test]
    fn normalization_collapses_whitespace() {
        assert_eq!(
            normalize_for_duplicate("  Привет\n\t МИР  "),
            "привет мир"
        );
        assert_eq!(normalize_for_duplicate("   "), "");
    }

    #[test]
    fn escapes_html_entities() {
        assert_eq!(escape_html("a & <b>"), "a &amp; &lt;b&gt;");
    }

    #[test]
    fn participant_name_fallbacks() {
        assert_eq!(
            participant_name(Some("Иван"), Some("Петров"), Some("ivan")),
            "Иван Петров"
        );
        assert_eq!(participant_name(None, None, Some("ivan")), "ivan");
        assert_eq!(participant_name(None, None, None), "Участник");
    }
}
