// Process-local suppression gates: message frequency and exact-content
// repeats, both keyed by (chat_id, user_id).
//
// These are explicitly constructed components with an injected clock, not
// ambient globals, so they can be unit tested deterministically. State is
// ephemeral: a restart only relaxes enforcement temporarily.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Sliding-window message counter. `hit` returns true when the message
/// should be suppressed as rate-limited.
pub struct RateGate {
    window: Duration,
    max_messages: usize,
    buckets: DashMap<(i64, i64), Vec<DateTime<Utc>>>,
}

impl RateGate {
    pub fn new(window_ms: u64, max_messages: u32) -> Self {
        Self {
            window: Duration::milliseconds(window_ms as i64),
            max_messages: max_messages as usize,
            buckets: DashMap::new(),
        }
    }

    /// Record an arrival at `now` and report whether it breaches the limit.
    ///
    /// A limited arrival is not appended, so a burst does not keep
    /// inflating the bucket. Only timestamps strictly older than the window
    /// are dropped; one exactly `window` old still counts.
    pub fn hit(&self, chat_id: i64, user_id: i64, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut bucket = self.buckets.entry((chat_id, user_id)).or_default();
        bucket.retain(|t| *t >= cutoff);

        if bucket.len() >= self.max_messages {
            return true;
        }

        bucket.push(now);
        false
    }

    /// Drop timestamps outside the window and forget empty buckets.
    pub fn prune(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.buckets.retain(|_, bucket| {
            bucket.retain(|t| *t >= cutoff);
            !bucket.is_empty()
        });
    }
}

/// Single-slot last-seen-content cache. `check` returns true when the
/// message repeats the previous one within the window.
pub struct DuplicateGate {
    window: Duration,
    entries: DashMap<(i64, i64), (u64, DateTime<Utc>)>,
}

impl DuplicateGate {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window: Duration::milliseconds(window_ms as i64),
            entries: DashMap::new(),
        }
    }

    fn hash_content(normalized: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        normalized.hash(&mut hasher);
        hasher.finish()
    }

    /// Compare `normalized_text` against the last entry for the key, then
    /// overwrite the entry. Empty normalized text is never a duplicate.
    pub fn check(&self, chat_id: i64, user_id: i64, normalized_text: &str, now: DateTime<Utc>) -> bool {
        let key = (chat_id, user_id);
        let hash = Self::hash_content(normalized_text);

        let is_duplicate = !normalized_text.is_empty()
            && self
                .entries
                .get(&key)
                .map(|entry| {
                    let (stored_hash, stored_at) = *entry;
                    stored_hash == hash && now - stored_at <= self.window
                })
                .unwrap_or(false);

        self.entries.insert(key, (hash, now));
        is_duplicate
    }

    /// Forget entries whose window has elapsed.
    pub fn prune(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, (_, stored_at)| now - *stored_at <= self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn rate_gate_allows_up_to_max_in_window() {
        let gate = RateGate::new(10_000, 3);

        assert!(!gate.hit(-100, 7, at(0)));
        assert!(!gate.hit(-100, 7, at(1)));
        assert!(!gate.hit(-100, 7, at(2)));
        assert!(gate.hit(-100, 7, at(3)));
    }

    #[test]
    fn rate_gate_recovers_after_window_elapses() {
        let gate = RateGate::new(10_000, 3);

        for t in 0..3 {
            assert!(!gate.hit(-100, 7, at(t)));
        }
        assert!(gate.hit(-100, 7, at(3)));
        assert!(!gate.hit(-100, 7, at(10_001)));
    }

    #[test]
    fn rate_gate_keeps_timestamp_exactly_window_old() {
        let gate = RateGate::new(10_000, 1);

        assert!(!gate.hit(-100, 7, at(0)));
        // t=0 is exactly window old at t=10000 and still counts
        assert!(gate.hit(-100, 7, at(10_000)));
        // One tick later it ages out
        assert!(!gate.hit(-100, 7, at(10_001)));
    }

    #[test]
    fn rate_gate_keys_are_independent() {
        let gate = RateGate::new(10_000, 1);

        assert!(!gate.hit(-100, 7, at(0)));
        assert!(!gate.hit(-100, 8, at(0)));
        assert!(!gate.hit(-200, 7, at(0)));
        assert!(gate.hit(-100, 7, at(1)));
    }

    #[test]
    fn rate_gate_prune_frees_dormant_buckets() {
        let gate = RateGate::new(10_000, 3);
        gate.hit(-100, 7, at(0));
        gate.prune(at(20_000));
        assert!(gate.buckets.is_empty());
    }

    #[test]
    fn duplicate_gate_flags_repeat_within_window() {
        let gate = DuplicateGate::new(30_000);

        assert!(!gate.check(-100, 7, "привет мир", at(0)));
        assert!(gate.check(-100, 7, "привет мир", at(1_000)));
    }

    #[test]
    fn duplicate_gate_forgets_after_window() {
        let gate = DuplicateGate::new(30_000);

        assert!(!gate.check(-100, 7, "привет мир", at(0)));
        assert!(!gate.check(-100, 7, "привет мир", at(30_001)));
    }

    #[test]
    fn duplicate_gate_resets_on_different_content() {
        let gate = DuplicateGate::new(30_000);

        assert!(!gate.check(-100, 7, "первое", at(0)));
        assert!(!gate.check(-100, 7, "второе", at(1)));
        // The slot now holds "второе", so "первое" is fresh again
        assert!(!gate.check(-100, 7, "первое", at(2)));
        assert!(gate.check(-100, 7, "первое", at(3)));
    }

    #[test]
    fn duplicate_gate_never_flags_empty_text() {
        let gate = DuplicateGate::new(30_000);

        assert!(!gate.check(-100, 7, "", at(0)));
        assert!(!gate.check(-100, 7, "", at(1)));
    }

    #[test]
    fn duplicate_gate_prune_drops_stale_entries() {
        let gate = DuplicateGate::new(30_000);
        gate.check(-100, 7, "привет", at(0));
        gate.prune(at(60_000));
        assert!(gate.entries.is_empty());
    }
}
