// The escalation ladder as a pure function.
//
// Deliberately free of storage and transport so the whole warn/ban mapping
// can be tested as integers in, decisions out. Configuration validation
// guarantees ban_at_violation > warning_at_violation > 0 before this is
// ever called.

use super::moderation_models::ModerationDecision;

/// Map a violation count onto the warn/ban ladder.
///
/// The warning fires exactly once, on the count that equals the threshold.
/// The ban is sticky: every count at or above the ban threshold bans again
/// until the ledger is reset.
pub fn decide_moderation_action(
    violation_count: u32,
    warning_at_violation: u32,
    ban_at_violation: u32,
) -> ModerationDecision {
    ModerationDecision {
        should_warn: violation_count == warning_at_violation,
        should_ban: violation_count >= ban_at_violation,
    }
}
