//! Verdicts: the result of evaluating one rule against current usage.

use crate::domain::rule::LimitRule;

/// Outcome of evaluating a single rule for a host at a point in time.
///
/// Verdicts are ephemeral: recomputed on every evaluation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// The rule that was evaluated (snapshot at evaluation time).
    pub rule: LimitRule,
    /// Consumed amount in the rule's unit (seconds or visits).
    pub consumed: u64,
    /// Whether consumption has reached the threshold.
    pub exceeded: bool,
    /// Budget left, saturating at zero.
    pub remaining: u64,
}

impl Verdict {
    /// Build a verdict from a rule snapshot and its consumed amount.
    pub fn new(rule: LimitRule, consumed: u64) -> Self {
        let exceeded = consumed >= rule.threshold;
        let remaining = rule.threshold.saturating_sub(consumed);
        Self {
            rule,
            consumed,
            exceeded,
            remaining,
        }
    }
}
