//! Limit evaluator: turns ledger state and rules into verdicts.
//!
//! Evaluation is pure given the ledger and rule snapshots: no mutation, no
//! suspension. It runs synchronously over the in-memory ledger, so it is safe
//! to call on every recorded tick.

use crate::application::ledger::UsageLedger;
use crate::application::normalizer::HostNormalizer;
use crate::application::rules::RuleStore;
use crate::domain::period::{CalendarDay, WeekStart};
use crate::domain::rule::LimitKind;
use crate::domain::verdict::Verdict;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Computes the enforcement verdict for a host at a point in time.
pub struct LimitEvaluator {
    ledger: Arc<UsageLedger>,
    rules: Arc<RuleStore>,
    normalizer: Arc<HostNormalizer>,
    week_start: WeekStart,
}

impl LimitEvaluator {
    /// Create an evaluator over the given ledger and rules.
    ///
    /// `week_start` is injected because it decides weekly boundary
    /// correctness; it must match the user's configured first day of week.
    pub fn new(
        ledger: Arc<UsageLedger>,
        rules: Arc<RuleStore>,
        normalizer: Arc<HostNormalizer>,
        week_start: WeekStart,
    ) -> Self {
        Self {
            ledger,
            rules,
            normalizer,
            week_start,
        }
    }

    /// The injected week start.
    pub fn week_start(&self) -> WeekStart {
        self.week_start
    }

    /// Evaluate every applicable rule for `raw_host` at `now`.
    ///
    /// Returns one verdict per enabled matching rule, in the rule store's
    /// match order. An empty result means the host is unlimited.
    pub fn evaluate(&self, raw_host: &str, now: DateTime<Utc>) -> Vec<Verdict> {
        let host = self.normalizer.normalize(raw_host);
        let today = CalendarDay::of(now);

        self.rules
            .rules_for(&host)
            .into_iter()
            .map(|rule| {
                let consumed = match rule.kind {
                    LimitKind::Daily => {
                        self.ledger.focused_seconds_in_range(&host, today, today)
                    }
                    LimitKind::Weekly => {
                        let (start, end) = self.week_start.week_to_date(today);
                        self.ledger.focused_seconds_in_range(&host, start, end)
                    }
                    LimitKind::Visit => self.ledger.visits_on_day(&host, today),
                };
                Verdict::new(rule, consumed)
            })
            .collect()
    }
}
