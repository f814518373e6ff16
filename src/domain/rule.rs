//! Limit rules: configured budgets over time or visit counts.

use crate::domain::host::{HostPattern, PatternError};
use crate::domain::period::{CalendarDay, WeekStart};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a limit rule, assigned by the rule store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u32);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a rule's threshold measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitKind {
    /// Seconds of focused time per calendar day.
    Daily,
    /// Seconds of focused time per calendar week.
    Weekly,
    /// Number of visits per calendar day.
    Visit,
}

impl LimitKind {
    /// Whether this kind of rule may be extended by a user-requested delay.
    ///
    /// All three kinds are currently delay-eligible; the predicate exists so
    /// that `allow_delay` on the rule stays the single configuration gate.
    pub fn delay_eligible(&self) -> bool {
        matches!(self, LimitKind::Daily | LimitKind::Weekly | LimitKind::Visit)
    }

    /// The first day of the enforcement period containing `day`.
    ///
    /// Daily and visit budgets reset each day; weekly budgets reset at the
    /// injected week start. Enforcement state compares these stamps to detect
    /// boundary rollover.
    pub fn period_start(&self, day: CalendarDay, week_start: WeekStart) -> CalendarDay {
        match self {
            LimitKind::Daily | LimitKind::Visit => day,
            LimitKind::Weekly => week_start.week_start_of(day),
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Daily => f.write_str("daily"),
            LimitKind::Weekly => f.write_str("weekly"),
            LimitKind::Visit => f.write_str("visit"),
        }
    }
}

/// Error returned when a rule fails validation at configuration write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Threshold must be at least 1 second (or 1 visit).
    ZeroThreshold,
    /// A rule that allows delays must grant a non-zero number of minutes.
    ZeroDelay,
    /// The host pattern was malformed.
    BadPattern(PatternError),
    /// The referenced rule does not exist in the store.
    UnknownRule(RuleId),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::ZeroThreshold => write!(f, "limit threshold must be greater than 0"),
            RuleError::ZeroDelay => {
                write!(f, "delay-enabled rules must grant at least 1 minute")
            }
            RuleError::BadPattern(e) => write!(f, "invalid host pattern: {e}"),
            RuleError::UnknownRule(id) => write!(f, "no rule with id {id}"),
        }
    }
}

impl std::error::Error for RuleError {}

impl From<PatternError> for RuleError {
    fn from(e: PatternError) -> Self {
        RuleError::BadPattern(e)
    }
}

/// A configured usage budget for hosts matching a pattern.
///
/// `Daily`/`Weekly` thresholds are seconds of focused time over their window;
/// `Visit` thresholds are a visit count within the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRule {
    /// Store-assigned identifier. Drafts carry a placeholder until added.
    pub id: RuleId,
    /// Which hosts the budget applies to.
    pub pattern: HostPattern,
    /// What the threshold measures.
    pub kind: LimitKind,
    /// Budget in seconds (time kinds) or visits (visit kind).
    pub threshold: u64,
    /// Whether the user may request extra time once blocked.
    pub allow_delay: bool,
    /// Minutes granted per successful delay request.
    pub delay_minutes: u32,
    /// Disabled rules are kept but never evaluated.
    pub enabled: bool,
}

impl LimitRule {
    /// Create a draft rule. The id is assigned when the draft is added to a
    /// [`crate::application::rules::RuleStore`].
    pub fn draft(pattern: HostPattern, kind: LimitKind, threshold: u64) -> Self {
        Self {
            id: RuleId(0),
            pattern,
            kind,
            threshold,
            allow_delay: false,
            delay_minutes: 0,
            enabled: true,
        }
    }

    /// Allow delay requests granting `minutes` extra minutes.
    pub fn with_delay(mut self, minutes: u32) -> Self {
        self.allow_delay = true;
        self.delay_minutes = minutes;
        self
    }

    /// Mark the rule disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Validate the rule's configuration.
    ///
    /// # Errors
    /// Returns `RuleError` for a zero threshold or a delay-enabled rule with
    /// zero delay minutes.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.threshold == 0 {
            return Err(RuleError::ZeroThreshold);
        }
        if self.allow_delay && self.delay_minutes == 0 {
            return Err(RuleError::ZeroDelay);
        }
        Ok(())
    }
}
