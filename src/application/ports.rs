//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the
//! application layer needs. Infrastructure adapters implement these ports:
//! the system clock, the extension's storage area, the verification challenge
//! UI, and the message channel to the presentation layer.

use crate::domain::host::CanonicalHost;
use crate::domain::merge::MergeRule;
use crate::domain::period::CalendarDay;
use crate::domain::rule::{LimitRule, RuleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// Port for obtaining current time.
///
/// Enforcement windows are civil calendar periods, so the clock yields wall
/// time rather than a monotonic instant. Infrastructure provides concrete
/// implementations (`SystemClock`, `MockClock`).
pub trait Clock: Send + Sync + Debug {
    /// Get the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// One persisted accumulation record: the usage of a host on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Canonical aggregation host.
    pub host: CanonicalHost,
    /// The day the usage happened on.
    pub day: CalendarDay,
    /// Seconds the host's pages held focus.
    pub focused_seconds: u64,
    /// Number of visits.
    pub visits: u64,
}

/// An additive increment to a ledger entry.
///
/// Deltas carry a producer id (random per ledger instance) and a sequence id
/// unique within that producer, so that a store shared by several contexts
/// can deduplicate replays without ever confusing two producers' deltas:
/// delivery is at-least-once, application must be at-most-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    /// Identifies the ledger instance that produced this delta.
    pub producer: u64,
    /// Sequence id, unique within the producer.
    pub seq: u64,
    /// Canonical aggregation host.
    pub host: CanonicalHost,
    /// The day the usage happened on.
    pub day: CalendarDay,
    /// Seconds to add.
    pub seconds: u64,
    /// Visits to add (0 or 1 per recording call).
    pub visits: u64,
}

/// Error raised by a storage adapter that is currently unable to persist.
///
/// Always transient from the engine's point of view: callers buffer and
/// retry, and the failure never surfaces into the enforcement flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    message: String,
}

impl StorageError {
    /// Create a storage error with a human-readable cause.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage unavailable: {}", self.message)
    }
}

impl std::error::Error for StorageError {}

/// Port for persisting ledger state.
///
/// Backed by the extension's shared storage area in production; multiple
/// contexts write deltas concurrently, so the store must merge additively
/// (atomic increment semantics), never overwrite last-write-wins.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Apply one additive delta. Must deduplicate by the
    /// `(delta.producer, delta.seq)` pair so that a retried delivery is
    /// applied at most once; the bare sequence id is not unique across
    /// contexts.
    async fn save_delta(&self, delta: &LedgerDelta) -> Result<(), StorageError>;

    /// Load all persisted entries, e.g. at context start-up.
    async fn load(&self) -> Result<Vec<LedgerEntry>, StorageError>;
}

/// Port for persisting configuration: limit rules and merge rules.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load all configured limit rules.
    async fn load_rules(&self) -> Result<Vec<LimitRule>, StorageError>;

    /// Save (insert or replace by id) one limit rule.
    async fn save_rule(&self, rule: &LimitRule) -> Result<(), StorageError>;

    /// Load all configured merge rules, in registration order.
    async fn load_merge_rules(&self) -> Result<Vec<MergeRule>, StorageError>;

    /// Append or replace one merge rule.
    async fn save_merge_rule(&self, rule: &MergeRule) -> Result<(), StorageError>;
}

/// Outcome of a completed verification challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The user passed the challenge.
    Passed,
    /// The user failed or abandoned the challenge.
    Failed,
}

/// Error raised when the verification gate itself breaks.
///
/// Controllers treat this exactly like [`VerificationOutcome::Failed`]:
/// verification is fail-closed, a broken gate never grants extra time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateError {
    message: String,
}

impl GateError {
    /// Create a gate error with a human-readable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verification gate failed: {}", self.message)
    }
}

impl std::error::Error for GateError {}

/// Port for the external verification challenge.
///
/// The challenge UI is an opaque async collaborator; the engine only needs
/// to know whether a rule requires verification and whether the user passed.
#[async_trait]
pub trait VerificationGate: Send + Sync {
    /// Whether a delay request for this rule must pass verification first.
    fn is_required(&self, rule: &LimitRule) -> bool;

    /// Run the challenge. A cancelled or abandoned prompt resolves to
    /// [`VerificationOutcome::Failed`], not an error.
    async fn verify(&self, rule: &LimitRule) -> Result<VerificationOutcome, GateError>;
}

/// Action emitted towards the presentation layer on a state transition.
///
/// Exactly one action is emitted per transition; re-evaluations that keep the
/// same state emit nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementAction {
    /// The budget is nearly used up; surface a warning.
    ShowWarning {
        /// Host the warning applies to.
        host: CanonicalHost,
        /// Rule that is close to its threshold.
        rule_id: RuleId,
        /// Budget left in the rule's unit.
        remaining: u64,
    },
    /// The budget is exhausted; cover the page.
    ShowBlockOverlay {
        /// Host being blocked.
        host: CanonicalHost,
        /// Rule that tripped.
        rule_id: RuleId,
    },
    /// The block or warning no longer applies; uncover the page.
    HideOverlay {
        /// Host being released.
        host: CanonicalHost,
        /// Rule that was released.
        rule_id: RuleId,
    },
    /// A delay request was granted; let the user continue for a while.
    GrantDelay {
        /// Host the delay applies to.
        host: CanonicalHost,
        /// Rule being delayed.
        rule_id: RuleId,
        /// Minutes granted.
        minutes: u32,
    },
}

/// Port for delivering actions to the presentation layer.
///
/// Fire-and-forget: the engine never waits on delivery and never learns
/// whether it succeeded.
pub trait ActionSink: Send + Sync {
    /// Deliver one action.
    fn send(&self, action: EnforcementAction);
}
