//! # webtime-limit
//!
//! Usage-limit enforcement engine for web time tracking: per-host time and
//! visit budgets, merge rules for host aggregation, and a stateful,
//! delay-able, verification-gated blocking flow.
//!
//! The engine is the decision core of a self-limiting tool: an activity
//! tracker feeds it focused-time ticks per raw page host; the engine
//! canonicalizes hosts through configurable merge rules, accounts usage per
//! calendar day, evaluates configured budgets (daily seconds, weekly
//! seconds, daily visits), and drives a per-(host, rule) state machine
//! (`Idle -> Warned -> Blocked -> Delayed`) whose transitions are emitted as
//! actions for a presentation layer to render.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webtime_limit::{HostPattern, LimitEngine, LimitKind, LimitRule};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = LimitEngine::builder().build().unwrap();
//!
//! // Merge all subdomains of example.com into one aggregation host.
//! engine.normalizer().add_rule(webtime_limit::MergeRule::new(
//!     HostPattern::parse("*.example.com").unwrap(),
//!     "example.com",
//! ));
//!
//! // One hour of focused time per day, delayable by 5 minutes at a time.
//! let rule = LimitRule::draft(
//!     HostPattern::parse("example.com").unwrap(),
//!     LimitKind::Daily,
//!     3600,
//! )
//! .with_delay(5);
//! let rule_id = engine.rules().add(rule).unwrap();
//!
//! // The tracker reports a minute of activity on a subdomain.
//! engine.record("video.example.com", 60, true).await;
//!
//! // Once the budget is exhausted, the pair is blocked; the user may ask
//! // for extra time, which passes through the verification gate.
//! let outcome = engine.request_delay("video.example.com", rule_id).await;
//! # let _ = outcome;
//! # }
//! ```
//!
//! ## Architecture
//!
//! Hexagonal layering:
//!
//! - [`domain`] - pure types and invariants: host patterns, merge
//!   resolution, calendar periods, limit rules, verdicts.
//! - [`application`] - orchestration: the normalizer, ledger, rule store,
//!   evaluator, and enforcement controller, plus the ports they need.
//! - [`infrastructure`] - adapters: system clock, in-memory document store,
//!   log sink, the [`LimitEngine`] facade, and test mocks.
//!
//! Components receive their collaborators explicitly (constructor
//! injection); there is no ambient context. The persisted ledger and rule
//! store are the only state shared across execution contexts, and ledger
//! writes are additive deltas, so concurrent contexts never lose updates.
//!
//! ## Failure posture
//!
//! Enforcement fails closed, accounting fails open:
//!
//! - A broken, timed-out, or abandoned verification challenge never grants
//!   extra time; the pair stays blocked.
//! - An unavailable storage backend never breaks activity tracking; deltas
//!   are buffered and retried, and replays are deduplicated by sequence id
//!   so nothing is double counted.
//! - Anomalous clocks (negative elapsed time) are clamped and logged, never
//!   subtracted.
//! - No failure can pin a host in `Blocked`: every rule's state resets at
//!   its calendar boundary.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    host::{CanonicalHost, HostGroup, HostPattern, PatternError},
    merge::{MatchPolicy, MergeRule},
    period::{CalendarDay, WeekStart},
    rule::{LimitKind, LimitRule, RuleError, RuleId},
    verdict::Verdict,
};

pub use application::{
    controller::{
        ControllerConfig, ControllerConfigError, DelayOutcome, EnforcementController,
        EnforcementState,
    },
    evaluator::LimitEvaluator,
    ledger::UsageLedger,
    normalizer::HostNormalizer,
    ports::{
        ActionSink, Clock, ConfigStore, EnforcementAction, GateError, LedgerDelta, LedgerEntry,
        LedgerStore, StorageError, VerificationGate, VerificationOutcome,
    },
    rules::RuleStore,
};

pub use infrastructure::{
    clock::SystemClock,
    engine::{LimitEngine, LimitEngineBuilder},
    sink::LogSink,
    store::MemoryStore,
};
