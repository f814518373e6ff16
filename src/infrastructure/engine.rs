//! The assembled enforcement engine and its builder.
//!
//! [`LimitEngine`] wires the normalizer, ledger, rule store, evaluator, and
//! controller together behind one facade with sensible defaults: system
//! clock, in-memory stores, no verification, log-only action sink. Collaborators
//! replace the pieces they integrate with through the builder.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use webtime_limit::{HostPattern, LimitEngine, LimitKind, LimitRule};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = LimitEngine::builder().build().unwrap();
//!
//! // One hour of daily budget for example.com and its subdomains.
//! let pattern = HostPattern::parse("*.example.com").unwrap();
//! let rule = LimitRule::draft(pattern, LimitKind::Daily, 3600).with_delay(5);
//! let rule_id = engine.rules().add(rule).unwrap();
//!
//! // The activity tracker feeds ticks; the engine drives enforcement.
//! engine.record("video.example.com", 60, true).await;
//! let state = engine.current_state("video.example.com", rule_id);
//! # let _ = state;
//! # }
//! ```

use crate::application::controller::{
    ControllerConfig, ControllerConfigError, DelayOutcome, EnforcementController, EnforcementState,
};
use crate::application::evaluator::LimitEvaluator;
use crate::application::ledger::UsageLedger;
use crate::application::normalizer::HostNormalizer;
use crate::application::ports::{
    ActionSink, Clock, ConfigStore, GateError, LedgerStore, StorageError, VerificationGate,
    VerificationOutcome,
};
use crate::application::rules::RuleStore;
use crate::domain::merge::MatchPolicy;
use crate::domain::period::WeekStart;
use crate::domain::rule::{LimitRule, RuleId};
use crate::domain::verdict::Verdict;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::sink::LogSink;
use crate::infrastructure::store::MemoryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Gate used when no verification collaborator is configured: nothing ever
/// requires verification, so eligible delay requests are granted directly.
#[derive(Debug, Clone, Copy, Default)]
struct NoVerification;

#[async_trait]
impl VerificationGate for NoVerification {
    fn is_required(&self, _rule: &LimitRule) -> bool {
        false
    }

    async fn verify(&self, _rule: &LimitRule) -> Result<VerificationOutcome, GateError> {
        Ok(VerificationOutcome::Passed)
    }
}

/// Builder for [`LimitEngine`].
pub struct LimitEngineBuilder {
    clock: Arc<dyn Clock>,
    ledger_store: Arc<dyn LedgerStore>,
    config_store: Arc<dyn ConfigStore>,
    gate: Arc<dyn VerificationGate>,
    sink: Arc<dyn ActionSink>,
    week_start: WeekStart,
    match_policy: MatchPolicy,
    controller_config: ControllerConfig,
}

impl Default for LimitEngineBuilder {
    fn default() -> Self {
        let memory = Arc::new(MemoryStore::new());
        Self {
            clock: Arc::new(SystemClock::new()),
            ledger_store: memory.clone(),
            config_store: memory,
            gate: Arc::new(NoVerification),
            sink: Arc::new(LogSink::new()),
            week_start: WeekStart::default(),
            match_policy: MatchPolicy::default(),
            controller_config: ControllerConfig::default(),
        }
    }
}

impl LimitEngineBuilder {
    /// Override the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the ledger persistence backend.
    pub fn with_ledger_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.ledger_store = store;
        self
    }

    /// Override the configuration persistence backend.
    pub fn with_config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = store;
        self
    }

    /// Wire up the verification challenge collaborator.
    pub fn with_gate(mut self, gate: Arc<dyn VerificationGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Wire up the presentation-layer action channel.
    pub fn with_sink(mut self, sink: Arc<dyn ActionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Set the configured first day of the week (affects weekly budgets).
    pub fn with_week_start(mut self, week_start: WeekStart) -> Self {
        self.week_start = week_start;
        self
    }

    /// Set the merge-rule tie-break policy.
    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    /// Set controller behavior (warning stage, verification timeout).
    pub fn with_controller_config(mut self, config: ControllerConfig) -> Self {
        self.controller_config = config;
        self
    }

    /// Assemble the engine.
    ///
    /// # Errors
    /// Returns `ControllerConfigError` when the controller configuration is
    /// invalid (validated here because configs may be built from raw,
    /// user-supplied option values).
    pub fn build(self) -> Result<LimitEngine, ControllerConfigError> {
        if let Some(fraction) = self.controller_config.warning_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(ControllerConfigError::WarningFractionOutOfRange(fraction));
            }
        }
        if self.controller_config.verification_timeout.is_zero() {
            return Err(ControllerConfigError::ZeroVerificationTimeout);
        }

        let normalizer = Arc::new(HostNormalizer::with_policy(self.match_policy));
        let rules = Arc::new(RuleStore::new());
        let ledger = Arc::new(UsageLedger::new(normalizer.clone(), self.ledger_store));
        let evaluator = Arc::new(LimitEvaluator::new(
            ledger.clone(),
            rules.clone(),
            normalizer.clone(),
            self.week_start,
        ));
        let controller = Arc::new(EnforcementController::new(
            evaluator.clone(),
            rules.clone(),
            normalizer.clone(),
            self.clock.clone(),
            self.gate,
            self.sink,
            self.controller_config,
        ));

        Ok(LimitEngine {
            clock: self.clock,
            config_store: self.config_store,
            normalizer,
            rules,
            ledger,
            evaluator,
            controller,
        })
    }
}

/// The usage-limit enforcement engine.
///
/// One engine instance belongs to one execution context (content script,
/// background worker); state cells are session-local, while the ledger and
/// configuration stores are the shared system of record.
pub struct LimitEngine {
    clock: Arc<dyn Clock>,
    config_store: Arc<dyn ConfigStore>,
    normalizer: Arc<HostNormalizer>,
    rules: Arc<RuleStore>,
    ledger: Arc<UsageLedger>,
    evaluator: Arc<LimitEvaluator>,
    controller: Arc<EnforcementController>,
}

impl LimitEngine {
    /// Start building an engine.
    pub fn builder() -> LimitEngineBuilder {
        LimitEngineBuilder::default()
    }

    /// Record page activity at the current time and re-evaluate enforcement.
    ///
    /// This is the main inbound path from the activity tracker: every tick
    /// both accounts the time and drives the state machine, so transitions
    /// happen as soon as a budget is crossed.
    pub async fn record(&self, raw_host: &str, active_seconds: u64, is_new_visit: bool) {
        let now = self.clock.now();
        self.record_at(raw_host, active_seconds, is_new_visit, now).await;
    }

    /// Record page activity at an explicit timestamp and re-evaluate.
    pub async fn record_at(
        &self,
        raw_host: &str,
        active_seconds: u64,
        is_new_visit: bool,
        when: DateTime<Utc>,
    ) {
        self.ledger
            .record(raw_host, active_seconds, is_new_visit, when)
            .await;
        self.controller.tick(raw_host, when);
    }

    /// Evaluate all applicable rules for a host at the current time.
    pub fn evaluate(&self, raw_host: &str) -> Vec<Verdict> {
        self.evaluator.evaluate(raw_host, self.clock.now())
    }

    /// Evaluate at an explicit timestamp.
    pub fn evaluate_at(&self, raw_host: &str, now: DateTime<Utc>) -> Vec<Verdict> {
        self.evaluator.evaluate(raw_host, now)
    }

    /// Re-evaluate enforcement for a host without recording activity.
    ///
    /// Inbound trigger for on-demand evaluation requests (e.g. a tab gaining
    /// focus) and for periodic ticks that notice boundary rollovers and
    /// delay expiry.
    pub fn request_evaluate(&self, raw_host: &str) {
        self.controller.tick(raw_host, self.clock.now());
    }

    /// Handle a user request for extra time on a blocked rule.
    pub async fn request_delay(&self, raw_host: &str, rule_id: RuleId) -> DelayOutcome {
        self.controller.request_delay(raw_host, rule_id).await
    }

    /// Current enforcement state of a (host, rule) pair.
    pub fn current_state(&self, raw_host: &str, rule_id: RuleId) -> EnforcementState {
        self.controller.current_state(raw_host, rule_id)
    }

    /// Load merge rules, limit rules, and ledger entries from the stores.
    ///
    /// # Errors
    /// Returns `StorageError` when a store is unavailable; whatever loaded
    /// before the failure is kept.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        self.normalizer.hydrate(self.config_store.as_ref()).await?;
        self.rules.hydrate(self.config_store.as_ref()).await?;
        self.ledger.hydrate().await
    }

    /// Retry persistence of any buffered ledger deltas.
    pub async fn flush(&self) {
        self.ledger.flush_pending().await;
    }

    /// The configured merge-rule set.
    pub fn normalizer(&self) -> &HostNormalizer {
        &self.normalizer
    }

    /// The configured limit rules.
    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// The usage ledger.
    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// The configuration store the engine persists into.
    pub fn config_store(&self) -> &dyn ConfigStore {
        self.config_store.as_ref()
    }
}
