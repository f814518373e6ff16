//! Enforcement controller: the state machine that turns verdicts into
//! user-facing actions.
//!
//! One state cell exists per (canonical host, rule id) pair, held only in
//! memory for the lifetime of the browsing session. The machine cycles
//! `Idle -> Warned -> Blocked -> Delayed -> Blocked` and resets to `Idle`
//! whenever the rule's calendar period rolls over, so no failure can leave a
//! host permanently blocked without a boundary escape path.

use crate::application::evaluator::LimitEvaluator;
use crate::application::normalizer::HostNormalizer;
use crate::application::ports::{
    ActionSink, Clock, EnforcementAction, VerificationGate, VerificationOutcome,
};
use crate::application::rules::RuleStore;
use crate::domain::host::CanonicalHost;
use crate::domain::period::CalendarDay;
use crate::domain::rule::{LimitRule, RuleId};
use crate::domain::verdict::Verdict;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Enforcement state of one (host, rule) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnforcementState {
    /// Budget not reached; nothing shown.
    #[default]
    Idle,
    /// Budget nearly reached; warning shown.
    Warned,
    /// Budget exhausted; page covered by the block overlay.
    Blocked,
    /// A delay was granted; the overlay is lifted until it expires.
    Delayed,
}

impl fmt::Display for EnforcementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnforcementState::Idle => f.write_str("idle"),
            EnforcementState::Warned => f.write_str("warned"),
            EnforcementState::Blocked => f.write_str("blocked"),
            EnforcementState::Delayed => f.write_str("delayed"),
        }
    }
}

/// Result of a user-initiated delay request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    /// Delay granted for this many minutes.
    Granted(u32),
    /// Verification failed, timed out, was abandoned, or the gate broke.
    /// The state stays blocked.
    Denied,
    /// The rule does not allow delays.
    NotEligible,
    /// The pair is not currently blocked, so there is nothing to delay.
    NotBlocked,
    /// No rule with that id exists.
    UnknownRule,
}

/// Error returned when controller configuration validation fails.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerConfigError {
    /// The warning fraction must lie in (0, 1].
    WarningFractionOutOfRange(f64),
    /// The verification timeout must be greater than zero.
    ZeroVerificationTimeout,
}

impl fmt::Display for ControllerConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerConfigError::WarningFractionOutOfRange(v) => {
                write!(f, "warning fraction must be in (0, 1], got {v}")
            }
            ControllerConfigError::ZeroVerificationTimeout => {
                write!(f, "verification timeout must be greater than 0")
            }
        }
    }
}

impl std::error::Error for ControllerConfigError {}

/// Configuration for enforcement behavior.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// When set, enter `Warned` once remaining budget drops to this fraction
    /// of the threshold. `None` disables the warning stage entirely.
    pub warning_fraction: Option<f64>,
    /// Upper bound on how long a verification prompt may stay unanswered
    /// before the request resolves to failure.
    pub verification_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            warning_fraction: None,
            verification_timeout: Duration::from_secs(60),
        }
    }
}

impl ControllerConfig {
    /// Create a config with an advance-warning stage.
    ///
    /// # Errors
    /// Returns `ControllerConfigError` when `fraction` is outside (0, 1].
    pub fn with_warning_fraction(fraction: f64) -> Result<Self, ControllerConfigError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ControllerConfigError::WarningFractionOutOfRange(fraction));
        }
        Ok(Self {
            warning_fraction: Some(fraction),
            ..Self::default()
        })
    }

    /// Set the verification timeout.
    ///
    /// # Errors
    /// Returns `ControllerConfigError::ZeroVerificationTimeout` for a zero
    /// duration.
    pub fn with_verification_timeout(
        mut self,
        timeout: Duration,
    ) -> Result<Self, ControllerConfigError> {
        if timeout.is_zero() {
            return Err(ControllerConfigError::ZeroVerificationTimeout);
        }
        self.verification_timeout = timeout;
        Ok(self)
    }
}

/// In-memory state cell for one (host, rule) pair.
#[derive(Debug, Clone, Copy)]
struct Track {
    state: EnforcementState,
    /// First day of the period the state was last evaluated in. A different
    /// stamp on the next evaluation means the boundary rolled over.
    period: CalendarDay,
    /// When a granted delay expires. Only meaningful in `Delayed`.
    delay_until: Option<DateTime<Utc>>,
}

/// Drives enforcement state per (host, rule) pair and emits actions.
pub struct EnforcementController {
    evaluator: Arc<LimitEvaluator>,
    rules: Arc<RuleStore>,
    normalizer: Arc<HostNormalizer>,
    clock: Arc<dyn Clock>,
    gate: Arc<dyn VerificationGate>,
    sink: Arc<dyn ActionSink>,
    config: ControllerConfig,
    /// Guarded by a mutex so evaluations within one context are processed in
    /// call order; transitions are history-dependent.
    tracks: Mutex<HashMap<(CanonicalHost, RuleId), Track>>,
}

impl EnforcementController {
    /// Create a controller.
    pub fn new(
        evaluator: Arc<LimitEvaluator>,
        rules: Arc<RuleStore>,
        normalizer: Arc<HostNormalizer>,
        clock: Arc<dyn Clock>,
        gate: Arc<dyn VerificationGate>,
        sink: Arc<dyn ActionSink>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            evaluator,
            rules,
            normalizer,
            clock,
            gate,
            sink,
            config,
            tracks: Mutex::new(HashMap::new()),
        }
    }

    /// Re-evaluate `raw_host` at `now` and drive all applicable state cells.
    ///
    /// Call on every recorded tick or on demand from the activity tracker.
    /// Emits exactly one action per transition and nothing on a no-op
    /// re-evaluation. State cells whose rule no longer applies (deleted or
    /// disabled since the last tick) are released here, so an overlay never
    /// outlives its rule.
    pub fn tick(&self, raw_host: &str, now: DateTime<Utc>) {
        let verdicts = self.evaluator.evaluate(raw_host, now);
        let host = self.normalizer.normalize(raw_host);

        let mut tracks = self.tracks.lock().unwrap_or_else(|e| e.into_inner());
        for verdict in &verdicts {
            self.drive(&mut tracks, &host, verdict, now);
        }
        self.release_orphans(&mut tracks, &host, &verdicts);
    }

    /// Drop this host's state cells for rules that produced no verdict.
    ///
    /// A non-idle cell gets a releasing transition first; blocked hosts must
    /// not stay covered once their rule is gone.
    fn release_orphans(
        &self,
        tracks: &mut HashMap<(CanonicalHost, RuleId), Track>,
        host: &CanonicalHost,
        verdicts: &[Verdict],
    ) {
        let live: HashSet<RuleId> = verdicts.iter().map(|verdict| verdict.rule.id).collect();
        tracks.retain(|(track_host, rule_id), track| {
            if track_host != host || live.contains(rule_id) {
                return true;
            }
            if track.state != EnforcementState::Idle {
                self.transition(host, *rule_id, track, EnforcementState::Idle);
            }
            false
        });
    }

    /// Current state of a (host, rule) pair. Untracked pairs are `Idle`.
    pub fn current_state(&self, raw_host: &str, rule_id: RuleId) -> EnforcementState {
        let host = self.normalizer.normalize(raw_host);
        self.tracks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(host, rule_id))
            .map(|track| track.state)
            .unwrap_or_default()
    }

    /// Handle an explicit user request for extra time on a blocked rule.
    ///
    /// Only a currently blocked pair whose rule allows delays (and whose
    /// kind is delay-eligible) can be delayed. When the gate requires
    /// verification, anything but a passed challenge within the configured
    /// timeout leaves the state blocked: verification is fail-closed.
    pub async fn request_delay(&self, raw_host: &str, rule_id: RuleId) -> DelayOutcome {
        let Some(rule) = self.rules.get(rule_id) else {
            return DelayOutcome::UnknownRule;
        };
        let host = self.normalizer.normalize(raw_host);

        if !(rule.allow_delay && rule.kind.delay_eligible()) {
            return DelayOutcome::NotEligible;
        }
        if self.state_of(&host, rule_id) != EnforcementState::Blocked {
            return DelayOutcome::NotBlocked;
        }

        if self.gate.is_required(&rule) && !self.pass_verification(&rule).await {
            debug!(host = %host, rule = %rule_id, "delay denied, staying blocked");
            return DelayOutcome::Denied;
        }

        // The gate may have suspended for a while; only grant if the pair is
        // still blocked (the period could have rolled over meanwhile), and
        // stamp the expiry from the post-challenge clock so a slow challenge
        // does not eat into the granted minutes.
        let now = self.clock.now();
        let mut tracks = self.tracks.lock().unwrap_or_else(|e| e.into_inner());
        let Some(track) = tracks.get_mut(&(host.clone(), rule_id)) else {
            return DelayOutcome::NotBlocked;
        };
        if track.state != EnforcementState::Blocked {
            return DelayOutcome::NotBlocked;
        }

        track.state = EnforcementState::Delayed;
        track.delay_until = Some(now + ChronoDuration::minutes(i64::from(rule.delay_minutes)));
        debug!(host = %host, rule = %rule_id, minutes = rule.delay_minutes, "delay granted");
        self.sink.send(EnforcementAction::GrantDelay {
            host,
            rule_id,
            minutes: rule.delay_minutes,
        });
        DelayOutcome::Granted(rule.delay_minutes)
    }

    fn state_of(&self, host: &CanonicalHost, rule_id: RuleId) -> EnforcementState {
        self.tracks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(host.clone(), rule_id))
            .map(|track| track.state)
            .unwrap_or_default()
    }

    /// Run the verification challenge, treating every ambiguous outcome
    /// (gate error, timeout) as failure.
    async fn pass_verification(&self, rule: &LimitRule) -> bool {
        match tokio::time::timeout(self.config.verification_timeout, self.gate.verify(rule)).await
        {
            Ok(Ok(VerificationOutcome::Passed)) => true,
            Ok(Ok(VerificationOutcome::Failed)) => false,
            Ok(Err(e)) => {
                warn!(rule = %rule.id, error = %e, "verification gate error treated as failure");
                false
            }
            Err(_) => {
                warn!(rule = %rule.id, "verification timed out, treated as failure");
                false
            }
        }
    }

    /// Advance one state cell against its verdict.
    fn drive(
        &self,
        tracks: &mut HashMap<(CanonicalHost, RuleId), Track>,
        host: &CanonicalHost,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) {
        let rule = &verdict.rule;
        let period = rule
            .kind
            .period_start(CalendarDay::of(now), self.evaluator.week_start());
        let track = tracks
            .entry((host.clone(), rule.id))
            .or_insert_with(|| Track {
                state: EnforcementState::Idle,
                period,
                delay_until: None,
            });

        // Boundary rollover resets the cell before anything else.
        if track.period != period {
            if track.state != EnforcementState::Idle {
                self.transition(host, rule.id, track, EnforcementState::Idle);
            }
            track.period = period;
            track.delay_until = None;
        }

        match track.state {
            EnforcementState::Delayed => {
                let expired = track.delay_until.map_or(true, |until| now >= until);
                if expired {
                    track.delay_until = None;
                    // Delay does not reduce consumption, so this is almost
                    // always a re-block; Idle is only reachable if the
                    // ledger was cleaned up externally.
                    if verdict.exceeded {
                        self.transition(host, rule.id, track, EnforcementState::Blocked);
                    } else {
                        self.transition(host, rule.id, track, EnforcementState::Idle);
                    }
                }
            }
            EnforcementState::Idle => {
                if verdict.exceeded {
                    self.transition(host, rule.id, track, EnforcementState::Blocked);
                } else if self.should_warn(verdict) {
                    self.transition_warn(host, rule.id, track, verdict.remaining);
                }
            }
            EnforcementState::Warned => {
                if verdict.exceeded {
                    self.transition(host, rule.id, track, EnforcementState::Blocked);
                }
            }
            EnforcementState::Blocked => {
                // Stays blocked until a delay request or a boundary rollover.
            }
        }
    }

    fn should_warn(&self, verdict: &Verdict) -> bool {
        let Some(fraction) = self.config.warning_fraction else {
            return false;
        };
        let warn_at = (verdict.rule.threshold as f64 * fraction).ceil() as u64;
        verdict.consumed > 0 && verdict.remaining <= warn_at
    }

    fn transition_warn(
        &self,
        host: &CanonicalHost,
        rule_id: RuleId,
        track: &mut Track,
        remaining: u64,
    ) {
        debug!(host = %host, rule = %rule_id, from = %track.state, to = "warned", "enforcement transition");
        track.state = EnforcementState::Warned;
        self.sink.send(EnforcementAction::ShowWarning {
            host: host.clone(),
            rule_id,
            remaining,
        });
    }

    fn transition(
        &self,
        host: &CanonicalHost,
        rule_id: RuleId,
        track: &mut Track,
        to: EnforcementState,
    ) {
        debug!(host = %host, rule = %rule_id, from = %track.state, to = %to, "enforcement transition");
        track.state = to;
        let action = match to {
            EnforcementState::Blocked => EnforcementAction::ShowBlockOverlay {
                host: host.clone(),
                rule_id,
            },
            EnforcementState::Idle => EnforcementAction::HideOverlay {
                host: host.clone(),
                rule_id,
            },
            // Warned and Delayed have dedicated entry points.
            EnforcementState::Warned | EnforcementState::Delayed => return,
        };
        self.sink.send(action);
    }
}
