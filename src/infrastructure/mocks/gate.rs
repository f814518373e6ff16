//! Scripted verification gate for testing.

use crate::application::ports::{GateError, VerificationGate, VerificationOutcome};
use crate::domain::rule::LimitRule;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How the mock gate responds to verification requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateScript {
    /// No rule requires verification.
    NotRequired,
    /// The challenge is required and the user passes it.
    Pass,
    /// The challenge is required and the user fails or abandons it.
    Fail,
    /// The gate itself breaks.
    Error,
    /// The prompt is never answered (exercises the timeout path).
    Hang,
}

/// Verification gate with scripted behavior.
#[derive(Debug)]
pub struct MockGate {
    script: Mutex<GateScript>,
    calls: AtomicUsize,
}

impl MockGate {
    /// Create a gate following `script`.
    pub fn new(script: GateScript) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Change the script mid-test.
    pub fn set_script(&self, script: GateScript) {
        *self
            .script
            .lock()
            .expect("MockGate mutex poisoned - a test thread panicked while holding the lock") =
            script;
    }

    /// How many times the challenge was run.
    pub fn verify_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn script(&self) -> GateScript {
        *self
            .script
            .lock()
            .expect("MockGate mutex poisoned - a test thread panicked while holding the lock")
    }
}

#[async_trait]
impl VerificationGate for MockGate {
    fn is_required(&self, _rule: &LimitRule) -> bool {
        self.script() != GateScript::NotRequired
    }

    async fn verify(&self, _rule: &LimitRule) -> Result<VerificationOutcome, GateError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.script() {
            GateScript::NotRequired | GateScript::Pass => Ok(VerificationOutcome::Passed),
            GateScript::Fail => Ok(VerificationOutcome::Failed),
            GateScript::Error => Err(GateError::new("scripted gate failure")),
            GateScript::Hang => std::future::pending().await,
        }
    }
}
