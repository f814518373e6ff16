//! Action recorder for testing.

use crate::application::ports::{ActionSink, EnforcementAction};
use std::sync::{Arc, Mutex};

/// Sink that records every action for later assertions.
///
/// Clones share the same buffer, so a clone can be handed to the engine
/// while the test keeps the original for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    actions: Arc<Mutex<Vec<EnforcementAction>>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded actions, in emission order.
    pub fn actions(&self) -> Vec<EnforcementAction> {
        self.actions
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }

    /// Number of recorded actions.
    pub fn count(&self) -> usize {
        self.actions
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .len()
    }

    /// Drain recorded actions, resetting the buffer.
    pub fn take(&self) -> Vec<EnforcementAction> {
        std::mem::take(
            &mut *self
                .actions
                .lock()
                .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock"),
        )
    }
}

impl ActionSink for RecordingSink {
    fn send(&self, action: EnforcementAction) {
        self.actions
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .push(action);
    }
}
