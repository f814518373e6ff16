//! Default action sink.

use crate::application::ports::{ActionSink, EnforcementAction};
use tracing::info;

/// Sink that logs actions instead of delivering them anywhere.
///
/// The default when no presentation-layer channel is wired up; useful for
/// headless embedding and local debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LogSink {
    /// Create a new log sink.
    pub fn new() -> Self {
        Self
    }
}

impl ActionSink for LogSink {
    fn send(&self, action: EnforcementAction) {
        info!(?action, "enforcement action");
    }
}
