//! Mock implementations for testing.
//!
//! Controllable test doubles for the engine's ports: a settable clock, a
//! scripted verification gate, an action recorder, and a failure-injecting
//! ledger store. Available with the `test-helpers` feature or in test
//! builds.

mod clock;
mod gate;
mod sink;
mod store;

pub use clock::MockClock;
pub use gate::{GateScript, MockGate};
pub use sink::RecordingSink;
pub use store::FlakyStore;
