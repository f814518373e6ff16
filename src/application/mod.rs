//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Host normalizer (configured merge rules)
//! - Usage ledger (per-day accounting with buffered persistence)
//! - Rule store (validated limit rules)
//! - Limit evaluator (verdict computation)
//! - Enforcement controller (the blocking state machine)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod controller;
pub mod evaluator;
pub mod ledger;
pub mod normalizer;
pub mod ports;
pub mod rules;
