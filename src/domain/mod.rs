//! Domain layer - pure business logic with no external dependencies.
//!
//! This layer contains the core concepts and invariants of the enforcement
//! engine:
//! - Host patterns and canonical host keys
//! - Merge rules and their resolution semantics
//! - Calendar periods (days, weeks, boundary stamps)
//! - Limit rules and their validation
//! - Verdicts produced by rule evaluation
//!
//! All types in this layer are pure and easily testable.

pub mod host;
pub mod merge;
pub mod period;
pub mod rule;
pub mod verdict;
