//! # Strat Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Fixture scenarios and placement helpers
//! - Determinism and replay harness
//! - Battle win-rate statistics
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod balance;
pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
