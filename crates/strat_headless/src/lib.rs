//! Headless scenario runner for balance testing and CI verification.
//!
//! This crate plays scripted scenarios through the rules engine without any
//! user interface. It enables:
//!
//! - **Balance testing**: play one scenario under many seeds in parallel
//! - **CI verification**: the same seed always produces the same board
//! - **Replay verification**: a recorded dice log reproduces the final board
//!
//! # Output
//!
//! - **stdout**: game reports and batch summaries (JSON)
//! - **stderr**: logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # Play a scenario once and keep its dice log
//! cargo run -p strat_headless -- run --scenario scenarios/channel.ron --seed 7 --record channel.replay
//!
//! # Check the recording
//! cargo run -p strat_headless -- replay --scenario scenarios/channel.ron --file channel.replay
//!
//! # Play 1000 seeds
//! cargo run -p strat_headless -- batch --scenario scenarios/channel.ron --count 1000
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod metrics;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use metrics::{BatchSummary, GameMetrics};
pub use runner::{record_game, replay_game, run_game, GameReport, GameRunner};
pub use scenario::{MoveOrder, OrderedUnits, Scenario, ScenarioError};
