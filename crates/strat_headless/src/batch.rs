//! Plays one scenario under a range of seeds in parallel.
//!
//! Each seed is an independent game, so the batch fans out over rayon and
//! the results come back in seed order regardless of scheduling.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use strat_core::random::SeededRandomSource;

use crate::metrics::{BatchSummary, GameMetrics};
use crate::runner::GameRunner;
use crate::scenario::Scenario;

/// Games between progress log lines.
const PROGRESS_EVERY: u32 = 100;

/// Which seeds to play and how wide to fan out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario file the batch was loaded from
    pub scenario: PathBuf,
    /// Number of games, one per seed
    pub game_count: u32,
    /// Worker threads (0 = rayon default)
    pub parallel_games: u32,
    /// First seed; game `i` plays `seed_start + i`
    pub seed_start: u64,
}

impl BatchConfig {
    /// Play `game_count` seeds starting at 0.
    pub fn new(scenario: impl Into<PathBuf>, game_count: u32) -> Self {
        Self {
            scenario: scenario.into(),
            game_count,
            parallel_games: 0,
            seed_start: 0,
        }
    }

    /// Start at another seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Cap the worker threads.
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.parallel_games = threads;
        self
    }

    fn seeds(&self) -> impl IndexedParallelIterator<Item = (u32, u64)> + '_ {
        (0..self.game_count)
            .into_par_iter()
            .map(|i| (i, self.seed_start.wrapping_add(u64::from(i))))
    }
}

/// A game that stopped with an engine error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Position in the batch
    pub game_index: u32,
    /// Seed it played
    pub seed: u64,
    /// The error
    pub message: String,
}

/// Everything a batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Finished games in seed order
    pub games: Vec<GameMetrics>,
    /// Totals over `games`
    pub summary: BatchSummary,
    /// Wall-clock time
    pub duration_seconds: f64,
    /// Games that failed
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Write the results as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(std::io::Error::other)
    }

    /// Read results written by [`save`](Self::save).
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(std::io::Error::other)
    }
}

/// Play one seed to the end.
fn play_seed(scenario: &Scenario, seed: u64) -> Result<GameMetrics, String> {
    let mut runner = GameRunner::new(scenario).map_err(|e| e.to_string())?;
    let mut random = SeededRandomSource::new(seed);
    let report = runner.play(&mut random, seed).map_err(|e| e.to_string())?;
    Ok(GameMetrics::collect(&report, runner.data()))
}

/// Play every seed of the batch.
pub fn run_batch(config: BatchConfig, scenario: &Scenario) -> BatchResults {
    let start = Instant::now();
    let finished = AtomicU32::new(0);

    info!(
        games = config.game_count,
        scenario = %scenario.name(),
        seed_start = config.seed_start,
        "Starting batch run"
    );

    if config.parallel_games > 0 {
        // A global pool may already exist from an earlier batch; keep it.
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build_global();
    }

    let outcomes: Vec<Result<GameMetrics, BatchError>> = config
        .seeds()
        .map(|(game_index, seed)| {
            let outcome = play_seed(scenario, seed).map_err(|message| {
                warn!(game = game_index, seed, %message, "Game failed");
                BatchError {
                    game_index,
                    seed,
                    message,
                }
            });
            let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
            if done % PROGRESS_EVERY == 0 {
                info!(done, total = config.game_count, "Batch progress");
            }
            outcome
        })
        .collect();

    let mut games = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(metrics) => games.push(metrics),
            Err(error) => errors.push(error),
        }
    }

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        games = games.len(),
        errors = errors.len(),
        attacker_win_percent = summary.attacker_win_percent,
        duration_seconds,
        "Batch complete"
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

/// Play one seed `runs` times and check every game came out the same.
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> bool {
    let first = match play_seed(scenario, seed) {
        Ok(metrics) => metrics,
        Err(message) => {
            warn!(seed, %message, "Game failed");
            return false;
        }
    };
    (1..runs).all(|_| play_seed(scenario, seed).as_ref() == Ok(&first))
}
