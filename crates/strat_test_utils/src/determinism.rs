//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the engine produces identical
//! boards given identical inputs.
//!
//! # Testing Strategy
//!
//! A game must replay bit-for-bit from its initial board and dice log.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: statistics use [`strat_core::math::Fixed`].
//!
//! - **HashMap iteration order**: the board and ledgers use ordered maps
//!   keyed by id.
//!
//! - **System randomness**: every die comes from a
//!   [`strat_core::random::RandomSource`].
//!
//! # Test Levels
//!
//! 1. **Unit tests**: single operations are reproducible
//! 2. **Property tests**: random inputs still produce deterministic outputs
//! 3. **Replay tests**: a recorded dice log reproduces the final board
//! 4. **Parallel tests**: running N games on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use strat_core::random::{RandomSource, SeededRandomSource};
use strat_core::replay::{RandomLog, RecordingRandomSource, ReplayRandomSource};
use strat_core::state::GameState;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Seed every run used.
    pub seed: u64,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>, seed: u64) -> Self {
        Self {
            is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
            hashes,
            seed,
        }
    }

    /// Get all unique hashes (should be 1 for a deterministic engine).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run ended on the same board.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Engine is non-deterministic!\n\
                 Runs: {}\n\
                 Seed: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.seed,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Play a game several times from the same seed and compare the results.
///
/// * `setup` - builds the starting position
/// * `play` - plays it with a source seeded from `seed`
/// * `hash` - hashes the end position
///
/// # Example
///
/// ```ignore
/// use strat_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     5,
///     42,
///     || setup_battle(),
///     |game, random| { game.fight(random); },
///     |game| game.state.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Play, HashFn>(
    runs: usize,
    seed: u64,
    setup: Setup,
    play: Play,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Play: Fn(&mut S, &mut SeededRandomSource),
    HashFn: Fn(&S) -> u64,
{
    let hashes = (0..runs)
        .map(|_| {
            let mut game = setup();
            play(&mut game, &mut SeededRandomSource::new(seed));
            hash(&game)
        })
        .collect();
    DeterminismResult::from_hashes(hashes, seed)
}

/// Like [`verify_determinism`] but each run gets its own scoped thread.
///
/// Catches non-determinism that only shows under thread scheduling or
/// memory layout variations.
///
/// # Panics
///
/// Panics if a run panics.
pub fn run_parallel_scoped<S, Setup, Play, HashFn>(
    runs: usize,
    seed: u64,
    setup: Setup,
    play: Play,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S + Sync,
    Play: Fn(&mut S, &mut SeededRandomSource) + Sync,
    HashFn: Fn(&S) -> u64 + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| {
                s.spawn(|| {
                    let mut game = setup();
                    play(&mut game, &mut SeededRandomSource::new(seed));
                    hash(&game)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("parallel run panicked"))
            .collect()
    });
    DeterminismResult::from_hashes(hashes, seed)
}

/// Outcome of recording a game and replaying its dice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayCheck {
    /// Hash of the recorded run's final board.
    pub recorded_hash: u64,
    /// Hash of the replayed run's final board.
    pub replayed_hash: u64,
    /// Draws logged by the recorded run.
    pub draws: usize,
    /// Whether the replay consumed the whole log.
    pub exhausted: bool,
}

impl ReplayCheck {
    /// Check if the replay matched the recording exactly.
    #[must_use]
    pub fn matches(&self) -> bool {
        self.recorded_hash == self.replayed_hash && self.exhausted
    }
}

/// Play once while recording the dice, then again from the log.
///
/// `play` receives the game and the source; `hash` hashes the end board.
pub fn verify_replay<S, Setup, Play, HashFn>(
    seed: u64,
    setup: Setup,
    play: Play,
    hash: HashFn,
) -> ReplayCheck
where
    Setup: Fn() -> S,
    Play: Fn(&mut S, &mut dyn RandomSource),
    HashFn: Fn(&S) -> u64,
{
    let mut game = setup();
    let mut recording = RecordingRandomSource::new(SeededRandomSource::new(seed));
    play(&mut game, &mut recording as &mut dyn RandomSource);
    let recorded_hash = hash(&game);
    let log: RandomLog = recording.into_log();
    let draws = log.len();

    let mut game = setup();
    let mut replay = ReplayRandomSource::new(log);
    play(&mut game, &mut replay as &mut dyn RandomSource);
    ReplayCheck {
        recorded_hash,
        replayed_hash: hash(&game),
        draws,
        exhausted: replay.is_exhausted(),
    }
}

/// Verify that a board survives a serialization round trip unchanged.
///
/// Returns `true` if the hash and the re-serialized bytes both match.
#[must_use]
pub fn verify_serialization_determinism(state: &GameState) -> bool {
    let Ok(bytes) = state.serialize() else {
        return false;
    };
    let Ok(restored) = GameState::deserialize(&bytes) else {
        return false;
    };
    restored.state_hash() == state.state_hash() && restored.serialize().ok() == Some(bytes)
}

/// Compute a hash for any hashable value.
#[must_use]
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for engine inputs.
pub mod strategies {
    use proptest::prelude::*;

    /// Dice sides used by real rule sets.
    pub fn arb_dice_sides() -> impl Strategy<Value = u32> {
        prop_oneof![Just(6_u32), Just(10), Just(12), Just(20)]
    }

    /// A hit strength in `0..=sides`.
    pub fn arb_strength(sides: u32) -> impl Strategy<Value = u32> {
        0..=sides
    }

    /// A 0-based die value for `sides`.
    pub fn arb_die_value(sides: u32) -> impl Strategy<Value = u32> {
        0..sides
    }

    /// Per-unit strengths of a low-luck group.
    pub fn arb_strengths(sides: u32, max_units: usize) -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(0..=sides, 0..=max_units)
    }

    /// Seeds for seeded sources.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }

    /// Unit counts per side of a battle.
    pub fn arb_army_size() -> impl Strategy<Value = u32> {
        1_u32..8
    }

    /// Transport cargo costs, infantry (2) or heavy (3).
    pub fn arb_cargo_costs(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(prop_oneof![Just(2_u32), Just(3)], 0..=max_len)
    }
}
