//! Sources of randomness.
//!
//! All dice go through a single [`RandomSource`]. Draws are 0-based:
//! `draw(6, n, ..)` yields values in `0..6`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{GameError, Result};

/// Supplies random integers.
pub trait RandomSource {
    /// Draw `count` values in `0..max_exclusive`.
    ///
    /// # Errors
    /// Implementations may refuse (scripted sources run dry, replays diverge).
    fn draw(&mut self, max_exclusive: u32, count: u32, annotation: &str) -> Result<Vec<u32>>;
}

/// Seeded source backed by ChaCha8, reproducible across platforms.
#[derive(Debug, Clone)]
pub struct SeededRandomSource {
    rng: ChaCha8Rng,
}

impl SeededRandomSource {
    /// Create a source from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandomSource {
    fn draw(&mut self, max_exclusive: u32, count: u32, annotation: &str) -> Result<Vec<u32>> {
        if max_exclusive == 0 {
            return Err(GameError::RandomSource(format!(
                "cannot draw from an empty range ({annotation})"
            )));
        }
        Ok((0..count)
            .map(|_| self.rng.gen_range(0..max_exclusive))
            .collect())
    }
}

/// Plays back a fixed list of values; used by tests to force outcomes.
///
/// A value equal to [`ScriptedRandomSource::ERROR`] makes the draw fail,
/// which proves a code path never asks for randomness.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandomSource {
    values: Vec<u32>,
    cursor: usize,
    calls: usize,
}

impl ScriptedRandomSource {
    /// Sentinel that turns a draw into an error.
    pub const ERROR: u32 = u32::MAX;

    /// Create a source that yields `values` in order.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self {
            values,
            cursor: 0,
            calls: 0,
        }
    }

    /// A source that fails on any draw.
    #[must_use]
    pub fn failing() -> Self {
        Self::new(vec![Self::ERROR])
    }

    /// Number of times `draw` was called.
    #[must_use]
    pub const fn calls(&self) -> usize {
        self.calls
    }

    /// Values not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.values.len() - self.cursor
    }
}

impl RandomSource for ScriptedRandomSource {
    fn draw(&mut self, max_exclusive: u32, count: u32, annotation: &str) -> Result<Vec<u32>> {
        self.calls += 1;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let value = *self.values.get(self.cursor).ok_or_else(|| {
                GameError::RandomSource(format!("scripted values exhausted ({annotation})"))
            })?;
            if value == Self::ERROR {
                return Err(GameError::RandomSource(format!(
                    "scripted error reached ({annotation})"
                )));
            }
            if value >= max_exclusive {
                return Err(GameError::RandomSource(format!(
                    "scripted value {value} outside 0..{max_exclusive} ({annotation})"
                )));
            }
            self.cursor += 1;
            out.push(value);
        }
        Ok(out)
    }
}
