//! Recording and replaying dice.
//!
//! A game is reproducible from its initial board and the values every draw
//! returned. [`RecordingRandomSource`] wraps any source and logs its draws;
//! [`ReplayRandomSource`] hands the logged values back and fails the moment
//! the engine asks for something the log does not contain. [`BattleReplay`]
//! bundles the initial board, the log and the final state hash into one
//! file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GameError, Result};
use crate::random::RandomSource;
use crate::state::GameState;

/// One logged draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    /// Upper bound of the draw.
    pub max_exclusive: u32,
    /// Why the engine drew.
    pub annotation: String,
    /// Values returned.
    pub values: Vec<u32>,
}

/// Every draw of a game, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomLog {
    draws: Vec<DrawRecord>,
}

impl RandomLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a draw.
    pub fn push(&mut self, record: DrawRecord) {
        self.draws.push(record);
    }

    /// Logged draws.
    #[must_use]
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Number of draws.
    #[must_use]
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    /// Check if nothing was drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Total number of values drawn.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.draws.iter().map(|d| d.values.len()).sum()
    }
}

/// Logs every draw of the wrapped source.
#[derive(Debug, Clone)]
pub struct RecordingRandomSource<R> {
    inner: R,
    log: RandomLog,
}

impl<R: RandomSource> RecordingRandomSource<R> {
    /// Wrap a source.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            log: RandomLog::new(),
        }
    }

    /// Draws so far.
    #[must_use]
    pub const fn log(&self) -> &RandomLog {
        &self.log
    }

    /// Stop recording and keep the log.
    #[must_use]
    pub fn into_log(self) -> RandomLog {
        self.log
    }
}

impl<R: RandomSource> RandomSource for RecordingRandomSource<R> {
    fn draw(&mut self, max_exclusive: u32, count: u32, annotation: &str) -> Result<Vec<u32>> {
        let values = self.inner.draw(max_exclusive, count, annotation)?;
        self.log.push(DrawRecord {
            max_exclusive,
            annotation: annotation.to_string(),
            values: values.clone(),
        });
        Ok(values)
    }
}

/// Replays a [`RandomLog`].
#[derive(Debug, Clone)]
pub struct ReplayRandomSource {
    log: RandomLog,
    cursor: usize,
}

impl ReplayRandomSource {
    /// Replay `log` from the start.
    #[must_use]
    pub const fn new(log: RandomLog) -> Self {
        Self { log, cursor: 0 }
    }

    /// Index of the next draw.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    /// Check if every logged draw was consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.log.len()
    }
}

impl RandomSource for ReplayRandomSource {
    fn draw(&mut self, max_exclusive: u32, count: u32, annotation: &str) -> Result<Vec<u32>> {
        let index = self.cursor;
        let diverged = |message: String| GameError::ReplayDivergence { index, message };
        let record = self
            .log
            .draws
            .get(index)
            .ok_or_else(|| diverged(format!("log exhausted, engine asked for {annotation}")))?;
        if record.max_exclusive != max_exclusive || record.values.len() != count as usize {
            return Err(diverged(format!(
                "expected {} x d{} ({}), engine asked for {count} x d{max_exclusive} ({annotation})",
                record.values.len(),
                record.max_exclusive,
                record.annotation
            )));
        }
        self.cursor += 1;
        Ok(record.values.clone())
    }
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Everything needed to reproduce a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReplay {
    /// Replay format version.
    pub version: u32,
    /// Scenario the game was played on.
    pub scenario_id: String,
    /// Seed of the original random source.
    pub seed: u64,
    /// Serialized board before the first draw.
    pub initial_state: Vec<u8>,
    /// Every draw of the game.
    pub log: RandomLog,
    /// Hash of the final board.
    pub final_hash: u64,
}

impl BattleReplay {
    /// Start a replay from the initial board.
    ///
    /// # Errors
    /// Returns an error if the board cannot be serialized.
    pub fn new(scenario_id: impl Into<String>, seed: u64, initial_state: &GameState) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            seed,
            initial_state: initial_state.serialize()?,
            log: RandomLog::new(),
            final_hash: 0,
        })
    }

    /// Close the replay with the draws made and the final board.
    pub fn finalize(&mut self, log: RandomLog, final_state: &GameState) {
        self.log = log;
        self.final_hash = final_state.state_hash();
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to write replay file: {e}")))?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or the
    /// version does not match.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::InvalidState(format!("Failed to read replay file: {e}")))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }

    /// The board before the first draw.
    ///
    /// # Errors
    /// Returns an error if the stored board cannot be deserialized.
    pub fn restore_initial_state(&self) -> Result<GameState> {
        GameState::deserialize(&self.initial_state)
    }

    /// A random source that replays the logged draws.
    #[must_use]
    pub fn random_source(&self) -> ReplayRandomSource {
        ReplayRandomSource::new(self.log.clone())
    }

    /// Compare a re-run's final board with the recorded one.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] when the hashes differ.
    pub fn verify(&self, final_state: &GameState) -> Result<()> {
        let actual_hash = final_state.state_hash();
        if actual_hash != self.final_hash {
            return Err(GameError::DesyncDetected {
                expected_hash: self.final_hash,
                actual_hash,
            });
        }
        tracing::debug!(hash = actual_hash, draws = self.log.len(), "Replay verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::{AttackSpec, BattleTracker, BattleType};
    use crate::bridge::Bridge;
    use crate::decision::DefaultPlayer;
    use crate::history::History;
    use crate::random::{ScriptedRandomSource, SeededRandomSource};
    use crate::test_support::classic_world;

    #[test]
    fn test_recording_logs_every_draw() {
        let mut source = RecordingRandomSource::new(ScriptedRandomSource::new(vec![1, 2, 3]));
        source.draw(6, 2, "first").unwrap();
        source.draw(6, 1, "second").unwrap();
        let log = source.into_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log.value_count(), 3);
        assert_eq!(log.draws()[1].annotation, "second");
    }

    #[test]
    fn test_replay_diverges_on_different_request() {
        let mut log = RandomLog::new();
        log.push(DrawRecord {
            max_exclusive: 6,
            annotation: "attack".into(),
            values: vec![4],
        });
        let mut replay = ReplayRandomSource::new(log.clone());
        assert!(matches!(
            replay.draw(6, 2, "attack"),
            Err(GameError::ReplayDivergence { index: 0, .. })
        ));

        let mut replay = ReplayRandomSource::new(log);
        assert_eq!(replay.draw(6, 1, "attack").unwrap(), vec![4]);
        assert!(replay.is_exhausted());
        assert!(matches!(
            replay.draw(6, 1, "more"),
            Err(GameError::ReplayDivergence { index: 1, .. })
        ));
    }

    #[test]
    fn test_battle_replays_byte_exact() {
        let mut world = classic_world(false);
        let attackers = world.place_many(world.attacker, world.land, "armour", 3);
        world.place_many(world.defender, world.land, "infantry", 3);
        let spec = AttackSpec {
            attacker: world.attacker,
            territory: world.land,
            battle_type: BattleType::Normal,
            units: attackers,
            from: world.home,
            amphibious: Vec::new(),
        };
        let initial = world.state.clone();
        let mut replay = BattleReplay::new("fixture", 7, &initial).unwrap();

        let mut tracker = BattleTracker::new();
        let key = tracker.add_attack(&world.data, &world.state, &spec).unwrap();
        let mut random = RecordingRandomSource::new(SeededRandomSource::new(7));
        tracker
            .fight_to_completion(&mut world.bridge(&mut random), key, &mut DefaultPlayer)
            .unwrap();
        replay.finalize(random.into_log(), &world.state);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("battle.replay");
        replay.save(&path).unwrap();
        let loaded = BattleReplay::load(&path).unwrap();
        assert_eq!(loaded, replay);

        let mut state = loaded.restore_initial_state().unwrap();
        let mut history = History::new();
        let mut source = loaded.random_source();
        let mut tracker = BattleTracker::new();
        let key = tracker.add_attack(&world.data, &state, &spec).unwrap();
        {
            let mut bridge = Bridge::new(&world.data, &mut state, &mut source, &mut history);
            tracker
                .fight_to_completion(&mut bridge, key, &mut DefaultPlayer)
                .unwrap();
        }
        assert!(source.is_exhausted());
        loaded.verify(&state).unwrap();

        assert!(matches!(
            loaded.verify(&initial),
            Err(GameError::DesyncDetected { .. })
        ));
    }
}
