//! Battle balance utilities.
//!
//! Runs many seeded battles on the fixture map and aggregates win rates so
//! unit values can be checked against expectations.

use serde::{Deserialize, Serialize};

use strat_core::battle::{BattleOutcome, BattleTracker};
use strat_core::decision::DefaultPlayer;
use strat_core::error::{GameError, Result};
use strat_core::math::{ratio, Fixed};
use strat_core::random::SeededRandomSource;

use crate::fixtures::Fixture;

/// Units on one side of a battle, by type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyComposition {
    /// `(unit type, count)` pairs.
    pub stacks: Vec<(String, u32)>,
}

impl ArmyComposition {
    /// Create an empty army.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` units of a type.
    #[must_use]
    pub fn with(mut self, unit_type: &str, count: u32) -> Self {
        self.stacks.push((unit_type.to_string(), count));
        self
    }

    /// Total unit count.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.stacks.iter().map(|(_, n)| n).sum()
    }

    /// Check if the army has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a simulated battle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleResult {
    /// How the battle ended.
    pub outcome: BattleOutcome,
    /// Rounds fought.
    pub rounds: u32,
    /// Cost of the attacker's losses.
    pub attacker_tuv_lost: u32,
    /// Cost of the defender's losses.
    pub defender_tuv_lost: u32,
    /// Board hash after the battle.
    pub final_hash: u64,
}

/// Fight one land battle in Front: `attackers` (Germany) against
/// `defenders` (Russia), with dice from `seed`.
///
/// # Errors
/// Returns any engine error, or [`GameError::InvalidState`] if the battle
/// left no record.
pub fn simulate_battle(
    low_luck: bool,
    attackers: &ArmyComposition,
    defenders: &ArmyComposition,
    seed: u64,
) -> Result<BattleResult> {
    let mut fixture = Fixture::new(low_luck);
    let (attacker, defender, front) = (fixture.attacker, fixture.defender, fixture.front);

    let mut units = Vec::new();
    for (unit_type, count) in &attackers.stacks {
        units.extend(fixture.place_many(attacker, front, unit_type, *count));
    }
    for (unit_type, count) in &defenders.stacks {
        fixture.place_many(defender, front, unit_type, *count);
    }

    let spec = fixture.attack(front, units);
    let mut tracker = BattleTracker::new();
    let key = tracker.add_attack(&fixture.data, &fixture.state, &spec)?;
    let mut random = SeededRandomSource::new(seed);
    let outcome = tracker.fight_to_completion(&mut fixture.bridge(&mut random), key, &mut DefaultPlayer)?;

    let record = tracker
        .records()
        .records()
        .last()
        .cloned()
        .ok_or_else(|| GameError::InvalidState(format!("{key} left no record")))?;
    Ok(BattleResult {
        outcome,
        rounds: record.rounds,
        attacker_tuv_lost: record.attacker_tuv_lost,
        defender_tuv_lost: record.defender_tuv_lost,
        final_hash: fixture.state.state_hash(),
    })
}

/// Statistics for a set of battles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleStats {
    /// Total battles run.
    pub total_battles: u32,
    /// Battles the attacker won.
    pub attacker_wins: u32,
    /// Battles the defender won.
    pub defender_wins: u32,
    /// Draws, including mutual destruction.
    pub draws: u32,
    /// Retreats.
    pub retreats: u32,
    /// Sum of rounds over all battles.
    pub total_rounds: u32,
}

impl BattleStats {
    /// Add one battle.
    pub fn record(&mut self, result: &BattleResult) {
        self.total_battles += 1;
        self.total_rounds += result.rounds;
        match result.outcome {
            BattleOutcome::AttackerWon => self.attacker_wins += 1,
            BattleOutcome::DefenderWon => self.defender_wins += 1,
            BattleOutcome::Draw => self.draws += 1,
            BattleOutcome::Retreated => self.retreats += 1,
        }
    }

    /// Attacker win rate, 0 to 1.
    #[must_use]
    pub fn attacker_win_rate(&self) -> Fixed {
        ratio(self.attacker_wins, self.total_battles)
    }

    /// Defender win rate, 0 to 1.
    #[must_use]
    pub fn defender_win_rate(&self) -> Fixed {
        ratio(self.defender_wins, self.total_battles)
    }

    /// Average rounds per battle.
    #[must_use]
    pub fn average_rounds(&self) -> Fixed {
        ratio(self.total_rounds, self.total_battles)
    }

    /// Check if the attacker's win rate lies within `[min_rate, max_rate]`.
    #[must_use]
    pub fn is_balanced(&self, min_rate: Fixed, max_rate: Fixed) -> bool {
        let rate = self.attacker_win_rate();
        rate >= min_rate && rate <= max_rate
    }
}

/// Fight the same matchup once per seed in `seeds`.
///
/// # Errors
/// Returns the first engine error.
pub fn run_matchup(
    low_luck: bool,
    attackers: &ArmyComposition,
    defenders: &ArmyComposition,
    seeds: std::ops::Range<u64>,
) -> Result<BattleStats> {
    let mut stats = BattleStats::default();
    for seed in seeds {
        stats.record(&simulate_battle(low_luck, attackers, defenders, seed)?);
    }
    tracing::debug!(
        battles = stats.total_battles,
        attacker_wins = stats.attacker_wins,
        "Matchup finished"
    );
    Ok(stats)
}
