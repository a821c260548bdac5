//! Game metrics collection for balance analysis.
//!
//! Per-game metrics are folded out of a [`GameReport`]; a [`BatchSummary`]
//! aggregates them across seeds. Rates are fixed-point so two machines
//! summarising the same batch agree exactly.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use strat_core::battle::BattleOutcome;
use strat_core::game_data::GameData;
use strat_core::ids::PlayerId;
use strat_core::math::{fixed_serde, ratio, Fixed};

use crate::runner::GameReport;

/// Complete metrics for a single game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetrics {
    /// Unique game identifier.
    pub game_id: String,
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Orders performed.
    pub moves_performed: u32,
    /// Orders refused.
    pub moves_rejected: u32,
    /// Battles resolved.
    pub battles: u32,
    /// Battles the attacker won.
    pub attacker_wins: u32,
    /// Aircraft lost for want of a landing spot.
    pub lost_aircraft: u32,
    /// Per-player numbers, keyed by name.
    pub players: BTreeMap<String, PlayerMetrics>,
    /// Final owner of each land territory.
    pub owners: BTreeMap<String, Option<String>>,
    /// Hash of the final board.
    pub final_state_hash: u64,
}

/// Battle numbers for one player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMetrics {
    /// Battles won, attacking or defending.
    pub battles_won: u32,
    /// Battles lost, attacking or defending.
    pub battles_lost: u32,
    /// Value of own units destroyed.
    pub tuv_lost: u32,
    /// Value of enemy units destroyed.
    pub tuv_destroyed: u32,
}

impl GameMetrics {
    /// Fold a game report into metrics, naming players from `data`.
    #[must_use]
    pub fn collect(report: &GameReport, data: &GameData) -> Self {
        let name = |id: PlayerId| {
            data.player(id)
                .map_or_else(|| id.to_string(), |p| p.name.clone())
        };
        let mut metrics = Self {
            game_id: format!("game_{}", report.seed),
            scenario: report.scenario.clone(),
            seed: report.seed,
            moves_performed: report.performed() as u32,
            moves_rejected: (report.moves.len() - report.performed()) as u32,
            battles: report.battles.len() as u32,
            lost_aircraft: report.lost_aircraft as u32,
            owners: report.owners.clone(),
            final_state_hash: report.final_hash,
            ..Self::default()
        };

        for record in &report.battles {
            let (winner, loser) = match record.outcome {
                BattleOutcome::AttackerWon => (Some(record.attacker), Some(record.defender)),
                BattleOutcome::DefenderWon => (Some(record.defender), Some(record.attacker)),
                BattleOutcome::Draw | BattleOutcome::Retreated => (None, None),
            };
            if record.outcome == BattleOutcome::AttackerWon {
                metrics.attacker_wins += 1;
            }
            if let Some(winner) = winner {
                metrics.player_mut(name(winner)).battles_won += 1;
            }
            if let Some(loser) = loser {
                metrics.player_mut(name(loser)).battles_lost += 1;
            }
            let attacker = metrics.player_mut(name(record.attacker));
            attacker.tuv_lost += record.attacker_tuv_lost;
            attacker.tuv_destroyed += record.defender_tuv_lost;
            let defender = metrics.player_mut(name(record.defender));
            defender.tuv_lost += record.defender_tuv_lost;
            defender.tuv_destroyed += record.attacker_tuv_lost;
        }
        metrics
    }

    fn player_mut(&mut self, name: String) -> &mut PlayerMetrics {
        self.players.entry(name).or_default()
    }
}

/// Aggregate over a batch of games.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Games summarised.
    pub total_games: u32,
    /// Battles across all games.
    pub total_battles: u32,
    /// Battles the attacker won.
    pub attacker_wins: u32,
    /// `attacker_wins / total_battles`.
    #[serde(with = "fixed_serde")]
    pub attacker_win_rate: Fixed,
    /// The same rate as a whole percentage, for people.
    pub attacker_win_percent: u32,
    /// How often each player ended owning each territory.
    pub final_owners: BTreeMap<String, BTreeMap<String, u32>>,
    /// Value destroyed per player, summed over games.
    pub tuv_lost: BTreeMap<String, u64>,
    /// Distinct final boards seen.
    pub distinct_outcomes: u32,
}

impl BatchSummary {
    /// Aggregate per-game metrics.
    #[must_use]
    pub fn from_games(games: &[GameMetrics]) -> Self {
        let mut summary = Self {
            total_games: games.len() as u32,
            ..Self::default()
        };
        let mut hashes = BTreeSet::new();
        for game in games {
            summary.total_battles += game.battles;
            summary.attacker_wins += game.attacker_wins;
            hashes.insert(game.final_state_hash);
            for (territory, owner) in &game.owners {
                let owner = owner.clone().unwrap_or_else(|| "neutral".to_string());
                *summary
                    .final_owners
                    .entry(territory.clone())
                    .or_default()
                    .entry(owner)
                    .or_insert(0) += 1;
            }
            for (player, numbers) in &game.players {
                *summary.tuv_lost.entry(player.clone()).or_insert(0) += u64::from(numbers.tuv_lost);
            }
        }
        summary.attacker_win_rate = ratio(summary.attacker_wins, summary.total_battles);
        summary.attacker_win_percent = (summary.attacker_win_rate * Fixed::from_num(100)).to_num::<u32>();
        summary.distinct_outcomes = hashes.len() as u32;
        summary
    }

    /// How many games ended with `player` owning `territory`.
    #[must_use]
    pub fn times_owned(&self, territory: &str, player: &str) -> u32 {
        self.final_owners
            .get(territory)
            .and_then(|owners| owners.get(player))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::GameRunner;
    use crate::scenario::Scenario;
    use strat_core::random::SeededRandomSource;

    fn play(seed: u64) -> GameMetrics {
        let scenario = Scenario::from_ron_str(include_str!("../scenarios/channel.ron")).unwrap();
        let mut runner = GameRunner::new(&scenario).unwrap();
        let report = runner.play(&mut SeededRandomSource::new(seed), seed).unwrap();
        GameMetrics::collect(&report, runner.data())
    }

    #[test]
    fn test_collect_counts_battles_for_both_sides() {
        let metrics = play(5);
        assert_eq!(metrics.battles, 2);
        assert_eq!(metrics.game_id, "game_5");
        let germany = &metrics.players["Germany"];
        let britain = &metrics.players["Britain"];
        assert_eq!(germany.tuv_lost, britain.tuv_destroyed);
        assert_eq!(britain.tuv_lost, germany.tuv_destroyed);
        assert_eq!(
            germany.battles_won + britain.battles_won,
            germany.battles_lost + britain.battles_lost
        );
    }

    #[test]
    fn test_summary_rates() {
        let games: Vec<GameMetrics> = (0..4).map(play).collect();
        let summary = BatchSummary::from_games(&games);
        assert_eq!(summary.total_games, 4);
        assert_eq!(summary.total_battles, 8);
        assert_eq!(
            summary.attacker_win_rate,
            ratio(summary.attacker_wins, summary.total_battles)
        );
        assert!(summary.attacker_win_percent <= 100);
        assert_eq!(summary.times_owned("Germany", "Germany"), 4);
        assert!(summary.distinct_outcomes >= 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_games(&[]);
        assert_eq!(summary.attacker_win_rate, Fixed::ZERO);
        assert_eq!(summary.attacker_win_percent, 0);
    }
}
