//! Plays a scenario's scripted orders through the rules engine.
//!
//! Consecutive orders of one player form that player's turn. A turn runs
//! its combat moves, the combat phase (scheduler first, then whatever is
//! left in board order), removes aircraft with nowhere to land, runs the
//! non-combat moves and ends. Every question a battle asks is answered by
//! [`DefaultPlayer`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use strat_core::battle::scheduler::{cleanup_stranded_air, run_combat_phase};
use strat_core::battle::{BattleKey, BattleRecord, BattleTracker};
use strat_core::bridge::Bridge;
use strat_core::decision::DefaultPlayer;
use strat_core::game_data::GameData;
use strat_core::history::History;
use strat_core::ids::PlayerId;
use strat_core::movement::{MoveDelegate, MoveOutcome};
use strat_core::random::{RandomSource, SeededRandomSource};
use strat_core::replay::{BattleReplay, RecordingRandomSource};
use strat_core::state::GameState;
use strat_core::undo::UndoLedger;

use crate::scenario::{Scenario, ScenarioError};

/// What became of one scripted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderResult {
    /// The move happened.
    Performed,
    /// The engine or the board refused it.
    Rejected(String),
    /// The player declined to fly through AA fire.
    Declined,
}

/// Report line for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveReport {
    /// Index of the order in the scenario.
    pub order: usize,
    /// Moving player's name.
    pub player: String,
    /// Route as territory names.
    pub route: Vec<String>,
    /// Units moved, cargo included.
    pub units: usize,
    /// Result.
    pub result: OrderResult,
}

/// Everything a played game produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameReport {
    /// Scenario name.
    pub scenario: String,
    /// Seed of the random source.
    pub seed: u64,
    /// Turns played.
    pub turns: u32,
    /// One entry per order.
    pub moves: Vec<MoveReport>,
    /// Resolved battles in order.
    pub battles: Vec<BattleRecord>,
    /// Aircraft lost for want of a landing spot.
    pub lost_aircraft: usize,
    /// Final owner of each land territory.
    pub owners: BTreeMap<String, Option<String>>,
    /// Dice groups rolled.
    pub dice_rolls: usize,
    /// Hash of the final board.
    pub final_hash: u64,
}

impl GameReport {
    /// Number of orders the engine performed.
    #[must_use]
    pub fn performed(&self) -> usize {
        self.moves
            .iter()
            .filter(|m| m.result == OrderResult::Performed)
            .count()
    }
}

/// Plays one scenario on its own board.
pub struct GameRunner<'s> {
    scenario: &'s Scenario,
    data: GameData,
    state: GameState,
    history: History,
}

impl<'s> GameRunner<'s> {
    /// Build the scenario's board and check its orders.
    pub fn new(scenario: &'s Scenario) -> Result<Self, ScenarioError> {
        let (data, state) = scenario.build()?;
        scenario.check_orders(&data)?;
        Ok(Self {
            scenario,
            data,
            state,
            history: History::new(),
        })
    }

    /// Start from a given board instead of the scenario's.
    #[must_use]
    pub fn with_state(mut self, state: GameState) -> Self {
        self.state = state;
        self
    }

    /// Reference data.
    #[must_use]
    pub const fn data(&self) -> &GameData {
        &self.data
    }

    /// Current board.
    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    /// Everything that happened so far.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    fn bridge<'a>(&'a mut self, random: &'a mut dyn RandomSource) -> Bridge<'a> {
        Bridge::new(&self.data, &mut self.state, random, &mut self.history)
    }

    /// Play every order.
    ///
    /// `seed` is only reported; the dice come from `random`.
    pub fn play(&mut self, random: &mut dyn RandomSource, seed: u64) -> Result<GameReport, ScenarioError> {
        let mut report = GameReport {
            scenario: self.scenario.name().to_string(),
            seed,
            turns: 0,
            moves: Vec::with_capacity(self.scenario.orders.len()),
            battles: Vec::new(),
            lost_aircraft: 0,
            owners: BTreeMap::new(),
            dice_rolls: 0,
            final_hash: 0,
        };

        for turn in turns(self.scenario) {
            let player = self
                .data
                .player_id(&self.scenario.orders[turn[0]].player)
                .ok_or_else(|| ScenarioError::UnknownName {
                    order: turn[0],
                    kind: "player",
                    name: self.scenario.orders[turn[0]].player.clone(),
                })?;
            self.play_turn(random, player, &turn, &mut report)?;
            report.turns += 1;
        }

        report.owners = self.owners();
        report.dice_rolls = self.history.dice().count();
        report.final_hash = self.state.state_hash();
        info!(
            scenario = %report.scenario,
            seed,
            turns = report.turns,
            battles = report.battles.len(),
            hash = report.final_hash,
            "Game complete"
        );
        Ok(report)
    }

    fn play_turn(
        &mut self,
        random: &mut dyn RandomSource,
        player: PlayerId,
        orders: &[usize],
        report: &mut GameReport,
    ) -> Result<(), ScenarioError> {
        let mut tracker = BattleTracker::new();
        let mut ledger = UndoLedger::new();
        let combat = MoveDelegate::combat(player);
        let non_combat = MoveDelegate::non_combat(player);
        let scenario = self.scenario;
        debug!(%player, orders = orders.len(), "Turn started");

        for &index in orders.iter().filter(|i| !scenario.orders[**i].non_combat) {
            let line = self.play_order(random, &combat, &mut tracker, &mut ledger, index)?;
            report.moves.push(line);
        }

        let schedule = run_combat_phase(&mut self.bridge(random), &mut tracker, &mut DefaultPlayer)?;
        debug!(
            fought = schedule.fought.len(),
            remaining = schedule.remaining.len(),
            "Combat phase scheduled"
        );
        while let Some(key) = next_battle(&tracker) {
            let outcome = tracker.fight_to_completion(&mut self.bridge(random), key, &mut DefaultPlayer)?;
            debug!(battle = %key, ?outcome, "Fought remaining battle");
        }
        let lost = cleanup_stranded_air(&mut self.bridge(random), &tracker, player)?;
        report.lost_aircraft += lost.len();

        for &index in orders.iter().filter(|i| scenario.orders[**i].non_combat) {
            let line = self.play_order(random, &non_combat, &mut tracker, &mut ledger, index)?;
            report.moves.push(line);
        }

        let records = non_combat.end_turn(&mut self.bridge(random), &mut tracker, &mut ledger)?;
        report.battles.extend(records);
        Ok(())
    }

    fn play_order(
        &mut self,
        random: &mut dyn RandomSource,
        delegate: &MoveDelegate,
        tracker: &mut BattleTracker,
        ledger: &mut UndoLedger,
        index: usize,
    ) -> Result<MoveReport, ScenarioError> {
        let order = &self.scenario.orders[index];
        let mut line = MoveReport {
            order: index,
            player: order.player.clone(),
            route: order.route.clone(),
            units: 0,
            result: OrderResult::Performed,
        };
        let resolved = match self.scenario.resolve(index, &self.data, &self.state)? {
            Ok(resolved) => resolved,
            Err(message) => {
                warn!(order = index, %message, "Order skipped");
                line.result = OrderResult::Rejected(message);
                return Ok(line);
            }
        };
        let request = MoveDelegate::with_cargo(&self.state, &self.data, &resolved.request);
        line.units = request.units.len();

        let outcome = delegate.perform_move(
            &mut self.bridge(random),
            tracker,
            ledger,
            &mut DefaultPlayer,
            &request,
        )?;
        line.result = match outcome {
            MoveOutcome::Performed(_) => OrderResult::Performed,
            MoveOutcome::Rejected(message) => {
                warn!(order = index, %message, "Order rejected");
                OrderResult::Rejected(message)
            }
            MoveOutcome::Declined => OrderResult::Declined,
        };
        Ok(line)
    }

    fn owners(&self) -> BTreeMap<String, Option<String>> {
        self.data
            .map
            .territories()
            .iter()
            .filter(|t| !t.water)
            .map(|t| {
                let owner = self
                    .state
                    .owner(t.id)
                    .and_then(|p| self.data.player(p))
                    .map(|p| p.name.clone());
                (t.name.clone(), owner)
            })
            .collect()
    }
}

/// Group order indices into turns: runs of consecutive orders by one player.
fn turns(scenario: &Scenario) -> Vec<Vec<usize>> {
    let mut turns: Vec<Vec<usize>> = Vec::new();
    for (index, order) in scenario.orders.iter().enumerate() {
        match turns.last_mut() {
            Some(turn) if scenario.orders[turn[0]].player == order.player => turn.push(index),
            _ => turns.push(vec![index]),
        }
    }
    turns
}

/// The first pending battle nothing blocks, else the first pending one.
fn next_battle(tracker: &BattleTracker) -> Option<BattleKey> {
    let pending = tracker.pending_battles();
    pending
        .iter()
        .copied()
        .find(|k| tracker.blocking(*k).is_empty())
        .or_else(|| pending.first().copied())
}

/// Play a scenario with a seeded source.
pub fn run_game(scenario: &Scenario, seed: u64) -> Result<GameReport, ScenarioError> {
    let mut runner = GameRunner::new(scenario)?;
    let mut random = SeededRandomSource::new(seed);
    runner.play(&mut random, seed)
}

/// Play a scenario with a seeded source and keep its dice log.
pub fn record_game(scenario: &Scenario, seed: u64) -> Result<(GameReport, BattleReplay), ScenarioError> {
    let mut runner = GameRunner::new(scenario)?;
    let mut replay = BattleReplay::new(scenario.name(), seed, runner.state())?;
    let mut random = RecordingRandomSource::new(SeededRandomSource::new(seed));
    let report = runner.play(&mut random, seed)?;
    replay.finalize(random.into_log(), runner.state());
    info!(draws = replay.log.len(), "Recorded game");
    Ok((report, replay))
}

/// Re-play a recorded game from its dice log and check the final board.
///
/// # Errors
///
/// Returns [`ScenarioError::Engine`] wrapping a desync when the replay
/// diverges, either in the draws requested or in the final board.
pub fn replay_game(scenario: &Scenario, replay: &BattleReplay) -> Result<GameReport, ScenarioError> {
    let initial = replay.restore_initial_state()?;
    let mut runner = GameRunner::new(scenario)?.with_state(initial);
    let mut random = replay.random_source();
    let report = runner.play(&mut random, replay.seed)?;
    replay.verify(runner.state())?;
    if !random.is_exhausted() {
        warn!("Replay finished with unused draws");
    }
    Ok(report)
}
