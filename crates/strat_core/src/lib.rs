//! # Strat Core
//!
//! Deterministic rules engine for a turn-based grand-strategy wargame.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO beyond replay files
//! - No system randomness: every die comes from a [`random::RandomSource`]
//! - No floating-point math (expected hits use fixed-point)
//!
//! ## Crate Structure
//!
//! - [`data`] - Scenario documents (unit types, map, players, rules) in RON
//! - [`game_data`] / [`game_map`] - Read-only reference data and the map graph
//! - [`state`] / [`change`] / [`bridge`] - The board and its invertible mutations
//! - [`dice`] / [`casualty`] - Hit resolution and casualty selection
//! - [`battle`] - Battle state machine, tracker and combat-phase scheduler
//! - [`move_validator`] / [`movement`] - Move legality and execution
//! - [`transport`] / [`undo`] - Cargo bookkeeping and the per-turn undo ledger
//! - [`replay`] - Dice logs and replay files

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod air;
pub mod battle;
pub mod bridge;
pub mod casualty;
pub mod change;
pub mod data;
pub mod decision;
pub mod dice;
pub mod error;
pub mod game_data;
pub mod game_map;
pub mod history;
pub mod ids;
pub mod math;
pub mod move_validator;
pub mod movement;
pub mod random;
pub mod replay;
pub mod resources;
pub mod state;
pub mod transport;
pub mod undo;
pub mod unit;

#[cfg(test)]
mod test_support;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::battle::scheduler::{cleanup_stranded_air, run_combat_phase, ScheduleReport};
    pub use crate::battle::{
        AttackSpec, Battle, BattleKey, BattleKind, BattleOutcome, BattleProgress, BattleRecord,
        BattleTracker, BattleType, Side,
    };
    pub use crate::bridge::Bridge;
    pub use crate::casualty::{select_casualties, CasualtyChoice, CasualtyDetails};
    pub use crate::change::Change;
    pub use crate::data::{GameRules, ScenarioData};
    pub use crate::decision::{
        DecisionKind, DecisionRequest, DecisionResponse, DefaultPlayer, RemotePlayer, RequestId,
    };
    pub use crate::dice::{DiceRoll, Die, DieType, RollContext};
    pub use crate::error::{GameError, Result};
    pub use crate::game_data::GameData;
    pub use crate::game_map::{GameMap, Route};
    pub use crate::history::History;
    pub use crate::ids::{PlayerId, TerritoryId, UnitId, UnitTypeId};
    pub use crate::math::Fixed;
    pub use crate::move_validator::{validate_move, MoveContext, MoveRequest, MoveValidationResult};
    pub use crate::movement::{MoveDelegate, MoveOutcome};
    pub use crate::random::{RandomSource, ScriptedRandomSource, SeededRandomSource};
    pub use crate::replay::{BattleReplay, RandomLog, RecordingRandomSource, ReplayRandomSource};
    pub use crate::state::GameState;
    pub use crate::transport::TransportLedger;
    pub use crate::undo::{ActionId, UndoLedger};
    pub use crate::unit::{Unit, UnitState};
}
