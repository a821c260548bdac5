//! Scenario loading and configuration.
//!
//! A headless scenario is a starting position (the engine's
//! [`ScenarioData`]) plus a script of move orders. Orders name units by type
//! and count; the runner picks concrete units when the order is played.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use strat_core::data::ScenarioData;
use strat_core::error::GameError;
use strat_core::game_data::GameData;
use strat_core::game_map::Route;
use strat_core::ids::{PlayerId, UnitId};
use strat_core::move_validator::MoveRequest;
use strat_core::state::GameState;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// An order names a player, territory or unit type the setup lacks.
    #[error("Order {order}: unknown {kind} '{name}'")]
    UnknownName {
        /// Index of the order.
        order: usize,
        /// What was looked up.
        kind: &'static str,
        /// The name that was not found.
        name: String,
    },
    /// The engine refused.
    #[error("Engine error: {0}")]
    Engine(#[from] GameError),
}

/// Units of one type in a move order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedUnits {
    /// Unit type name.
    pub unit_type: String,
    /// How many.
    #[serde(default = "default_count")]
    pub count: u32,
}

const fn default_count() -> u32 {
    1
}

/// One scripted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOrder {
    /// Moving player's name.
    pub player: String,
    /// Territory names from start to end.
    pub route: Vec<String>,
    /// Units to move from the route's start.
    pub units: Vec<OrderedUnits>,
    /// Played in the non-combat phase.
    #[serde(default)]
    pub non_combat: bool,
}

/// A complete headless scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Starting position.
    pub setup: ScenarioData,
    /// Orders in play order. Consecutive orders of one player form a turn.
    #[serde(default)]
    pub orders: Vec<MoveOrder>,
}

/// An order resolved against the current board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    /// Moving player.
    pub player: PlayerId,
    /// The engine request.
    pub request: MoveRequest,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.setup.name
    }

    /// Build the reference data and starting board.
    pub fn build(&self) -> Result<(GameData, GameState), ScenarioError> {
        Ok(self.setup.build()?)
    }

    /// Check every name an order uses.
    pub fn check_orders(&self, data: &GameData) -> Result<(), ScenarioError> {
        for (index, order) in self.orders.iter().enumerate() {
            lookup_player(data, index, &order.player)?;
            lookup_route(data, index, &order.route)?;
            for units in &order.units {
                if data.units.id_of(&units.unit_type).is_none() {
                    return Err(unknown(index, "unit type", &units.unit_type));
                }
            }
        }
        Ok(())
    }

    /// Resolve order `index` against the board: the lowest-id units of each
    /// type that stand at the route's start and can still move. Cargo aboard
    /// a transport always qualifies.
    ///
    /// Returns `Ok(Err(message))` when the board lacks the units, which the
    /// runner reports as a rejected move.
    pub fn resolve(
        &self,
        index: usize,
        data: &GameData,
        state: &GameState,
    ) -> Result<Result<ResolvedOrder, String>, ScenarioError> {
        let Some(order) = self.orders.get(index) else {
            return Err(unknown(index, "order", &index.to_string()));
        };
        let player = lookup_player(data, index, &order.player)?;
        let route = lookup_route(data, index, &order.route)?;
        let start = route.start();

        let mut units: Vec<UnitId> = Vec::new();
        for wanted in &order.units {
            let unit_type = data
                .units
                .id_of(&wanted.unit_type)
                .ok_or_else(|| unknown(index, "unit type", &wanted.unit_type))?;
            let available: Vec<UnitId> = state.units_in_matching(start, |u| {
                u.owner == player
                    && u.unit_type == unit_type
                    && !units.contains(&u.id)
                    && (u.state.moved < data.unit_type(u.unit_type).movement
                        || state.transports().transported_by(u.id).is_some())
            });
            if (available.len() as u64) < u64::from(wanted.count) {
                return Ok(Err(format!(
                    "only {} {} available in {}",
                    available.len(),
                    wanted.unit_type,
                    order.route[0]
                )));
            }
            units.extend(available.into_iter().take(wanted.count as usize));
        }
        Ok(Ok(ResolvedOrder {
            player,
            request: MoveRequest::new(units, route),
        }))
    }
}

fn unknown(order: usize, kind: &'static str, name: &str) -> ScenarioError {
    ScenarioError::UnknownName {
        order,
        kind,
        name: name.to_string(),
    }
}

fn lookup_player(data: &GameData, order: usize, name: &str) -> Result<PlayerId, ScenarioError> {
    data.player_id(name).ok_or_else(|| unknown(order, "player", name))
}

fn lookup_route(data: &GameData, order: usize, names: &[String]) -> Result<Route, ScenarioError> {
    if names.is_empty() {
        return Err(unknown(order, "route", ""));
    }
    let territories = names
        .iter()
        .map(|name| {
            data.map
                .id_of(name)
                .ok_or_else(|| unknown(order, "territory", name))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Route::new(territories))
}
