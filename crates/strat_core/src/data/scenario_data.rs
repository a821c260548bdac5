//! Scenario documents: rules, players, unit types, map and starting units.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::classic;
use super::map_data::{PlayerData, TerritoryData};
use super::rules::GameRules;
use super::unit_data::{UnitCatalog, UnitTypeData};
use crate::error::{GameError, Result};
use crate::game_data::{GameData, PlayerInfo};
use crate::game_map::{GameMap, TerritoryInfo};
use crate::ids::{PlayerId, TerritoryId};
use crate::state::GameState;

/// A complete starting position.
///
/// # Example RON
///
/// ```ron
/// ScenarioData(
///     name: "channel",
///     rules: (low_luck: true),
///     players: [
///         PlayerData(name: "Germany", alliance: "Axis"),
///         PlayerData(name: "Britain", alliance: "Allies"),
///     ],
///     territories: [
///         TerritoryData(name: "France", owner: Some("Germany"), adjacent: ["Channel"],
///             units: [UnitStack(owner: "Germany", unit_type: "infantry", count: 2)]),
///         TerritoryData(name: "Channel", water: true, adjacent: ["England"]),
///         TerritoryData(name: "England", owner: Some("Britain"), production: 8),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioData {
    /// Scenario name, used in error messages and replays.
    pub name: String,
    /// Rule switches.
    #[serde(default)]
    pub rules: GameRules,
    /// Players in turn order.
    pub players: Vec<PlayerData>,
    /// Unit catalog; the classic set when empty.
    #[serde(default)]
    pub unit_types: Vec<UnitTypeData>,
    /// Territories; adjacency is made symmetric.
    pub territories: Vec<TerritoryData>,
}

impl ScenarioData {
    /// Parse a scenario from RON text.
    ///
    /// # Errors
    /// Returns [`GameError::DataParseError`] on malformed input.
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "<scenario>".into(),
            message: e.to_string(),
        })
    }

    fn invalid(&self, message: String) -> GameError {
        GameError::DataParseError {
            path: self.name.clone(),
            message,
        }
    }

    /// Build the reference data and the starting board.
    ///
    /// # Errors
    /// Returns [`GameError::DataParseError`] for duplicate names or
    /// references to unknown players, unit types or territories.
    pub fn build(&self) -> Result<(GameData, GameState)> {
        let mut alliances: Vec<&str> = Vec::new();
        let mut players = Vec::with_capacity(self.players.len());
        for (index, player) in self.players.iter().enumerate() {
            if self.players[..index].iter().any(|p| p.name == player.name) {
                return Err(self.invalid(format!("duplicate player '{}'", player.name)));
            }
            let alliance = match alliances.iter().position(|a| *a == player.alliance) {
                Some(existing) => existing,
                None => {
                    alliances.push(&player.alliance);
                    alliances.len() - 1
                }
            };
            players.push(PlayerInfo {
                id: PlayerId::new(index as u32),
                name: player.name.clone(),
                alliance: alliance as u32,
            });
        }

        let unit_types = if self.unit_types.is_empty() {
            classic::unit_types()
        } else {
            self.unit_types.clone()
        };
        let units = UnitCatalog::new(unit_types);

        let mut ids: BTreeMap<&str, TerritoryId> = BTreeMap::new();
        let mut infos = Vec::with_capacity(self.territories.len());
        for (index, territory) in self.territories.iter().enumerate() {
            let id = TerritoryId::new(index as u32);
            if ids.insert(&territory.name, id).is_some() {
                return Err(self.invalid(format!("duplicate territory '{}'", territory.name)));
            }
            infos.push(TerritoryInfo {
                id,
                name: territory.name.clone(),
                water: territory.water,
                neutral: territory.neutral,
                movement_cost: territory.movement_cost.max(1),
                production: territory.production,
            });
        }

        let mut map = GameMap::new(infos);
        for (index, territory) in self.territories.iter().enumerate() {
            for neighbour in &territory.adjacent {
                let other = ids.get(neighbour.as_str()).copied().ok_or_else(|| {
                    self.invalid(format!(
                        "'{}' is adjacent to unknown territory '{neighbour}'",
                        territory.name
                    ))
                })?;
                map.connect(TerritoryId::new(index as u32), other)?;
            }
        }

        let data = GameData {
            units,
            map,
            players,
            rules: self.rules.clone(),
        };

        let mut state = GameState::new(self.territories.len());
        for (player, info) in self.players.iter().zip(&data.players) {
            state.resources_mut().set(info.id, player.resources);
        }
        for (index, territory) in self.territories.iter().enumerate() {
            let id = TerritoryId::new(index as u32);
            if let Some(owner) = &territory.owner {
                let owner = self.player_id(&data, owner)?;
                state.set_owner(id, Some(owner))?;
            }
            for stack in &territory.units {
                let owner = self.player_id(&data, &stack.owner)?;
                let unit_type = data.units.id_of(&stack.unit_type).ok_or_else(|| {
                    self.invalid(format!("unknown unit type '{}'", stack.unit_type))
                })?;
                for _ in 0..stack.count {
                    let unit = state.allocate_unit(unit_type, owner, id);
                    state.insert_unit(unit)?;
                }
            }
        }

        tracing::info!(
            scenario = %self.name,
            territories = data.map.len(),
            units = state.all_units().count(),
            "Built scenario"
        );
        Ok((data, state))
    }

    fn player_id(&self, data: &GameData, name: &str) -> Result<PlayerId> {
        data.player_id(name)
            .ok_or_else(|| self.invalid(format!("unknown player '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: &str = r#"
        ScenarioData(
            name: "channel",
            rules: (low_luck: true),
            players: [
                PlayerData(name: "Germany", alliance: "Axis", resources: 30),
                PlayerData(name: "Britain", alliance: "Allies"),
                PlayerData(name: "France", alliance: "Allies"),
            ],
            territories: [
                TerritoryData(name: "France", owner: Some("Germany"), adjacent: ["Channel"],
                    units: [UnitStack(owner: "Germany", unit_type: "infantry", count: 2)]),
                TerritoryData(name: "Channel", water: true, adjacent: ["England"]),
                TerritoryData(name: "England", owner: Some("Britain"), production: 8),
            ],
        )
    "#;

    #[test]
    fn test_build_channel() {
        let scenario = ScenarioData::from_ron(CHANNEL).unwrap();
        let (data, state) = scenario.build().unwrap();

        assert!(data.rules.low_luck);
        assert_eq!(data.units.len(), classic::unit_types().len());

        let germany = data.player_id("Germany").unwrap();
        let britain = data.player_id("Britain").unwrap();
        let france = data.player_id("France").unwrap();
        assert!(data.is_at_war(germany, britain));
        assert!(data.is_allied(britain, france));

        let france_t = data.map.id_of("France").unwrap();
        let england = data.map.id_of("England").unwrap();
        let channel = data.map.id_of("Channel").unwrap();
        assert!(data.map.are_adjacent(channel, france_t));
        assert_eq!(state.units_in(france_t).len(), 2);
        assert_eq!(state.owner(england), Some(britain));
        assert_eq!(state.owner(channel), None);
        assert_eq!(state.resources().get(germany), 30);
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_unknown_neighbour_is_rejected() {
        let mut scenario = ScenarioData::from_ron(CHANNEL).unwrap();
        scenario.territories[1].adjacent.push("Atlantis".into());
        assert!(matches!(
            scenario.build(),
            Err(GameError::DataParseError { .. })
        ));
    }

    #[test]
    fn test_unknown_unit_type_is_rejected() {
        let mut scenario = ScenarioData::from_ron(CHANNEL).unwrap();
        scenario.territories[0].units[0].unit_type = "dragon".into();
        assert!(scenario.build().is_err());
    }

    #[test]
    fn test_malformed_ron_is_a_parse_error() {
        assert!(matches!(
            ScenarioData::from_ron("ScenarioData(name: )"),
            Err(GameError::DataParseError { .. })
        ));
    }
}
