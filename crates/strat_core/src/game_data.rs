//! Read-only reference data: unit catalog, map, players and rules.

use serde::{Deserialize, Serialize};

use crate::data::{GameRules, UnitCatalog, UnitTypeData};
use crate::game_map::GameMap;
use crate::ids::{PlayerId, UnitTypeId};

/// A player and its alliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Player id.
    pub id: PlayerId,
    /// Unique name.
    pub name: String,
    /// Alliance index; players with the same index are allied.
    pub alliance: u32,
}

/// Everything the rules consult but never change during play.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameData {
    /// Unit type catalog.
    pub units: UnitCatalog,
    /// Territory graph.
    pub map: GameMap,
    /// Players in id order.
    pub players: Vec<PlayerInfo>,
    /// Rule switches.
    pub rules: GameRules,
}

impl GameData {
    /// Look up a unit type.
    #[must_use]
    pub fn unit_type(&self, id: UnitTypeId) -> &UnitTypeData {
        self.units.get(id)
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&PlayerInfo> {
        self.players.get(id.index())
    }

    /// Find a player by name.
    #[must_use]
    pub fn player_id(&self, name: &str) -> Option<PlayerId> {
        self.players.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Check if two players are on the same side. A player is allied with
    /// itself.
    #[must_use]
    pub fn is_allied(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b {
            return true;
        }
        match (self.player(a), self.player(b)) {
            (Some(pa), Some(pb)) => pa.alliance == pb.alliance,
            _ => false,
        }
    }

    /// Check if two players are enemies.
    #[must_use]
    pub fn is_at_war(&self, a: PlayerId, b: PlayerId) -> bool {
        !self.is_allied(a, b)
    }

    /// Dice sides, never less than one.
    #[must_use]
    pub fn dice_sides(&self) -> u32 {
        self.rules.dice_sides.max(1)
    }
}
