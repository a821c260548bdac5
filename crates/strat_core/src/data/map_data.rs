//! Territory and player definitions as they appear in scenario files.

use serde::{Deserialize, Serialize};

/// A group of identical units placed at scenario start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStack {
    /// Owning player's name.
    pub owner: String,
    /// Unit type name.
    pub unit_type: String,
    /// How many units.
    #[serde(default = "default_count")]
    pub count: u32,
}

const fn default_count() -> u32 {
    1
}

const fn default_movement_cost() -> u32 {
    1
}

/// One territory of the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryData {
    /// Unique territory name.
    pub name: String,
    /// Sea zone.
    #[serde(default)]
    pub water: bool,
    /// Neutral land. While unowned it is closed to non-combat moves, and to
    /// every move if the rules say so.
    #[serde(default)]
    pub neutral: bool,
    /// Movement points a land unit spends to enter.
    #[serde(default = "default_movement_cost")]
    pub movement_cost: u32,
    /// Production value; the ceiling for strategic bombing damage.
    #[serde(default)]
    pub production: u32,
    /// Names of adjacent territories. Adjacency is made symmetric on load.
    #[serde(default)]
    pub adjacent: Vec<String>,
    /// Owning player's name.
    #[serde(default)]
    pub owner: Option<String>,
    /// Units present at start.
    #[serde(default)]
    pub units: Vec<UnitStack>,
}

impl TerritoryData {
    /// Create a land territory with no neighbours.
    #[must_use]
    pub fn land(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            water: false,
            neutral: false,
            movement_cost: 1,
            production: 0,
            adjacent: Vec::new(),
            owner: None,
            units: Vec::new(),
        }
    }

    /// Create a sea zone with no neighbours.
    #[must_use]
    pub fn sea(name: impl Into<String>) -> Self {
        Self {
            water: true,
            ..Self::land(name)
        }
    }
}

/// A player and the alliance it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerData {
    /// Unique player name.
    pub name: String,
    /// Alliance name; players sharing it are allied.
    pub alliance: String,
    /// Starting resource stockpile.
    #[serde(default)]
    pub resources: i32,
}
