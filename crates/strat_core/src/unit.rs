//! Units on the board.

use serde::{Deserialize, Serialize};

use crate::ids::{PlayerId, TerritoryId, UnitId, UnitTypeId};

/// Per-turn and per-battle state of a unit.
///
/// Changed only through [`Change::UnitState`](crate::change::Change), which
/// records both the old and the new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitState {
    /// Movement spent this turn.
    pub moved: u32,
    /// Damage taken.
    pub hits: u32,
    /// Submerged submarine, out of the current battle.
    pub submerged: bool,
    /// Landed from a transport into a battle this turn.
    pub was_amphibious: bool,
    /// Took part in a battle this turn.
    pub was_in_combat: bool,
    /// Territory this unit was unloaded into this turn.
    pub unloaded_to: Option<TerritoryId>,
}

/// A unit instance.
///
/// The transport carrying a unit is tracked by the
/// [`TransportLedger`](crate::transport::TransportLedger), not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Unit id.
    pub id: UnitId,
    /// Unit type.
    pub unit_type: UnitTypeId,
    /// Owning player.
    pub owner: PlayerId,
    /// Territory the unit is in.
    pub location: TerritoryId,
    /// Mutable state.
    pub state: UnitState,
}

impl Unit {
    /// Create a fresh unit.
    #[must_use]
    pub fn new(id: UnitId, unit_type: UnitTypeId, owner: PlayerId, location: TerritoryId) -> Self {
        Self {
            id,
            unit_type,
            owner,
            location,
            state: UnitState::default(),
        }
    }
}
