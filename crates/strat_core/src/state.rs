//! Mutable board state.
//!
//! Everything here changes only by applying a [`Change`](crate::change::Change)
//! through a [`Bridge`](crate::bridge::Bridge). Read accessors return copies
//! or shared references; the mutators are crate-private.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use crate::error::{GameError, Result};
use crate::ids::{PlayerId, TerritoryId, UnitId, UnitTypeId};
use crate::resources::Resources;
use crate::transport::TransportLedger;
use crate::unit::{Unit, UnitState};

/// Owner and occupants of one territory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerritoryState {
    owner: Option<PlayerId>,
    units: BTreeSet<UnitId>,
}

impl TerritoryState {
    /// Owning player, `None` for water and unowned neutrals.
    #[must_use]
    pub const fn owner(&self) -> Option<PlayerId> {
        self.owner
    }

    /// Units present, in id order.
    #[must_use]
    pub fn units(&self) -> Vec<UnitId> {
        self.units.iter().copied().collect()
    }
}

/// The whole mutable board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameState {
    territories: Vec<TerritoryState>,
    units: BTreeMap<UnitId, Unit>,
    next_unit_id: u32,
    resources: Resources,
    transports: TransportLedger,
}

impl GameState {
    /// Create an empty board with `territory_count` territories.
    #[must_use]
    pub fn new(territory_count: usize) -> Self {
        Self {
            territories: vec![TerritoryState::default(); territory_count],
            ..Self::default()
        }
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Look up a unit that must exist.
    ///
    /// # Errors
    /// Returns [`GameError::UnknownUnit`] if it is not on the board.
    pub fn require_unit(&self, id: UnitId) -> Result<&Unit> {
        self.units.get(&id).ok_or(GameError::UnknownUnit(id))
    }

    /// Check if a unit is on the board.
    #[must_use]
    pub fn contains_unit(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// All units in id order.
    pub fn all_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Units present in a territory, in id order.
    #[must_use]
    pub fn units_in(&self, territory: TerritoryId) -> Vec<UnitId> {
        self.territories
            .get(territory.index())
            .map(TerritoryState::units)
            .unwrap_or_default()
    }

    /// Units in a territory matching a predicate, in id order.
    #[must_use]
    pub fn units_in_matching<F>(&self, territory: TerritoryId, predicate: F) -> Vec<UnitId>
    where
        F: Fn(&Unit) -> bool,
    {
        self.territories
            .get(territory.index())
            .map(|t| {
                t.units
                    .iter()
                    .filter_map(|id| self.units.get(id))
                    .filter(|unit| predicate(unit))
                    .map(|unit| unit.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Owner of a territory.
    #[must_use]
    pub fn owner(&self, territory: TerritoryId) -> Option<PlayerId> {
        self.territories
            .get(territory.index())
            .and_then(TerritoryState::owner)
    }

    /// Number of territories.
    #[must_use]
    pub fn territory_count(&self) -> usize {
        self.territories.len()
    }

    /// Resource stockpiles.
    #[must_use]
    pub const fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Transport ledger.
    #[must_use]
    pub const fn transports(&self) -> &TransportLedger {
        &self.transports
    }

    /// Mint a new unit. The unit is not on the board until an
    /// `AddUnits` change places it.
    pub fn allocate_unit(
        &mut self,
        unit_type: UnitTypeId,
        owner: PlayerId,
        location: TerritoryId,
    ) -> Unit {
        let id = UnitId::new(self.next_unit_id);
        self.next_unit_id += 1;
        Unit::new(id, unit_type, owner, location)
    }

    fn territory_mut(&mut self, territory: TerritoryId) -> Result<&mut TerritoryState> {
        self.territories
            .get_mut(territory.index())
            .ok_or(GameError::UnknownTerritory(territory))
    }

    fn unit_mut(&mut self, id: UnitId) -> Result<&mut Unit> {
        self.units.get_mut(&id).ok_or(GameError::UnknownUnit(id))
    }

    pub(crate) fn insert_unit(&mut self, unit: Unit) -> Result<()> {
        if self.units.contains_key(&unit.id) {
            return Err(GameError::InvariantViolation(format!(
                "{} is already on the board",
                unit.id
            )));
        }
        self.territory_mut(unit.location)?.units.insert(unit.id);
        self.next_unit_id = self.next_unit_id.max(unit.id.0 + 1);
        self.units.insert(unit.id, unit);
        Ok(())
    }

    pub(crate) fn remove_unit(&mut self, id: UnitId) -> Result<Unit> {
        let unit = self.units.remove(&id).ok_or(GameError::UnknownUnit(id))?;
        self.territory_mut(unit.location)?.units.remove(&id);
        Ok(unit)
    }

    pub(crate) fn relocate(&mut self, id: UnitId, from: TerritoryId, to: TerritoryId) -> Result<()> {
        let location = self.require_unit(id)?.location;
        if location != from {
            return Err(GameError::InvariantViolation(format!(
                "{id} is in {location}, not {from}"
            )));
        }
        self.territory_mut(to)?;
        self.territory_mut(from)?.units.remove(&id);
        self.territory_mut(to)?.units.insert(id);
        self.unit_mut(id)?.location = to;
        Ok(())
    }

    pub(crate) fn set_unit_state(&mut self, id: UnitId, state: UnitState) -> Result<()> {
        self.unit_mut(id)?.state = state;
        Ok(())
    }

    pub(crate) fn set_unit_owner(&mut self, id: UnitId, owner: PlayerId) -> Result<()> {
        self.unit_mut(id)?.owner = owner;
        Ok(())
    }

    pub(crate) fn set_owner(&mut self, territory: TerritoryId, owner: Option<PlayerId>) -> Result<()> {
        self.territory_mut(territory)?.owner = owner;
        Ok(())
    }

    pub(crate) fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    pub(crate) fn transports_mut(&mut self) -> &mut TransportLedger {
        &mut self.transports
    }

    /// Check that every unit's declared location matches exactly one
    /// territory's unit collection, and that the transport ledger is
    /// consistent.
    ///
    /// # Errors
    /// Returns [`GameError::InvariantViolation`] on the first mismatch.
    pub fn check_invariants(&self) -> Result<()> {
        let mut placed = 0usize;
        for (index, territory) in self.territories.iter().enumerate() {
            for id in &territory.units {
                let unit = self.require_unit(*id)?;
                if unit.location.index() != index {
                    return Err(GameError::InvariantViolation(format!(
                        "{id} is listed in territory {index} but located in {}",
                        unit.location
                    )));
                }
                placed += 1;
            }
        }
        if placed != self.units.len() {
            return Err(GameError::InvariantViolation(format!(
                "{} units on the board, {placed} placed in territories",
                self.units.len()
            )));
        }
        self.transports.check_invariants()
    }

    /// Deterministic hash of the whole board.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Serialize the board to bytes.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize state: {e}")))
    }

    /// Deserialize a board from bytes.
    ///
    /// # Errors
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize state: {e}")))
    }
}

/// Owner-keyed view used by battle and movement code.
#[must_use]
pub fn group_by_owner(state: &GameState, units: &[UnitId]) -> BTreeMap<PlayerId, Vec<UnitId>> {
    let mut groups: BTreeMap<PlayerId, Vec<UnitId>> = BTreeMap::new();
    for id in units {
        if let Some(unit) = state.unit(*id) {
            groups.entry(unit.owner).or_default().push(*id);
        }
    }
    groups
}
