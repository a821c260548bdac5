//! Invertible board mutations.
//!
//! A [`Change`] carries enough data to undo itself: removed units keep their
//! full state and transport links, state updates keep the old value,
//! resource deltas are clamped before they are recorded. Applying a change
//! and then its [`invert`](Change::invert) restores the board exactly.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::game_data::GameData;
use crate::ids::{PlayerId, TerritoryId, UnitId};
use crate::resources::clamped_delta;
use crate::state::GameState;
use crate::transport::{TransportLink, TurnSnapshot};
use crate::unit::{Unit, UnitState};

/// One invertible mutation of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// Put units on the board with the given state and transport links.
    AddUnits {
        /// Units with their locations and state.
        units: Vec<Unit>,
        /// Ledger entries to restore.
        links: Vec<TransportLink>,
    },
    /// Take units off the board.
    RemoveUnits {
        /// Units as they were when removed.
        units: Vec<Unit>,
        /// Ledger entries that mentioned them.
        links: Vec<TransportLink>,
    },
    /// Move units between territories.
    MoveUnits {
        /// Units moving.
        units: Vec<UnitId>,
        /// Where they are.
        from: TerritoryId,
        /// Where they go.
        to: TerritoryId,
    },
    /// Replace a unit's per-turn state.
    UnitState {
        /// The unit.
        unit: UnitId,
        /// State before.
        old: UnitState,
        /// State after.
        new: UnitState,
    },
    /// Transfer a unit to another player (captured infrastructure).
    UnitOwner {
        /// The unit.
        unit: UnitId,
        /// Owner before.
        old: PlayerId,
        /// Owner after.
        new: PlayerId,
    },
    /// Change a territory's owner.
    TerritoryOwner {
        /// The territory.
        territory: TerritoryId,
        /// Owner before.
        old: Option<PlayerId>,
        /// Owner after.
        new: Option<PlayerId>,
    },
    /// Add to (or, negative, take from) a stockpile. Already clamped.
    Resource {
        /// The player.
        player: PlayerId,
        /// Clamped delta.
        delta: i32,
    },
    /// Put cargo aboard a transport.
    LoadTransport {
        /// Carrying unit.
        transport: UnitId,
        /// Its total capacity.
        capacity: u32,
        /// Carried unit.
        cargo: UnitId,
        /// Capacity consumed.
        cost: u32,
        /// Loaded onto another player's transport.
        allied: bool,
    },
    /// Reverse of [`Change::LoadTransport`].
    UndoLoadTransport {
        /// Carrying unit.
        transport: UnitId,
        /// Its total capacity.
        capacity: u32,
        /// Carried unit.
        cargo: UnitId,
        /// Capacity consumed.
        cost: u32,
        /// Loaded onto another player's transport.
        allied: bool,
    },
    /// Take cargo off a transport.
    UnloadTransport {
        /// Carrying unit.
        transport: UnitId,
        /// Carried unit.
        cargo: UnitId,
    },
    /// Reverse of [`Change::UnloadTransport`].
    UndoUnloadTransport {
        /// Carrying unit.
        transport: UnitId,
        /// Carried unit.
        cargo: UnitId,
    },
    /// Clear the ledger's per-turn sets.
    TransportEndTurn {
        /// Per-turn sets as they were.
        snapshot: TurnSnapshot,
    },
    /// Reverse of [`Change::TransportEndTurn`].
    TransportRestoreTurn {
        /// Per-turn sets to restore.
        snapshot: TurnSnapshot,
    },
    /// Several changes applied in order.
    Composite(Vec<Change>),
}

impl Change {
    /// Place new units.
    #[must_use]
    pub fn add_units(units: Vec<Unit>) -> Self {
        Self::AddUnits {
            units,
            links: Vec::new(),
        }
    }

    /// Remove units, capturing their state and transport links.
    ///
    /// # Errors
    /// Returns [`GameError::UnknownUnit`] if a unit is not on the board.
    pub fn remove_units(state: &GameState, ids: &[UnitId]) -> Result<Self> {
        let units = ids
            .iter()
            .map(|id| state.require_unit(*id).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::RemoveUnits {
            units,
            links: state.transports().links_of(ids),
        })
    }

    /// Move units.
    #[must_use]
    pub fn move_units(units: Vec<UnitId>, from: TerritoryId, to: TerritoryId) -> Self {
        Self::MoveUnits { units, from, to }
    }

    /// Update a unit's state through `edit`.
    ///
    /// # Errors
    /// Returns [`GameError::UnknownUnit`] if the unit is not on the board.
    pub fn unit_state<F>(state: &GameState, unit: UnitId, edit: F) -> Result<Self>
    where
        F: FnOnce(&mut UnitState),
    {
        let old = state.require_unit(unit)?.state;
        let mut new = old;
        edit(&mut new);
        Ok(Self::UnitState { unit, old, new })
    }

    /// Change a territory's owner.
    #[must_use]
    pub fn territory_owner(state: &GameState, territory: TerritoryId, new: Option<PlayerId>) -> Self {
        Self::TerritoryOwner {
            territory,
            old: state.owner(territory),
            new,
        }
    }

    /// Take a territory for `player`, capturing the enemy infrastructure in
    /// it.
    #[must_use]
    pub fn conquer(data: &GameData, state: &GameState, territory: TerritoryId, player: PlayerId) -> Self {
        let mut changes = vec![Self::territory_owner(state, territory, Some(player))];
        for id in state.units_in_matching(territory, |u| {
            data.is_at_war(player, u.owner) && data.unit_type(u.unit_type).is_infrastructure
        }) {
            if let Some(unit) = state.unit(id) {
                changes.push(Self::UnitOwner {
                    unit: id,
                    old: unit.owner,
                    new: player,
                });
            }
        }
        Self::composite(changes)
    }

    /// Resource delta clamped so the stockpile stays non-negative.
    #[must_use]
    pub fn resource(state: &GameState, player: PlayerId, delta: i32) -> Self {
        Self::Resource {
            player,
            delta: clamped_delta(state.resources().get(player), delta),
        }
    }

    /// Bundle changes, dropping empty composites.
    #[must_use]
    pub fn composite(changes: Vec<Change>) -> Self {
        let changes: Vec<Change> = changes.into_iter().filter(|c| !c.is_empty()).collect();
        Self::Composite(changes)
    }

    /// Check if the change does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Composite(changes) => changes.iter().all(Self::is_empty),
            Self::AddUnits { units, .. } | Self::RemoveUnits { units, .. } => units.is_empty(),
            Self::MoveUnits { units, .. } => units.is_empty(),
            Self::Resource { delta, .. } => *delta == 0,
            Self::UnitState { old, new, .. } => old == new,
            _ => false,
        }
    }

    /// The change that undoes this one.
    #[must_use]
    pub fn invert(&self) -> Self {
        match self {
            Self::AddUnits { units, links } => Self::RemoveUnits {
                units: units.clone(),
                links: links.clone(),
            },
            Self::RemoveUnits { units, links } => Self::AddUnits {
                units: units.clone(),
                links: links.clone(),
            },
            Self::MoveUnits { units, from, to } => Self::MoveUnits {
                units: units.clone(),
                from: *to,
                to: *from,
            },
            Self::UnitState { unit, old, new } => Self::UnitState {
                unit: *unit,
                old: *new,
                new: *old,
            },
            Self::UnitOwner { unit, old, new } => Self::UnitOwner {
                unit: *unit,
                old: *new,
                new: *old,
            },
            Self::TerritoryOwner {
                territory,
                old,
                new,
            } => Self::TerritoryOwner {
                territory: *territory,
                old: *new,
                new: *old,
            },
            Self::Resource { player, delta } => Self::Resource {
                player: *player,
                delta: -delta,
            },
            Self::LoadTransport {
                transport,
                capacity,
                cargo,
                cost,
                allied,
            } => Self::UndoLoadTransport {
                transport: *transport,
                capacity: *capacity,
                cargo: *cargo,
                cost: *cost,
                allied: *allied,
            },
            Self::UndoLoadTransport {
                transport,
                capacity,
                cargo,
                cost,
                allied,
            } => Self::LoadTransport {
                transport: *transport,
                capacity: *capacity,
                cargo: *cargo,
                cost: *cost,
                allied: *allied,
            },
            Self::UnloadTransport { transport, cargo } => Self::UndoUnloadTransport {
                transport: *transport,
                cargo: *cargo,
            },
            Self::UndoUnloadTransport { transport, cargo } => Self::UnloadTransport {
                transport: *transport,
                cargo: *cargo,
            },
            Self::TransportEndTurn { snapshot } => Self::TransportRestoreTurn {
                snapshot: snapshot.clone(),
            },
            Self::TransportRestoreTurn { snapshot } => Self::TransportEndTurn {
                snapshot: snapshot.clone(),
            },
            Self::Composite(changes) => {
                Self::Composite(changes.iter().rev().map(Self::invert).collect())
            }
        }
    }

    /// Apply to the board.
    ///
    /// A composite either applies completely or, on the first failure,
    /// rolls back what it already applied and returns the error.
    ///
    /// # Errors
    /// Returns an error if the change does not match the board.
    pub fn apply(&self, state: &mut GameState) -> Result<()> {
        match self {
            Self::AddUnits { units, links } => {
                for unit in units {
                    state.insert_unit(unit.clone())?;
                }
                state.transports_mut().attach(links)
            }
            Self::RemoveUnits { units, .. } => {
                let ids: Vec<UnitId> = units.iter().map(|u| u.id).collect();
                for id in &ids {
                    state.require_unit(*id)?;
                }
                state.transports_mut().detach(&ids);
                for id in ids {
                    state.remove_unit(id)?;
                }
                Ok(())
            }
            Self::MoveUnits { units, from, to } => {
                for unit in units {
                    state.relocate(*unit, *from, *to)?;
                }
                Ok(())
            }
            Self::UnitState { unit, old, new } => {
                let current = state.require_unit(*unit)?.state;
                if current != *old {
                    return Err(GameError::InvariantViolation(format!(
                        "{unit} state changed underneath a recorded change"
                    )));
                }
                state.set_unit_state(*unit, *new)
            }
            Self::UnitOwner { unit, old, new } => {
                let current = state.require_unit(*unit)?.owner;
                if current != *old {
                    return Err(GameError::InvariantViolation(format!(
                        "{unit} is owned by {current}, expected {old}"
                    )));
                }
                state.set_unit_owner(*unit, *new)
            }
            Self::TerritoryOwner {
                territory,
                old,
                new,
            } => {
                if state.owner(*territory) != *old {
                    return Err(GameError::InvariantViolation(format!(
                        "{territory} owner changed underneath a recorded change"
                    )));
                }
                state.set_owner(*territory, *new)
            }
            Self::Resource { player, delta } => {
                state.resources_mut().apply(*player, *delta);
                Ok(())
            }
            Self::LoadTransport {
                transport,
                capacity,
                cargo,
                cost,
                allied,
            } => state
                .transports_mut()
                .load(*transport, *capacity, *cargo, *cost, *allied),
            Self::UndoLoadTransport { cargo, .. } => {
                state.transports_mut().undo_load(*cargo).map(|_| ())
            }
            Self::UnloadTransport { transport, cargo } => {
                let from = state.transports_mut().unload(*cargo)?;
                if from != *transport {
                    return Err(GameError::InvariantViolation(format!(
                        "{cargo} was aboard {from}, expected {transport}"
                    )));
                }
                Ok(())
            }
            Self::UndoUnloadTransport { transport, cargo } => {
                state.transports_mut().undo_unload(*transport, *cargo)
            }
            Self::TransportEndTurn { .. } => {
                state.transports_mut().end_turn();
                Ok(())
            }
            Self::TransportRestoreTurn { snapshot } => {
                state.transports_mut().restore_turn(snapshot);
                Ok(())
            }
            Self::Composite(changes) => {
                for (applied, change) in changes.iter().enumerate() {
                    if let Err(err) = change.apply(state) {
                        for done in changes[..applied].iter().rev() {
                            if let Err(rollback) = done.invert().apply(state) {
                                tracing::warn!(%rollback, "Rollback of partial change failed");
                            }
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }
}
