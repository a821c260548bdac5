//! Reversible actions of the current turn.
//!
//! Every move and placement is recorded with the change it applied. An
//! action may be undone only while no later action depends on it and no
//! irreversible event vetoed it: AA fire during the move, or a battle it
//! joined having started or been fought. Actions live in an arena; links
//! between them are index sets, so undoing from the middle of the turn is
//! cheap to check.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::battle::{BattleKey, BattleTracker};
use crate::bridge::Bridge;
use crate::change::Change;
use crate::error::{GameError, Result};
use crate::game_map::Route;
use crate::ids::{PlayerId, TerritoryId, UnitId};

/// Index of an action in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub usize);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// What an action was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Units moved along a route.
    Move {
        /// The route.
        route: Route,
        /// Transports that took on cargo.
        loaded: Vec<UnitId>,
        /// Transports that put cargo ashore.
        unloaded: Vec<UnitId>,
        /// Territories the move took without a fight.
        conquered: Vec<TerritoryId>,
        /// Battles the move joined.
        battles: Vec<BattleKey>,
    },
    /// Units placed.
    Placement {
        /// Where.
        territory: TerritoryId,
    },
}

/// A recorded action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoableAction {
    /// Ledger index.
    pub id: ActionId,
    /// Acting player.
    pub player: PlayerId,
    /// Units involved.
    pub units: Vec<UnitId>,
    /// Change applied; undo applies its inverse.
    pub change: Change,
    /// Move or placement details.
    pub kind: ActionKind,
    /// Human-readable description.
    pub description: String,
    depends_on: BTreeSet<ActionId>,
    dependents: BTreeSet<ActionId>,
    veto: Option<String>,
}

impl UndoableAction {
    /// Earlier actions this one depends on.
    #[must_use]
    pub fn depends_on(&self) -> Vec<ActionId> {
        self.depends_on.iter().copied().collect()
    }

    /// Later actions that depend on this one.
    #[must_use]
    pub fn dependents(&self) -> Vec<ActionId> {
        self.dependents.iter().copied().collect()
    }

    /// Why undo is forbidden, if it is.
    #[must_use]
    pub fn veto(&self) -> Option<&str> {
        self.veto.as_deref()
    }

    fn touched_transports(&self) -> BTreeSet<UnitId> {
        let mut touched: BTreeSet<UnitId> = self.units.iter().copied().collect();
        if let ActionKind::Move {
            loaded, unloaded, ..
        } = &self.kind
        {
            touched.extend(loaded.iter().copied());
            touched.extend(unloaded.iter().copied());
        }
        touched
    }

    fn conquered(&self) -> &[TerritoryId] {
        match &self.kind {
            ActionKind::Move { conquered, .. } => conquered,
            ActionKind::Placement { .. } => &[],
        }
    }

    /// Check if `later` could not stand without this action.
    fn supports(&self, later: &UndoableAction) -> bool {
        let units: BTreeSet<UnitId> = self.units.iter().copied().collect();
        if later.units.iter().any(|u| units.contains(u)) {
            return true;
        }
        let ActionKind::Move {
            route,
            loaded,
            unloaded,
            ..
        } = &later.kind
        else {
            return false;
        };
        if loaded.iter().any(|t| units.contains(t)) {
            return true;
        }
        if self.conquered().iter().any(|t| route.enters(*t)) {
            return true;
        }
        let touched = self.touched_transports();
        unloaded.iter().any(|t| touched.contains(t))
    }
}

/// Input to [`UndoLedger::record_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    /// Moving player.
    pub player: PlayerId,
    /// Units moved, cargo included.
    pub units: Vec<UnitId>,
    /// The route.
    pub route: Route,
    /// The composite change the move applied.
    pub change: Change,
    /// Transports that took on cargo.
    pub loaded: Vec<UnitId>,
    /// Transports that put cargo ashore.
    pub unloaded: Vec<UnitId>,
    /// Territories taken without a fight.
    pub conquered: Vec<TerritoryId>,
    /// Battles joined.
    pub battles: Vec<BattleKey>,
    /// Description for the history.
    pub description: String,
}

/// Actions of the current turn, with their dependencies.
#[derive(Debug, Clone, Default)]
pub struct UndoLedger {
    actions: Vec<Option<UndoableAction>>,
}

impl UndoLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, mut action: UndoableAction) -> ActionId {
        let id = ActionId(self.actions.len());
        action.id = id;
        for earlier in self.actions.iter_mut().flatten() {
            if earlier.supports(&action) {
                earlier.dependents.insert(id);
                action.depends_on.insert(earlier.id);
            }
        }
        tracing::debug!(
            action = %id,
            depends_on = ?action.depends_on,
            "Recorded undoable action"
        );
        self.actions.push(Some(action));
        id
    }

    /// Record a performed move.
    pub fn record_move(&mut self, record: MoveRecord) -> ActionId {
        self.push(UndoableAction {
            id: ActionId(0),
            player: record.player,
            units: record.units,
            change: record.change,
            kind: ActionKind::Move {
                route: record.route,
                loaded: record.loaded,
                unloaded: record.unloaded,
                conquered: record.conquered,
                battles: record.battles,
            },
            description: record.description,
            depends_on: BTreeSet::new(),
            dependents: BTreeSet::new(),
            veto: None,
        })
    }

    /// Record a placement.
    pub fn record_placement(
        &mut self,
        player: PlayerId,
        territory: TerritoryId,
        units: Vec<UnitId>,
        change: Change,
        description: impl Into<String>,
    ) -> ActionId {
        self.push(UndoableAction {
            id: ActionId(0),
            player,
            units,
            change,
            kind: ActionKind::Placement { territory },
            description: description.into(),
            depends_on: BTreeSet::new(),
            dependents: BTreeSet::new(),
            veto: None,
        })
    }

    /// Forbid undoing an action.
    pub fn set_veto(&mut self, id: ActionId, reason: impl Into<String>) {
        if let Some(Some(action)) = self.actions.get_mut(id.0) {
            action.veto = Some(reason.into());
        }
    }

    /// A live action.
    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<&UndoableAction> {
        self.actions.get(id.0).and_then(Option::as_ref)
    }

    /// Live actions in the order they happened.
    pub fn actions(&self) -> impl Iterator<Item = &UndoableAction> {
        self.actions.iter().flatten()
    }

    /// Number of live actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions().count()
    }

    /// Check if nothing can be undone.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether an action may be undone.
    ///
    /// # Errors
    /// Returns [`GameError::UndoNotAllowed`] naming the reason.
    pub fn can_undo(&self, id: ActionId, tracker: &BattleTracker) -> Result<()> {
        let refuse = |reason: String| {
            Err(GameError::UndoNotAllowed {
                action: id.0,
                reason,
            })
        };
        let Some(action) = self.get(id) else {
            return refuse("no such action".into());
        };
        if let Some(veto) = &action.veto {
            return refuse(veto.clone());
        }
        if !action.dependents.is_empty() {
            return refuse(format!(
                "later actions depend on it: {:?}",
                action.dependents()
            ));
        }
        if let ActionKind::Move { battles, .. } = &action.kind {
            if battles
                .iter()
                .any(|b| tracker.battle(*b).is_some_and(crate::battle::Battle::is_started))
            {
                return refuse("its battle has already begun".into());
            }
            if let Some(fought) = battles.iter().find(|b| tracker.has_fought(**b)) {
                return refuse(format!("its battle in {} has been fought", fought.territory));
            }
        }
        Ok(())
    }

    /// Undo an action: apply the inverse change, withdraw its attacks and
    /// restore the conquest bookkeeping.
    ///
    /// # Errors
    /// Returns [`GameError::UndoNotAllowed`] if [`can_undo`](Self::can_undo)
    /// refuses, or the change application error.
    pub fn undo(&mut self, id: ActionId, bridge: &mut Bridge<'_>, tracker: &mut BattleTracker) -> Result<()> {
        self.can_undo(id, tracker)?;
        if let Some(lost) = self
            .get(id)
            .and_then(|a| a.units.iter().find(|u| !bridge.state().contains_unit(**u)))
        {
            return Err(GameError::UndoNotAllowed {
                action: id.0,
                reason: format!("{lost} is no longer on the board"),
            });
        }
        let Some(action) = self.actions.get_mut(id.0).and_then(Option::take) else {
            return Err(GameError::UndoNotAllowed {
                action: id.0,
                reason: "no such action".into(),
            });
        };
        bridge.start_event(format!("Undo: {}", action.description));
        if let Err(err) = bridge.add_change(action.change.invert()) {
            self.actions[id.0] = Some(action);
            return Err(err);
        }
        if let ActionKind::Move {
            conquered, battles, ..
        } = &action.kind
        {
            for battle in battles {
                tracker.remove_attack(*battle, &action.units);
            }
            for territory in conquered {
                tracker.unmark_conquered(*territory);
            }
        }
        for earlier in &action.depends_on {
            if let Some(Some(earlier)) = self.actions.get_mut(earlier.0) {
                earlier.dependents.remove(&id);
            }
        }
        tracing::info!(action = %id, player = %action.player, "Undid action");
        Ok(())
    }

    /// Forget the turn's actions; nothing before this point can be undone.
    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::{AttackSpec, BattleType};
    use crate::random::ScriptedRandomSource;
    use crate::test_support::{classic_world, TestWorld};

    fn walk(world: &mut TestWorld, units: &[UnitId], from: TerritoryId, to: TerritoryId) -> MoveRecord {
        let change = Change::move_units(units.to_vec(), from, to);
        let mut random = ScriptedRandomSource::failing();
        world.bridge(&mut random).add_change(change.clone()).unwrap();
        MoveRecord {
            player: world.attacker,
            units: units.to_vec(),
            route: Route::new(vec![from, to]),
            change,
            loaded: Vec::new(),
            unloaded: Vec::new(),
            conquered: Vec::new(),
            battles: Vec::new(),
            description: format!("move to {to}"),
        }
    }

    #[test]
    fn test_shared_unit_blocks_earlier_undo() {
        let mut world = classic_world(false);
        let infantry = world.place(world.attacker, world.rear, "infantry");
        let (rear, home, land) = (world.rear, world.home, world.land);
        let mut ledger = UndoLedger::new();
        let mut tracker = BattleTracker::new();

        let first = ledger.record_move(walk(&mut world, &[infantry], rear, home));
        let second = ledger.record_move(walk(&mut world, &[infantry], home, land));
        assert_eq!(ledger.get(second).unwrap().depends_on(), vec![first]);

        let mut random = ScriptedRandomSource::failing();
        let err = ledger
            .undo(first, &mut world.bridge(&mut random), &mut tracker)
            .unwrap_err();
        assert!(matches!(err, GameError::UndoNotAllowed { action: 0, .. }));

        ledger.undo(second, &mut world.bridge(&mut random), &mut tracker).unwrap();
        ledger.undo(first, &mut world.bridge(&mut random), &mut tracker).unwrap();
        assert_eq!(world.state.unit(infantry).unwrap().location, rear);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_unrelated_moves_undo_in_any_order() {
        let mut world = classic_world(false);
        let a = world.place(world.attacker, world.rear, "infantry");
        let b = world.place(world.attacker, world.home, "armour");
        let (rear, home) = (world.rear, world.home);
        let mut ledger = UndoLedger::new();
        let mut tracker = BattleTracker::new();

        let first = ledger.record_move(walk(&mut world, &[a], rear, home));
        ledger.record_move(walk(&mut world, &[b], home, rear));

        let mut random = ScriptedRandomSource::failing();
        ledger.undo(first, &mut world.bridge(&mut random), &mut tracker).unwrap();
        assert_eq!(world.state.unit(a).unwrap().location, rear);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_route_through_conquest_depends_on_it() {
        let mut world = classic_world(false);
        let armour = world.place(world.attacker, world.home, "armour");
        let follower = world.place(world.attacker, world.home, "infantry");
        let (home, land) = (world.home, world.land);
        let mut ledger = UndoLedger::new();

        let mut conquest = walk(&mut world, &[armour], home, land);
        conquest.conquered = vec![land];
        let first = ledger.record_move(conquest);
        let second = ledger.record_move(walk(&mut world, &[follower], home, land));

        assert_eq!(ledger.get(first).unwrap().dependents(), vec![second]);
    }

    #[test]
    fn test_veto_forbids_undo() {
        let mut world = classic_world(false);
        let fighter = world.place(world.attacker, world.home, "fighter");
        let (home, land) = (world.home, world.land);
        let mut ledger = UndoLedger::new();
        let tracker = BattleTracker::new();

        let id = ledger.record_move(walk(&mut world, &[fighter], home, land));
        ledger.set_veto(id, "AA fired on the move");
        let err = ledger.can_undo(id, &tracker).unwrap_err();
        assert!(err.to_string().contains("AA fired"));
    }

    #[test]
    fn test_undo_withdraws_attack_and_drops_empty_battle() {
        let mut world = classic_world(false);
        world.place(world.defender, world.land, "infantry");
        let armour = world.place(world.attacker, world.home, "armour");
        let (attacker, home, land) = (world.attacker, world.home, world.land);
        let mut ledger = UndoLedger::new();
        let mut tracker = BattleTracker::new();

        let mut record = walk(&mut world, &[armour], home, land);
        let key = tracker
            .add_attack(
                &world.data,
                &world.state,
                &AttackSpec {
                    attacker,
                    territory: land,
                    battle_type: BattleType::Normal,
                    units: vec![armour],
                    from: home,
                    amphibious: Vec::new(),
                },
            )
            .unwrap();
        record.battles = vec![key];
        let id = ledger.record_move(record);

        let mut random = ScriptedRandomSource::failing();
        ledger.undo(id, &mut world.bridge(&mut random), &mut tracker).unwrap();
        assert!(tracker.is_empty());
        assert_eq!(world.state.unit(armour).unwrap().location, home);
    }
}
