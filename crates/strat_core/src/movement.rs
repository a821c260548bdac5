//! Executing moves and placements.
//!
//! The [`MoveDelegate`] turns a validated [`MoveRequest`] into one
//! composite [`Change`]: the move itself, spent movement, transport loads
//! and unloads, and territory taken on the way. It then fires fly-over AA,
//! registers attacks with the [`BattleTracker`] and records the move in the
//! [`UndoLedger`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::battle::{AttackSpec, BattleKey, BattleRecord, BattleTracker, BattleType};
use crate::bridge::Bridge;
use crate::change::Change;
use crate::decision::RemotePlayer;
use crate::error::{GameError, Result};
use crate::game_data::GameData;
use crate::game_map::Route;
use crate::ids::{PlayerId, TerritoryId, UnitId, UnitTypeId};
use crate::move_validator::{self, MoveContext, MoveRequest, MoveValidationResult};
use crate::state::GameState;
use crate::undo::{ActionId, MoveRecord, UndoLedger};
use crate::unit::UnitState;

/// What became of a move request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveOutcome {
    /// The move happened and can be undone through this action.
    Performed(ActionId),
    /// The move is illegal; nothing changed.
    Rejected(String),
    /// The player backed out at the AA warning; nothing changed.
    Declined,
}

/// Everything the move's composite change does, before it is applied.
struct MovePlan {
    change: Change,
    loaded: Vec<UnitId>,
    unloaded: Vec<UnitId>,
    amphibious: Vec<UnitId>,
    conquered: Vec<TerritoryId>,
    blitzed: Vec<TerritoryId>,
}

/// Moves and places units for one player during one movement phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveDelegate {
    player: PlayerId,
    non_combat: bool,
}

impl MoveDelegate {
    /// Delegate for the combat movement phase.
    #[must_use]
    pub const fn combat(player: PlayerId) -> Self {
        Self {
            player,
            non_combat: false,
        }
    }

    /// Delegate for the non-combat movement phase.
    #[must_use]
    pub const fn non_combat(player: PlayerId) -> Self {
        Self {
            player,
            non_combat: true,
        }
    }

    /// The moving player.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        self.player
    }

    /// Check if this is the non-combat phase.
    #[must_use]
    pub const fn is_non_combat(&self) -> bool {
        self.non_combat
    }

    /// Add the cargo of moving transports to a move at sea. Cargo always
    /// travels with its transport.
    #[must_use]
    pub fn with_cargo(state: &GameState, data: &GameData, request: &MoveRequest) -> MoveRequest {
        let all_water = request
            .route
            .territories()
            .iter()
            .all(|t| data.map.is_water(*t));
        if !all_water {
            return request.clone();
        }
        let mut expanded = request.clone();
        for id in &request.units {
            for cargo in state.transports().cargo_of(*id) {
                if !expanded.units.contains(&cargo) {
                    expanded.units.push(cargo);
                }
            }
        }
        expanded
    }

    /// Validate a move without performing it.
    #[must_use]
    pub fn validate(
        &self,
        data: &GameData,
        state: &GameState,
        tracker: &BattleTracker,
        request: &MoveRequest,
    ) -> MoveValidationResult {
        let request = Self::with_cargo(state, data, request);
        move_validator::validate_move(
            &MoveContext::new(data, state, tracker),
            &request,
            self.player,
            self.non_combat,
        )
    }

    /// Perform a move.
    ///
    /// Nothing changes unless the move is valid and, when AA guns will fire
    /// along the way, the player confirms.
    ///
    /// # Errors
    /// Returns an error if applying the change fails, the random source
    /// fails while AA fires, or a battle cannot be created.
    pub fn perform_move(
        &self,
        bridge: &mut Bridge<'_>,
        tracker: &mut BattleTracker,
        ledger: &mut UndoLedger,
        remote: &mut dyn RemotePlayer,
        request: &MoveRequest,
    ) -> Result<MoveOutcome> {
        let data = bridge.data();
        let request = Self::with_cargo(bridge.state(), data, request);
        let result = move_validator::validate_move(
            &MoveContext::new(data, bridge.state(), tracker),
            &request,
            self.player,
            self.non_combat,
        );
        if !result.is_valid() {
            let message = result.message().unwrap_or("Illegal move").to_string();
            tracing::info!(player = %self.player, %message, "Move rejected");
            return Ok(MoveOutcome::Rejected(message));
        }

        let flak = if self.non_combat {
            Vec::new()
        } else {
            move_validator::flak_territories(
                data,
                bridge.state(),
                self.player,
                &request.route,
                &request.units,
            )
        };
        if !flak.is_empty() && !remote.confirm_move_in_face_of_aa(&flak) {
            tracing::info!(player = %self.player, "Move declined in face of AA");
            return Ok(MoveOutcome::Declined);
        }

        let plan = self.plan(data, bridge.state(), tracker, &request)?;
        let description = self.describe(data, &request);
        bridge.start_event(description.clone());
        bridge.add_change(plan.change.clone())?;
        for territory in &plan.conquered {
            tracker.mark_conquered(*territory, plan.blitzed.contains(territory));
        }

        let mut fired = false;
        for territory in &flak {
            fired |= self.fire_flyover_aa(bridge, &request.units, *territory)?;
        }

        let survivors: Vec<UnitId> = request
            .units
            .iter()
            .copied()
            .filter(|id| bridge.state().contains_unit(*id))
            .collect();
        let battles = self.register_battles(bridge, tracker, remote, &request.route, &survivors, &plan)?;

        let id = ledger.record_move(MoveRecord {
            player: self.player,
            units: request.units.clone(),
            route: request.route.clone(),
            change: plan.change,
            loaded: plan.loaded,
            unloaded: plan.unloaded,
            conquered: plan.conquered,
            battles,
            description,
        });
        if fired {
            ledger.set_veto(id, "AA fired during the move");
        }
        tracing::info!(player = %self.player, action = %id, units = request.units.len(), "Move performed");
        Ok(MoveOutcome::Performed(id))
    }

    fn describe(&self, data: &GameData, request: &MoveRequest) -> String {
        format!(
            "{} moves {} units from {} to {}",
            data.player(self.player).map_or("?", |p| p.name.as_str()),
            request.units.len(),
            data.map.territory(request.route.start()).name,
            data.map.territory(request.route.end()).name,
        )
    }

    fn plan(
        &self,
        data: &GameData,
        state: &GameState,
        tracker: &BattleTracker,
        request: &MoveRequest,
    ) -> Result<MovePlan> {
        let route = &request.route;
        let (start, end) = (route.start(), route.end());
        let loading = !data.map.is_water(start) && data.map.is_water(end);
        let unloading = data.map.is_water(start) && !data.map.is_water(end);
        let steps = u32::try_from(route.number_of_steps()).unwrap_or(u32::MAX);
        let land_cost = data.map.land_route_cost(route);
        let enemy_at_end = !state
            .units_in_matching(end, |u| data.is_at_war(self.player, u.owner))
            .is_empty();
        let land_units: Vec<UnitId> = request
            .units
            .iter()
            .copied()
            .filter(|id| {
                state
                    .unit(*id)
                    .is_some_and(|u| data.unit_type(u.unit_type).is_land())
            })
            .collect();

        let mut before = Vec::new();
        let mut after = Vec::new();
        let mut loaded = BTreeSet::new();
        let mut unloaded = BTreeSet::new();
        let mut amphibious = Vec::new();

        if loading {
            let assignments = move_validator::plan_loading(
                data,
                state,
                self.player,
                &land_units,
                end,
                &request.transports_to_load,
            )
            .map_err(GameError::Transport)?;
            for (cargo, transport) in assignments {
                let transport_unit = state.require_unit(transport)?;
                let cargo_unit = state.require_unit(cargo)?;
                after.push(Change::LoadTransport {
                    transport,
                    capacity: data
                        .unit_type(transport_unit.unit_type)
                        .transport_capacity
                        .unwrap_or(0),
                    cargo,
                    cost: data
                        .unit_type(cargo_unit.unit_type)
                        .transport_cost
                        .unwrap_or(0),
                    allied: transport_unit.owner != cargo_unit.owner,
                });
                loaded.insert(transport);
            }
        }

        let mut states = Vec::new();
        for id in &request.units {
            let unit = state.require_unit(*id)?;
            let unit_type = data.unit_type(unit.unit_type);
            let carrier = state.transports().transported_by(*id);
            let mut next: UnitState = unit.state;
            match carrier {
                Some(transport) if unloading => {
                    before.push(Change::UnloadTransport {
                        transport,
                        cargo: *id,
                    });
                    unloaded.insert(transport);
                    next.moved = unit_type.movement;
                    next.unloaded_to = Some(end);
                    if !self.non_combat && enemy_at_end {
                        next.was_amphibious = true;
                        amphibious.push(*id);
                    }
                }
                Some(_) => {}
                None if unit_type.is_land() => next.moved += land_cost,
                None => next.moved += steps,
            }
            if next != unit.state {
                states.push(Change::UnitState {
                    unit: *id,
                    old: unit.state,
                    new: next,
                });
            }
        }

        let mut conquered = Vec::new();
        let mut blitzed = Vec::new();
        let mut takeovers = Vec::new();
        let ground_forces = request.units.iter().any(|id| {
            state
                .unit(*id)
                .is_some_and(|u| data.unit_type(u.unit_type).is_land())
        });
        if !self.non_combat && ground_forces {
            let empty_enemy_land = |t: TerritoryId| {
                !data.map.is_water(t)
                    && !tracker.was_conquered(t)
                    && state.owner(t).is_some_and(|o| data.is_at_war(self.player, o))
                    && state
                        .units_in_matching(t, |u| data.is_at_war(self.player, u.owner))
                        .is_empty()
            };
            for t in route.middle() {
                if empty_enemy_land(*t) {
                    takeovers.push(Change::conquer(data, state, *t, self.player));
                    conquered.push(*t);
                    blitzed.push(*t);
                }
            }
            if empty_enemy_land(end) {
                takeovers.push(Change::conquer(data, state, end, self.player));
                conquered.push(end);
            }
        }

        let mut changes = before;
        changes.push(Change::move_units(request.units.clone(), start, end));
        changes.extend(after);
        changes.extend(states);
        changes.extend(takeovers);
        Ok(MovePlan {
            change: Change::composite(changes),
            loaded: loaded.into_iter().collect(),
            unloaded: unloaded.into_iter().collect(),
            amphibious,
            conquered,
            blitzed,
        })
    }

    /// Fire the enemy AA in `territory` at the moving aircraft. Returns
    /// whether any dice were rolled.
    fn fire_flyover_aa(
        &self,
        bridge: &mut Bridge<'_>,
        units: &[UnitId],
        territory: TerritoryId,
    ) -> Result<bool> {
        let data = bridge.data();
        let aa = move_validator::enemy_aa(data, bridge.state(), self.player, territory);
        let mut targets: Vec<UnitId> = units
            .iter()
            .copied()
            .filter(|id| {
                bridge
                    .state()
                    .unit(*id)
                    .is_some_and(|u| data.unit_type(u.unit_type).is_air())
            })
            .collect();
        let Some(gunner) = aa.first().and_then(|id| bridge.state().unit(*id)).map(|u| u.owner) else {
            return Ok(false);
        };
        if targets.is_empty() {
            return Ok(false);
        }

        let name = &data.map.territory(territory).name;
        bridge.start_event(format!("AA fires in {name}"));
        let roll = bridge.roll_aa(&aa, &targets, gunner, &format!("AA fire in {name}"))?;
        let mut killed = Vec::new();
        while killed.len() < roll.hits() as usize && !targets.is_empty() {
            let index = if targets.len() == 1 {
                0
            } else {
                let count = u32::try_from(targets.len()).unwrap_or(u32::MAX);
                let draw = bridge.draw(count, 1, "AA casualties")?;
                draw.first().copied().unwrap_or(0) as usize
            };
            killed.push(targets.remove(index.min(targets.len() - 1)));
        }
        if !killed.is_empty() {
            let change = Change::remove_units(bridge.state(), &killed)?;
            bridge.add_change(change)?;
        }
        tracing::info!(%territory, hits = roll.hits(), lost = killed.len(), "Fly-over AA fired");
        Ok(true)
    }

    fn register_battles(
        &self,
        bridge: &Bridge<'_>,
        tracker: &mut BattleTracker,
        remote: &mut dyn RemotePlayer,
        route: &Route,
        survivors: &[UnitId],
        plan: &MovePlan,
    ) -> Result<Vec<BattleKey>> {
        if self.non_combat || survivors.is_empty() {
            return Ok(Vec::new());
        }
        let data = bridge.data();
        let state = bridge.state();
        let (start, end) = (route.start(), route.end());
        let enemy_at_end = !state
            .units_in_matching(end, |u| data.is_at_war(self.player, u.owner))
            .is_empty();
        let enemy_land = !data.map.is_water(end)
            && state
                .owner(end)
                .is_some_and(|o| data.is_at_war(self.player, o));
        let bombers_only = survivors.iter().all(|id| {
            state
                .unit(*id)
                .is_some_and(|u| data.unit_type(u.unit_type).is_strategic_bomber)
        });
        let raid = bombers_only
            && enemy_land
            && data.map.territory(end).production > 0
            && remote.should_bomb(end);
        if !raid && !enemy_at_end {
            return Ok(Vec::new());
        }

        let at_sea = data.map.is_water(end);
        let units: Vec<UnitId> = survivors
            .iter()
            .copied()
            .filter(|id| {
                !at_sea
                    || state
                        .unit(*id)
                        .is_some_and(|u| !data.unit_type(u.unit_type).is_land())
            })
            .collect();
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let spec = AttackSpec {
            attacker: self.player,
            territory: end,
            battle_type: if raid {
                BattleType::BombingRaid
            } else {
                BattleType::Normal
            },
            units,
            from: route.penultimate(),
            amphibious: plan.amphibious.clone(),
        };
        let key = tracker.add_attack(data, state, &spec)?;

        if at_sea {
            let mut cargo: BTreeMap<UnitId, Vec<UnitId>> = BTreeMap::new();
            for id in survivors {
                if let Some(transport) = state.transports().transported_by(*id) {
                    cargo.entry(transport).or_default().push(*id);
                }
            }
            for (transport, cargo) in cargo {
                tracker.add_dependents(key, transport, &cargo);
            }
        } else if !plan.unloaded.is_empty() {
            let sea_battle = BattleKey::normal(start);
            if tracker.battle(sea_battle).is_some() {
                tracker.add_dependency(key, sea_battle);
                for transport in &plan.unloaded {
                    let cargo: Vec<UnitId> = plan
                        .amphibious
                        .iter()
                        .copied()
                        .filter(|c| state.transports().unloaded_by(*transport).contains(c))
                        .collect();
                    tracker.add_dependents(sea_battle, *transport, &cargo);
                }
            }
        }
        tracing::debug!(battle = %key, "Move joined battle");
        Ok(vec![key])
    }

    /// Undo one of this player's actions.
    ///
    /// # Errors
    /// Returns [`GameError::UndoNotAllowed`] for another player's action or
    /// whatever [`UndoLedger::undo`] refuses.
    pub fn undo_move(
        &self,
        bridge: &mut Bridge<'_>,
        tracker: &mut BattleTracker,
        ledger: &mut UndoLedger,
        id: ActionId,
    ) -> Result<()> {
        if ledger.get(id).is_some_and(|a| a.player != self.player) {
            return Err(GameError::UndoNotAllowed {
                action: id.0,
                reason: "not your action".into(),
            });
        }
        ledger.undo(id, bridge, tracker)
    }

    /// Place new units in a territory the player owns, or a sea zone next
    /// to one.
    ///
    /// # Errors
    /// Returns [`GameError::InvalidState`] for a territory the player cannot
    /// place in, or a change application error.
    pub fn place_units(
        &self,
        bridge: &mut Bridge<'_>,
        ledger: &mut UndoLedger,
        territory: TerritoryId,
        unit_types: &[UnitTypeId],
    ) -> Result<ActionId> {
        let data = bridge.data();
        let owns = |t: TerritoryId| bridge.state().owner(t) == Some(self.player);
        let allowed = if data.map.is_water(territory) {
            data.map.neighbors(territory).any(|t| owns(t))
        } else {
            owns(territory)
        };
        if !allowed {
            return Err(GameError::InvalidState(format!(
                "cannot place units in {}",
                data.map.territory(territory).name
            )));
        }
        for unit_type in unit_types {
            let placeable = if data.map.is_water(territory) {
                data.unit_type(*unit_type).is_sea()
            } else {
                !data.unit_type(*unit_type).is_sea()
            };
            if !placeable {
                return Err(GameError::InvalidState(format!(
                    "{} cannot be placed in {}",
                    data.unit_type(*unit_type).name,
                    data.map.territory(territory).name
                )));
            }
        }

        let units: Vec<_> = unit_types
            .iter()
            .map(|t| bridge.allocate_unit(*t, self.player, territory))
            .collect();
        let ids: Vec<UnitId> = units.iter().map(|u| u.id).collect();
        let change = Change::add_units(units);
        let description = format!(
            "{} places {} units in {}",
            data.player(self.player).map_or("?", |p| p.name.as_str()),
            ids.len(),
            data.map.territory(territory).name
        );
        bridge.start_event(description.clone());
        bridge.add_change(change.clone())?;
        let id = ledger.record_placement(self.player, territory, ids, change, description);
        tracing::info!(player = %self.player, %territory, action = %id, "Units placed");
        Ok(id)
    }

    /// Close the turn: clear the transport ledger's per-turn sets and every
    /// unit's per-turn flags, forget the undo history and hand back the
    /// turn's battle records.
    ///
    /// # Errors
    /// Returns [`GameError::InvalidState`] while battles are pending, or a
    /// change application error.
    pub fn end_turn(
        &self,
        bridge: &mut Bridge<'_>,
        tracker: &mut BattleTracker,
        ledger: &mut UndoLedger,
    ) -> Result<Vec<BattleRecord>> {
        if !tracker.is_empty() {
            return Err(GameError::InvalidState(format!(
                "{} battles still pending",
                tracker.pending_battles().len()
            )));
        }
        let state = bridge.state();
        let mut changes = vec![Change::TransportEndTurn {
            snapshot: state.transports().turn_snapshot(),
        }];
        for unit in state.all_units() {
            let fresh = UnitState {
                hits: unit.state.hits,
                ..UnitState::default()
            };
            if unit.state != fresh {
                changes.push(Change::UnitState {
                    unit: unit.id,
                    old: unit.state,
                    new: fresh,
                });
            }
        }
        bridge.start_event(format!("{} ends the turn", self.player));
        bridge.add_change(Change::composite(changes))?;
        ledger.clear();
        let records = tracker.clear_turn();
        tracing::info!(player = %self.player, battles = records.len(), "Turn ended");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::BattleKind;
    use crate::casualty::{CasualtyChoice, CasualtyDetails};
    use crate::decision::DefaultPlayer;
    use crate::move_validator::messages;
    use crate::random::ScriptedRandomSource;
    use crate::test_support::{classic_world, TestWorld};

    struct Picky {
        accept_aa: bool,
        bomb: bool,
    }

    impl RemotePlayer for Picky {
        fn select_casualties(&mut self, _battle: BattleKey, choice: &CasualtyChoice) -> CasualtyDetails {
            choice.default_selection.clone()
        }

        fn retreat_query(&mut self, _battle: BattleKey, _possible: &[TerritoryId]) -> Option<TerritoryId> {
            None
        }

        fn submerge_query(&mut self, _battle: BattleKey, _units: &[UnitId]) -> bool {
            false
        }

        fn confirm_move_in_face_of_aa(&mut self, _territories: &[TerritoryId]) -> bool {
            self.accept_aa
        }

        fn confirm_shore_bombard(&mut self, _from: TerritoryId, _target: TerritoryId) -> bool {
            true
        }

        fn should_bomb(&mut self, _target: TerritoryId) -> bool {
            self.bomb
        }
    }

    struct Turn {
        tracker: BattleTracker,
        ledger: UndoLedger,
    }

    impl Turn {
        fn new() -> Self {
            Self {
                tracker: BattleTracker::new(),
                ledger: UndoLedger::new(),
            }
        }

        fn perform(
            &mut self,
            world: &mut TestWorld,
            delegate: MoveDelegate,
            remote: &mut dyn RemotePlayer,
            random: &mut ScriptedRandomSource,
            units: Vec<UnitId>,
            route: Vec<TerritoryId>,
        ) -> MoveOutcome {
            let request = MoveRequest::new(units, Route::new(route));
            delegate
                .perform_move(
                    &mut world.bridge(random),
                    &mut self.tracker,
                    &mut self.ledger,
                    remote,
                    &request,
                )
                .unwrap()
        }

        fn undo(&mut self, world: &mut TestWorld, delegate: MoveDelegate, id: ActionId) -> Result<()> {
            let mut random = ScriptedRandomSource::failing();
            delegate.undo_move(&mut world.bridge(&mut random), &mut self.tracker, &mut self.ledger, id)
        }
    }

    fn performed(outcome: MoveOutcome) -> ActionId {
        match outcome {
            MoveOutcome::Performed(id) => id,
            other => panic!("move not performed: {other:?}"),
        }
    }

    #[test]
    fn test_move_and_undo_restores_board() {
        let mut world = classic_world(false);
        let (rear, home) = (world.rear, world.home);
        let infantry = world.place(world.attacker, world.rear, "infantry");
        let delegate = MoveDelegate::combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();
        let before = world.state.state_hash();

        let id = performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![infantry],
            vec![rear, home],
        ));
        let unit = world.state.unit(infantry).unwrap();
        assert_eq!(unit.location, world.home);
        assert_eq!(unit.state.moved, 1);

        turn.undo(&mut world, delegate, id).unwrap();
        assert_eq!(world.state.state_hash(), before);
        assert!(turn.ledger.is_empty());
    }

    #[test]
    fn test_load_then_amphibious_unload() {
        let mut world = classic_world(false);
        let (home, land, sea) = (world.home, world.land, world.sea);
        let transport = world.place(world.attacker, world.sea, "transport");
        let infantry = world.place(world.attacker, world.home, "infantry");
        world.place(world.defender, world.land, "infantry");
        let delegate = MoveDelegate::combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();

        let load = performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![infantry],
            vec![home, sea],
        ));
        assert_eq!(world.state.transports().transported_by(infantry), Some(transport));

        let unload = performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![infantry],
            vec![sea, land],
        ));
        let unit = world.state.unit(infantry).unwrap();
        assert_eq!(unit.location, world.land);
        assert!(unit.state.was_amphibious);
        assert_eq!(unit.state.unloaded_to, Some(world.land));
        assert_eq!(world.state.transports().unloaded_by(transport), vec![infantry]);

        let battle = turn.tracker.battle(BattleKey::normal(world.land)).unwrap();
        assert!(battle.is_amphibious());
        assert_eq!(battle.amphibious_from(), vec![sea]);
        assert_eq!(turn.ledger.get(unload).unwrap().depends_on(), vec![load]);

        assert!(turn.undo(&mut world, delegate, load).is_err());
        turn.undo(&mut world, delegate, unload).unwrap();
        assert!(turn.tracker.battle(BattleKey::normal(world.land)).is_none());
        assert_eq!(world.state.transports().transported_by(infantry), Some(transport));
    }

    #[test]
    fn test_loading_in_a_hostile_sea_zone_starts_no_battle() {
        let mut world = classic_world(false);
        let (home, sea) = (world.home, world.sea);
        let transport = world.place(world.attacker, world.sea, "transport");
        world.place(world.defender, world.sea, "destroyer");
        let infantry = world.place(world.attacker, world.home, "infantry");
        let delegate = MoveDelegate::combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();

        let load = performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![infantry],
            vec![home, sea],
        ));
        assert_eq!(world.state.transports().transported_by(infantry), Some(transport));
        assert!(turn.tracker.battle(BattleKey::normal(sea)).is_none());
        assert!(turn.tracker.records().is_empty());
        turn.undo(&mut world, delegate, load).unwrap();
    }

    #[test]
    fn test_blitz_conquers_and_later_moves_depend_on_it() {
        let mut world = classic_world(false);
        let (home, land, far) = (world.home, world.land, world.far);
        let armour = world.place(world.attacker, world.home, "armour");
        let infantry = world.place(world.attacker, world.home, "infantry");
        let delegate = MoveDelegate::combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();

        let blitz = performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![armour],
            vec![home, land, far],
        ));
        assert_eq!(world.state.owner(world.land), Some(world.attacker));
        assert_eq!(world.state.owner(world.far), Some(world.attacker));
        assert!(turn.tracker.was_blitzed(world.land));
        assert!(turn.tracker.was_conquered(world.far));
        assert!(!turn.tracker.was_blitzed(world.far));

        let follow = performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![infantry],
            vec![home, land],
        ));
        assert!(turn.ledger.can_undo(blitz, &turn.tracker).is_err());

        turn.undo(&mut world, delegate, follow).unwrap();
        turn.undo(&mut world, delegate, blitz).unwrap();
        assert_eq!(world.state.owner(world.land), Some(world.defender));
        assert!(!turn.tracker.was_conquered(world.land));
    }

    #[test]
    fn test_declined_aa_changes_nothing() {
        let mut world = classic_world(false);
        let (home, land, far) = (world.home, world.land, world.far);
        let bomber = world.place(world.attacker, world.home, "bomber");
        world.place(world.defender, world.land, "aa_gun");
        let delegate = MoveDelegate::combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();
        let history = world.history.len();

        let outcome = turn.perform(
            &mut world,
            delegate,
            &mut Picky {
                accept_aa: false,
                bomb: false,
            },
            &mut random,
            vec![bomber],
            vec![home, land, far],
        );
        assert_eq!(outcome, MoveOutcome::Declined);
        assert_eq!(world.state.unit(bomber).unwrap().location, world.home);
        assert_eq!(world.history.len(), history);
    }

    #[test]
    fn test_flyover_aa_kills_and_vetoes_undo() {
        let mut world = classic_world(false);
        let (home, land, far) = (world.home, world.land, world.far);
        let bomber = world.place(world.attacker, world.home, "bomber");
        world.place(world.defender, world.land, "aa_gun");
        let delegate = MoveDelegate::combat(world.attacker);
        let mut turn = Turn::new();
        // One AA shot at strength 1: a 0 hits.
        let mut random = ScriptedRandomSource::new(vec![0]);

        let id = performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![bomber],
            vec![home, land, far],
        ));
        assert!(!world.state.contains_unit(bomber));
        assert!(turn.tracker.is_empty());
        assert_eq!(turn.ledger.get(id).unwrap().veto(), Some("AA fired during the move"));
        assert!(turn.ledger.can_undo(id, &turn.tracker).is_err());
    }

    #[test]
    fn test_bomber_can_raid_instead_of_attacking() {
        let mut world = classic_world(false);
        let (home, land) = (world.home, world.land);
        let bomber = world.place(world.attacker, world.home, "bomber");
        world.place(world.defender, world.land, "infantry");
        let delegate = MoveDelegate::combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();

        performed(turn.perform(
            &mut world,
            delegate,
            &mut Picky {
                accept_aa: true,
                bomb: true,
            },
            &mut random,
            vec![bomber],
            vec![home, land],
        ));
        let raid = turn.tracker.battle(BattleKey::raid(world.land)).unwrap();
        assert_eq!(raid.kind(), BattleKind::BombingRaid);
        assert!(turn.tracker.battle(BattleKey::normal(world.land)).is_none());
    }

    #[test]
    fn test_illegal_move_is_rejected_without_changes() {
        let mut world = classic_world(false);
        let (home, land) = (world.home, world.land);
        let armour = world.place(world.attacker, world.home, "armour");
        let delegate = MoveDelegate::non_combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();

        let outcome = turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![armour],
            vec![home, land],
        );
        assert_eq!(
            outcome,
            MoveOutcome::Rejected(messages::ENEMY_LAND_IN_NON_COMBAT.to_string())
        );
        assert!(turn.ledger.is_empty());
    }

    #[test]
    fn test_transport_carries_cargo_at_sea() {
        let mut world = classic_world(false);
        let (sea, sea2) = (world.sea, world.sea2);
        let transport = world.place(world.attacker, world.sea, "transport");
        let infantry = world.place(world.attacker, world.sea, "infantry");
        world.load(transport, infantry);
        let delegate = MoveDelegate::combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();

        performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![transport],
            vec![sea, sea2],
        ));
        assert_eq!(world.state.unit(infantry).unwrap().location, world.sea2);
        assert_eq!(world.state.unit(infantry).unwrap().state.moved, 0);
        assert_eq!(world.state.unit(transport).unwrap().state.moved, 1);
    }

    #[test]
    fn test_placement_and_end_turn() {
        let mut world = classic_world(false);
        let (rear, home, land, sea) = (world.rear, world.home, world.land, world.sea);
        let delegate = MoveDelegate::non_combat(world.attacker);
        let mut turn = Turn::new();
        let mut random = ScriptedRandomSource::failing();
        let infantry = world.type_id("infantry");
        let destroyer = world.type_id("destroyer");

        let placed = delegate
            .place_units(&mut world.bridge(&mut random), &mut turn.ledger, home, &[infantry, infantry])
            .unwrap();
        let units = turn.ledger.get(placed).unwrap().units.clone();
        assert_eq!(units.len(), 2);
        assert!(delegate
            .place_units(&mut world.bridge(&mut random), &mut turn.ledger, land, &[infantry])
            .is_err());
        assert!(delegate
            .place_units(&mut world.bridge(&mut random), &mut turn.ledger, home, &[destroyer])
            .is_err());
        delegate
            .place_units(&mut world.bridge(&mut random), &mut turn.ledger, sea, &[destroyer])
            .unwrap();

        performed(turn.perform(
            &mut world,
            delegate,
            &mut DefaultPlayer,
            &mut random,
            vec![units[0]],
            vec![home, rear],
        ));
        assert_eq!(world.state.unit(units[0]).unwrap().state.moved, 1);

        let records = delegate
            .end_turn(&mut world.bridge(&mut random), &mut turn.tracker, &mut turn.ledger)
            .unwrap();
        assert!(records.is_empty());
        assert!(turn.ledger.is_empty());
        assert_eq!(world.state.unit(units[0]).unwrap().state.moved, 0);
    }
}
