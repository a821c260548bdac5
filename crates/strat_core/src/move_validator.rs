//! Move legality.
//!
//! Validation never mutates anything and never fails with an error: an
//! illegal move comes back as a [`MoveValidationResult`] carrying a hard
//! error, units that may not make the move, or soft warnings a UI may let
//! the player override. Checks run cheapest first and stop at the first
//! hard error.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::air;
use crate::battle::{BattleKey, BattleTracker};
use crate::game_data::GameData;
use crate::game_map::Route;
use crate::ids::{PlayerId, TerritoryId, UnitId};
use crate::state::GameState;

/// Rejection messages shared with callers and tests.
pub mod messages {
    /// Route without steps.
    pub const NO_STEPS: &str = "Route has no steps";
    /// Nothing to move.
    pub const NO_UNITS: &str = "No units";
    /// A unit listed twice.
    pub const NOT_UNIQUE: &str = "Not all units unique";
    /// Route is not a chain of neighbours.
    pub const INVALID_ROUTE: &str = "Invalid route";
    /// A unit is not where the route starts.
    pub const NOT_IN_START: &str = "Not enough units in starting territory";
    /// Someone else's unit.
    pub const NOT_OWNED: &str = "Can only move own troops";
    /// Submerged submarine.
    pub const SUBMERGED: &str = "Cannot move submerged units";
    /// Entering an impassable neutral.
    pub const NEUTRALITY: &str = "Cannot violate neutrality";
    /// Any unconquered neutral on a non-combat route.
    pub const NEUTRAL_IN_NON_COMBAT: &str =
        "Cannot move units through neutral territories in non combat";
    /// Surface units passing a neutral in the middle of a combat route.
    pub const STOP_IN_NEUTRAL: &str = "Must stop land units when passing through neutral territories";
    /// Route costs more than the unit has left.
    pub const NO_MOVEMENT: &str = "Not all units have enough movement";
    /// Ship on land.
    pub const SEA_ON_LAND: &str = "Sea units cannot go on land";
    /// Land unit in water without a transport.
    pub const LAND_IN_WATER: &str = "Land units cannot enter water without transport";
    /// Land unit with no transport cost.
    pub const NOT_TRANSPORTABLE: &str = "Not all units can be transported";
    /// Transports cannot hold everyone.
    pub const NO_CAPACITY: &str = "Not enough transport capacity";
    /// Loading must be the first and only step.
    pub const LOAD_ONE_STEP: &str = "Units cannot move before loading onto transports";
    /// Unloading must be the only step.
    pub const UNLOAD_ONE_STEP: &str = "Unloading units must stop where they are unloaded";
    /// Land route with water in the middle.
    pub const STOP_AT_TRANSPORT: &str = "Must stop units at a transport on route";
    /// Cargo moving at sea without its transport.
    pub const STAY_WITH_TRANSPORT: &str = "Unit must stay with its transport while moving";
    /// Transport leaving cargo behind.
    pub const LEAVE_CARGO: &str = "Transports cannot leave their units";
    /// Allied cargo loaded this turn.
    pub const ALLIED_UNLOAD: &str = "Cannot load and unload an allied transport in the same round";
    /// Second unload territory; the territory name follows.
    pub const ALREADY_UNLOADED_TO: &str = "Transport has already unloaded units to ";
    /// Aircraft without a landing spot.
    pub const AIR_CANNOT_LAND: &str = "Not all air units can land";
    /// Enemy units between start and end.
    pub const ENEMY_ON_PATH: &str = "Enemy units on path";
    /// Passing through empty enemy land without blitz.
    pub const CANNOT_BLITZ: &str = "Not all units can blitz";
    /// Ending against enemy units in non-combat movement.
    pub const BATTLE_IN_NON_COMBAT: &str = "Cannot advance units to battle in non combat";
    /// Entering enemy land in non-combat movement.
    pub const ENEMY_LAND_IN_NON_COMBAT: &str = "Cannot advance to battle in non combat";
    /// Leaving a pending battle.
    pub const OUT_OF_BATTLE: &str = "Cannot move units out of battle zone";
}

/// Outcome of validating one move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveValidationResult {
    error: Option<String>,
    warnings: Vec<String>,
    disallowed: BTreeMap<String, Vec<UnitId>>,
}

impl MoveValidationResult {
    /// A clean result.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// Check if the move may go ahead (warnings allowed).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.disallowed.is_empty()
    }

    /// Check if a hard error was found.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The hard error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Warnings the player may override.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Units that may not make the move, by reason.
    #[must_use]
    pub fn disallowed_units(&self) -> &BTreeMap<String, Vec<UnitId>> {
        &self.disallowed
    }

    /// First reason the move is illegal.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.disallowed.keys().next().map(String::as_str))
    }

    fn set_error(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    fn disallow(&mut self, message: impl Into<String>, unit: UnitId) {
        let units = self.disallowed.entry(message.into()).or_default();
        if !units.contains(&unit) {
            units.push(unit);
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Read-only view a validation runs against.
#[derive(Clone, Copy)]
pub struct MoveContext<'a> {
    /// Reference data.
    pub data: &'a GameData,
    /// Current board.
    pub state: &'a GameState,
    /// Battles and conquests of this turn.
    pub tracker: &'a BattleTracker,
}

impl<'a> MoveContext<'a> {
    /// Bundle the context.
    #[must_use]
    pub const fn new(data: &'a GameData, state: &'a GameState, tracker: &'a BattleTracker) -> Self {
        Self {
            data,
            state,
            tracker,
        }
    }
}

/// A proposed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Units to move, cargo aboard moving transports included.
    pub units: Vec<UnitId>,
    /// Route to move along.
    pub route: Route,
    /// Cargo to transport assignments for a load; unassigned cargo is
    /// placed greedily.
    pub transports_to_load: BTreeMap<UnitId, UnitId>,
}

impl MoveRequest {
    /// A move without explicit transport assignments.
    #[must_use]
    pub fn new(units: Vec<UnitId>, route: Route) -> Self {
        Self {
            units,
            route,
            transports_to_load: BTreeMap::new(),
        }
    }

    /// Name the transport each piece of cargo should board.
    #[must_use]
    pub fn with_transports(mut self, assignments: BTreeMap<UnitId, UnitId>) -> Self {
        self.transports_to_load = assignments;
        self
    }
}

/// Assign land units to the transports in `sea`, honouring `preferred`
/// first and filling the player's own transports before allied ones.
///
/// # Errors
/// Returns the rejection message when a unit cannot be transported or the
/// transports run out of room.
pub fn plan_loading(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    cargo: &[UnitId],
    sea: TerritoryId,
    preferred: &BTreeMap<UnitId, UnitId>,
) -> std::result::Result<BTreeMap<UnitId, UnitId>, String> {
    let mut transports: Vec<(UnitId, u32)> = state
        .units_in_matching(sea, |u| {
            data.is_allied(player, u.owner) && data.unit_type(u.unit_type).is_transport()
        })
        .into_iter()
        .filter_map(|id| {
            let unit = state.unit(id)?;
            let capacity = data.unit_type(unit.unit_type).transport_capacity?;
            let own = unit.owner == player;
            Some((own, id, state.transports().available_capacity(id, capacity)))
        })
        .map(|(own, id, free)| (u8::from(!own), id, free))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|(_, id, free)| (id, free))
        .collect();

    let mut plan = BTreeMap::new();
    for id in cargo {
        let unit = state.unit(*id).ok_or_else(|| messages::NOT_IN_START.to_string())?;
        let Some(cost) = data.unit_type(unit.unit_type).transport_cost else {
            return Err(messages::NOT_TRANSPORTABLE.to_string());
        };
        let slot = match preferred.get(id) {
            Some(wanted) => transports.iter_mut().find(|(t, _)| t == wanted),
            None => transports.iter_mut().find(|(_, free)| *free >= cost),
        };
        match slot {
            Some((transport, free)) if *free >= cost => {
                *free -= cost;
                plan.insert(*id, *transport);
            }
            _ => return Err(messages::NO_CAPACITY.to_string()),
        }
    }
    Ok(plan)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteShape {
    Land,
    Sea,
    Load,
    Unload,
    Mixed,
}

fn route_shape(data: &GameData, route: &Route) -> RouteShape {
    let water: Vec<bool> = route
        .territories()
        .iter()
        .map(|t| data.map.is_water(*t))
        .collect();
    let start = water.first().copied().unwrap_or(false);
    let end = water.last().copied().unwrap_or(false);
    let all_water = water.iter().all(|w| *w);
    let any_water = water.iter().any(|w| *w);
    match (start, end) {
        _ if all_water => RouteShape::Sea,
        _ if !any_water => RouteShape::Land,
        (false, true) => RouteShape::Load,
        (true, false) => RouteShape::Unload,
        _ => RouteShape::Mixed,
    }
}

fn step_count(route: &Route) -> u32 {
    u32::try_from(route.number_of_steps()).unwrap_or(u32::MAX)
}

/// Validate a move for `player`.
#[must_use]
pub fn validate_move(
    ctx: &MoveContext<'_>,
    request: &MoveRequest,
    player: PlayerId,
    non_combat: bool,
) -> MoveValidationResult {
    let mut result = MoveValidationResult::ok();
    let checks: [fn(&MoveContext<'_>, &MoveRequest, PlayerId, bool, &mut MoveValidationResult); 7] = [
        validate_first,
        validate_movement,
        validate_terrain,
        validate_air_landing,
        validate_path,
        validate_transport,
        validate_battle_zone,
    ];
    for check in checks {
        check(ctx, request, player, non_combat, &mut result);
        if result.has_error() {
            break;
        }
    }
    tracing::debug!(
        %player,
        units = request.units.len(),
        valid = result.is_valid(),
        message = ?result.message(),
        "Validated move"
    );
    result
}

fn validate_first(
    ctx: &MoveContext<'_>,
    request: &MoveRequest,
    player: PlayerId,
    non_combat: bool,
    result: &mut MoveValidationResult,
) {
    let route = &request.route;
    if route.number_of_steps() == 0 {
        return result.set_error(messages::NO_STEPS);
    }
    if request.units.is_empty() {
        return result.set_error(messages::NO_UNITS);
    }
    let unique: BTreeSet<UnitId> = request.units.iter().copied().collect();
    if unique.len() != request.units.len() {
        return result.set_error(messages::NOT_UNIQUE);
    }
    if !ctx.data.map.is_valid_route(route) {
        return result.set_error(format!("{}: {:?}", messages::INVALID_ROUTE, route.territories()));
    }
    let start = route.start();
    if request
        .units
        .iter()
        .any(|id| ctx.state.unit(*id).map_or(true, |u| u.location != start))
    {
        return result.set_error(messages::NOT_IN_START);
    }

    for id in &request.units {
        let Some(unit) = ctx.state.unit(*id) else { continue };
        let carried_by_mover = ctx
            .state
            .transports()
            .transported_by(*id)
            .is_some_and(|t| unique.contains(&t));
        if unit.owner != player && !carried_by_mover {
            result.disallow(messages::NOT_OWNED, *id);
        }
        if unit.state.submerged {
            result.disallow(messages::SUBMERGED, *id);
        }
    }

    let unconquered_neutral =
        |t: &TerritoryId| ctx.data.map.territory(*t).neutral && ctx.state.owner(*t).is_none();
    if !route.steps().iter().any(unconquered_neutral) {
        return;
    }
    if ctx.data.rules.neutrals_impassable {
        return result.set_error(messages::NEUTRALITY);
    }
    if non_combat {
        return result.set_error(messages::NEUTRAL_IN_NON_COMBAT);
    }
    let all_air = request.units.iter().all(|id| {
        ctx.state
            .unit(*id)
            .is_some_and(|u| ctx.data.unit_type(u.unit_type).is_air())
    });
    if !all_air && route.middle().iter().any(unconquered_neutral) {
        result.set_error(messages::STOP_IN_NEUTRAL);
    }
}

/// Units that spend their own movement on this route.
fn self_propelled(ctx: &MoveContext<'_>, request: &MoveRequest) -> Vec<UnitId> {
    let shape = route_shape(ctx.data, &request.route);
    request
        .units
        .iter()
        .copied()
        .filter(|id| {
            let aboard = ctx.state.transports().transported_by(*id).is_some();
            !(aboard && matches!(shape, RouteShape::Sea | RouteShape::Unload))
        })
        .collect()
}

fn validate_movement(
    ctx: &MoveContext<'_>,
    request: &MoveRequest,
    _player: PlayerId,
    _non_combat: bool,
    result: &mut MoveValidationResult,
) {
    let steps = step_count(&request.route);
    let land_cost = ctx.data.map.land_route_cost(&request.route);
    for id in self_propelled(ctx, request) {
        let Some(unit) = ctx.state.unit(id) else { continue };
        let unit_type = ctx.data.unit_type(unit.unit_type);
        let cost = if unit_type.is_land() { land_cost } else { steps };
        if unit.state.moved + cost > unit_type.movement {
            result.disallow(messages::NO_MOVEMENT, id);
        }
    }
}

fn validate_terrain(
    ctx: &MoveContext<'_>,
    request: &MoveRequest,
    player: PlayerId,
    _non_combat: bool,
    result: &mut MoveValidationResult,
) {
    let data = ctx.data;
    let route = &request.route;
    let shape = route_shape(data, route);
    let moving: BTreeSet<UnitId> = request.units.iter().copied().collect();
    let mut land = Vec::new();

    for id in &request.units {
        let Some(unit) = ctx.state.unit(*id) else { continue };
        let unit_type = data.unit_type(unit.unit_type);
        if unit_type.is_sea() && route.steps().iter().any(|t| !data.map.is_water(*t)) {
            result.disallow(messages::SEA_ON_LAND, *id);
        }
        if unit_type.is_land() {
            land.push(*id);
        }
    }
    if land.is_empty() {
        return;
    }

    match shape {
        RouteShape::Land => {}
        RouteShape::Mixed => result.set_error(messages::STOP_AT_TRANSPORT),
        RouteShape::Load => {
            if route.number_of_steps() != 1 {
                return result.set_error(messages::LOAD_ONE_STEP);
            }
            let any_transport = !ctx
                .state
                .units_in_matching(route.end(), |u| {
                    data.is_allied(player, u.owner) && data.unit_type(u.unit_type).is_transport()
                })
                .is_empty();
            if !any_transport {
                return result.set_error(messages::LAND_IN_WATER);
            }
            if let Err(message) = plan_loading(
                data,
                ctx.state,
                player,
                &land,
                route.end(),
                &request.transports_to_load,
            ) {
                if message == messages::NO_CAPACITY {
                    result.set_error(message);
                } else {
                    for id in &land {
                        result.disallow(message.clone(), *id);
                    }
                }
            }
        }
        RouteShape::Sea | RouteShape::Unload => {
            for id in &land {
                match ctx.state.transports().transported_by(*id) {
                    None => result.disallow(messages::LAND_IN_WATER, *id),
                    Some(t) if shape == RouteShape::Sea && !moving.contains(&t) => {
                        result.disallow(messages::STAY_WITH_TRANSPORT, *id);
                    }
                    Some(_) => {}
                }
            }
            if shape == RouteShape::Unload && route.number_of_steps() != 1 {
                result.set_error(messages::UNLOAD_ONE_STEP);
            }
        }
    }

    if shape == RouteShape::Sea {
        for id in &request.units {
            let cargo = ctx.state.transports().cargo_of(*id);
            if cargo.iter().any(|c| !moving.contains(c)) {
                result.disallow(messages::LEAVE_CARGO, *id);
            }
        }
    }
}

fn validate_air_landing(
    ctx: &MoveContext<'_>,
    request: &MoveRequest,
    player: PlayerId,
    non_combat: bool,
    result: &mut MoveValidationResult,
) {
    let stranded = air::air_that_cannot_land(
        ctx.data,
        ctx.state,
        player,
        &request.units,
        request.route.end(),
        step_count(&request.route),
        non_combat,
        ctx.tracker.conquered(),
    );
    for id in stranded {
        result.disallow(messages::AIR_CANNOT_LAND, id);
    }
}

fn validate_path(
    ctx: &MoveContext<'_>,
    request: &MoveRequest,
    player: PlayerId,
    non_combat: bool,
    result: &mut MoveValidationResult,
) {
    let data = ctx.data;
    let state = ctx.state;
    let route = &request.route;
    let kinds: Vec<(UnitId, bool, bool)> = request
        .units
        .iter()
        .filter_map(|id| state.unit(*id))
        .map(|u| {
            let unit_type = data.unit_type(u.unit_type);
            (u.id, unit_type.is_air(), unit_type.is_land() && !unit_type.can_blitz)
        })
        .collect();
    let surface_units = kinds.iter().any(|(_, is_air, _)| !is_air);
    let enemy_combat_units = |t: TerritoryId| {
        state
            .units_in_matching(t, |u| {
                data.is_at_war(player, u.owner) && !data.unit_type(u.unit_type).is_infrastructure
            })
            .len()
    };
    let enemy_owned = |t: TerritoryId| {
        !data.map.is_water(t)
            && state.owner(t).is_some_and(|owner| data.is_at_war(player, owner))
            && !ctx.tracker.was_conquered(t)
    };

    for t in route.middle() {
        if surface_units && enemy_combat_units(*t) > 0 {
            return result.set_error(messages::ENEMY_ON_PATH);
        }
        if surface_units && enemy_owned(*t) {
            if non_combat {
                return result.set_error(messages::ENEMY_LAND_IN_NON_COMBAT);
            }
            for (id, _, cannot_blitz) in &kinds {
                if *cannot_blitz {
                    result.disallow(messages::CANNOT_BLITZ, *id);
                }
            }
        }
    }

    let end = route.end();
    if non_combat {
        let enemies_at_end = !state
            .units_in_matching(end, |u| data.is_at_war(player, u.owner))
            .is_empty();
        if enemies_at_end {
            return result.set_error(messages::BATTLE_IN_NON_COMBAT);
        }
        if enemy_owned(end) {
            return result.set_error(messages::ENEMY_LAND_IN_NON_COMBAT);
        }
        return;
    }

    let flak: Vec<String> = flak_territories(data, state, player, route, &request.units)
        .into_iter()
        .map(|t| data.map.territory(t).name.clone())
        .collect();
    if !flak.is_empty() {
        result.warn(format!("AA will fire in {}", flak.join(", ")));
    }
}

/// Territories on the route where enemy AA fires at the moving aircraft.
/// Empty unless the fly-over rule is on and aircraft are moving.
#[must_use]
pub fn flak_territories(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    route: &Route,
    units: &[UnitId],
) -> Vec<TerritoryId> {
    let flying = units
        .iter()
        .any(|id| state.unit(*id).is_some_and(|u| data.unit_type(u.unit_type).is_air()));
    if !data.rules.aa_fires_on_flyover || !flying {
        return Vec::new();
    }
    route
        .middle()
        .iter()
        .copied()
        .filter(|t| !enemy_aa(data, state, player, *t).is_empty())
        .collect()
}

/// Enemy AA units in a territory.
#[must_use]
pub fn enemy_aa(data: &GameData, state: &GameState, player: PlayerId, territory: TerritoryId) -> Vec<UnitId> {
    state.units_in_matching(territory, |u| {
        data.is_at_war(player, u.owner) && data.unit_type(u.unit_type).is_aa
    })
}

fn validate_transport(
    ctx: &MoveContext<'_>,
    request: &MoveRequest,
    _player: PlayerId,
    _non_combat: bool,
    result: &mut MoveValidationResult,
) {
    let data = ctx.data;
    let state = ctx.state;
    if route_shape(data, &request.route) != RouteShape::Unload {
        return;
    }
    let end = request.route.end();
    for id in &request.units {
        let Some(transport) = state.transports().transported_by(*id) else {
            continue;
        };
        if state.transports().is_loaded_by_ally_this_turn(*id) {
            result.disallow(messages::ALLIED_UNLOAD, *id);
        }
        if !data.rules.unload_restricted {
            continue;
        }
        let elsewhere = state
            .transports()
            .unloaded_by(transport)
            .into_iter()
            .filter_map(|cargo| state.unit(cargo).and_then(|u| u.state.unloaded_to))
            .find(|t| *t != end);
        if let Some(other) = elsewhere {
            result.disallow(
                format!(
                    "{}{}",
                    messages::ALREADY_UNLOADED_TO,
                    data.map.territory(other).name
                ),
                *id,
            );
        }
    }
}

fn validate_battle_zone(
    ctx: &MoveContext<'_>,
    request: &MoveRequest,
    player: PlayerId,
    _non_combat: bool,
    result: &mut MoveValidationResult,
) {
    let data = ctx.data;
    let state = ctx.state;
    let route = &request.route;
    let Some(battle) = ctx.tracker.battle(BattleKey::normal(route.start())) else {
        return;
    };
    let entered = request.units.iter().any(|id| {
        battle.attacking().contains(id)
            && state
                .unit(*id)
                .is_some_and(|u| !data.unit_type(u.unit_type).is_air())
    });
    if !entered {
        return;
    }
    let end = route.end();
    let attacking_end = state
        .owner(end)
        .map_or(true, |owner| !data.is_allied(player, owner))
        || ctx.tracker.was_conquered(end);
    let unload_into_attack = route_shape(data, route) == RouteShape::Unload && attacking_end;
    if !unload_into_attack {
        result.set_error(messages::OUT_OF_BATTLE);
    }
}
