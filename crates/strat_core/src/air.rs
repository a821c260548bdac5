//! Where aircraft can land.
//!
//! Shared by move validation (can this flight end safely?) and by the
//! end-of-combat cleanup that removes stranded aircraft. Air movement counts
//! steps and ignores terrain cost.

use std::collections::{BTreeMap, BTreeSet};

use crate::game_data::GameData;
use crate::ids::{PlayerId, TerritoryId, UnitId};
use crate::state::GameState;

/// Check if `player`'s aircraft may land in a territory: friendly land,
/// not conquered this turn, with no enemy units present.
#[must_use]
pub fn is_friendly_landing(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    territory: TerritoryId,
    conquered: &BTreeSet<TerritoryId>,
) -> bool {
    if data.map.is_water(territory) || conquered.contains(&territory) {
        return false;
    }
    let Some(owner) = state.owner(territory) else {
        return false;
    };
    data.is_allied(player, owner) && !has_enemy_units(data, state, player, territory)
}

/// Check if a territory holds units at war with `player`.
#[must_use]
pub fn has_enemy_units(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    territory: TerritoryId,
) -> bool {
    !state
        .units_in_matching(territory, |u| data.is_at_war(player, u.owner))
        .is_empty()
}

/// Spare carrier capacity for `player` in a sea zone, counting allied
/// carriers already there plus `arriving_carriers`, minus allied aircraft
/// already there that are not in `excluding`.
#[must_use]
pub fn carrier_space(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    territory: TerritoryId,
    arriving_carriers: &[UnitId],
    excluding: &BTreeSet<UnitId>,
) -> u32 {
    if !data.map.is_water(territory) {
        return 0;
    }
    let allied = |owner| data.is_allied(player, owner);
    let mut capacity = 0u32;
    let mut used = 0u32;
    for id in state.units_in(territory) {
        let Some(unit) = state.unit(id) else { continue };
        if !allied(unit.owner) {
            continue;
        }
        let unit_type = data.unit_type(unit.unit_type);
        capacity += unit_type.carrier_capacity.unwrap_or(0);
        if unit_type.is_air() && !excluding.contains(&id) {
            used += unit_type.carrier_cost.unwrap_or(0);
        }
    }
    for id in arriving_carriers {
        if let Some(unit) = state.unit(*id) {
            if unit.location != territory {
                capacity += data.unit_type(unit.unit_type).carrier_capacity.unwrap_or(0);
            }
        }
    }
    capacity.saturating_sub(used)
}

/// Aircraft in `units` that would have nowhere to land after moving
/// `steps` to `end`.
///
/// An aircraft is safe if `end` is friendly land, if carrier space is left
/// at `end` (carriers moving with it count), or, outside non-combat
/// movement, if friendly land or a carrier with space lies within its
/// remaining movement. Carrier space is handed out in unit id order.
#[must_use]
pub fn air_that_cannot_land(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    units: &[UnitId],
    end: TerritoryId,
    steps: u32,
    non_combat: bool,
    conquered: &BTreeSet<TerritoryId>,
) -> Vec<UnitId> {
    let mut air: Vec<UnitId> = units
        .iter()
        .copied()
        .filter(|id| {
            state
                .unit(*id)
                .is_some_and(|u| data.unit_type(u.unit_type).is_air())
        })
        .collect();
    air.sort_unstable();
    if air.is_empty() || is_friendly_landing(data, state, player, end, conquered) {
        return Vec::new();
    }

    let moving: BTreeSet<UnitId> = units.iter().copied().collect();
    let carriers: Vec<UnitId> = units
        .iter()
        .copied()
        .filter(|id| {
            state
                .unit(*id)
                .is_some_and(|u| data.unit_type(u.unit_type).is_carrier())
        })
        .collect();
    let mut space = carrier_space(data, state, player, end, &carriers, &moving);

    let mut stranded = Vec::new();
    for id in air {
        let Some(unit) = state.unit(id) else { continue };
        let unit_type = data.unit_type(unit.unit_type);
        if let Some(cost) = unit_type.carrier_cost {
            if cost <= space {
                space -= cost;
                continue;
            }
        }
        if non_combat {
            stranded.push(id);
            continue;
        }
        let remaining = unit_type
            .movement
            .saturating_sub(unit.state.moved)
            .saturating_sub(steps);
        if !can_reach_landing(data, state, player, end, remaining, unit_type.carrier_cost, conquered) {
            stranded.push(id);
        }
    }
    stranded
}

fn can_reach_landing(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    from: TerritoryId,
    range: u32,
    carrier_cost: Option<u32>,
    conquered: &BTreeSet<TerritoryId>,
) -> bool {
    let reachable: BTreeMap<TerritoryId, u32> = data.map.within(from, range);
    reachable.keys().any(|t| {
        is_friendly_landing(data, state, player, *t, conquered)
            || carrier_cost.is_some_and(|cost| {
                carrier_space(data, state, player, *t, &[], &BTreeSet::new()) >= cost
            })
    })
}

/// `player`'s aircraft that are not on friendly land and do not fit on
/// the carriers where they are. These are lost at the end of combat.
#[must_use]
pub fn stranded_air(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    conquered: &BTreeSet<TerritoryId>,
) -> Vec<UnitId> {
    let mut by_location: BTreeMap<TerritoryId, Vec<UnitId>> = BTreeMap::new();
    for unit in state.all_units() {
        if unit.owner == player && data.unit_type(unit.unit_type).is_air() {
            by_location.entry(unit.location).or_default().push(unit.id);
        }
    }

    let mut stranded = Vec::new();
    for (territory, air) in by_location {
        if is_friendly_landing(data, state, player, territory, conquered) {
            continue;
        }
        let excluding: BTreeSet<UnitId> = air.iter().copied().collect();
        let mut space = carrier_space(data, state, player, territory, &[], &excluding);
        for id in air {
            let cost = state
                .unit(id)
                .and_then(|u| data.unit_type(u.unit_type).carrier_cost);
            match cost {
                Some(cost) if cost <= space => space -= cost,
                _ => stranded.push(id),
            }
        }
    }
    stranded
}
