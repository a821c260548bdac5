//! Casualty selection.
//!
//! Given a hit count and a pool of targets, decide who dies and who is
//! damaged. The engine decides alone when the outcome is forced:
//! - the hits cover every hit point in the pool, so everything dies;
//! - all candidates are identical one-hit units of one owner;
//! - restricted transport casualties force the combat units out first.
//!
//! Everything else becomes a [`CasualtyChoice`] for the owning player,
//! carrying a proposed default. Answers are checked by
//! [`validate_selection`] before anything is committed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GameError, Result};
use crate::game_data::GameData;
use crate::ids::{PlayerId, UnitId};
use crate::state::{group_by_owner, GameState};

/// Units killed and damaged by one volley.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasualtyDetails {
    /// Units removed.
    pub killed: Vec<UnitId>,
    /// One entry per hit absorbed without dying; a unit may repeat.
    pub damaged: Vec<UnitId>,
    /// Decided by the engine without asking anyone.
    pub auto_calculated: bool,
}

impl CasualtyDetails {
    /// Casualties chosen by a player.
    #[must_use]
    pub fn new(killed: Vec<UnitId>, damaged: Vec<UnitId>) -> Self {
        Self {
            killed,
            damaged,
            auto_calculated: false,
        }
    }

    /// Casualties decided by the engine.
    #[must_use]
    pub fn automatic(killed: Vec<UnitId>, damaged: Vec<UnitId>) -> Self {
        Self {
            killed,
            damaged,
            auto_calculated: true,
        }
    }

    /// Check if nobody was hit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.killed.is_empty() && self.damaged.is_empty()
    }

    /// Fold another selection into this one.
    pub fn merge(&mut self, other: CasualtyDetails) {
        self.killed.extend(other.killed);
        self.damaged.extend(other.damaged);
        self.auto_calculated &= other.auto_calculated;
    }
}

/// Options that shape casualty selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasualtyConstraints {
    /// Multi-hit-point units absorb hits as damage before dying.
    pub allow_multiple_hits_per_unit: bool,
    /// Pure transports die only after every other unit.
    pub restrict_transports: bool,
}

impl CasualtyConstraints {
    /// Constraints for ordinary combat fire under the given rules.
    #[must_use]
    pub fn for_combat(data: &GameData) -> Self {
        Self {
            allow_multiple_hits_per_unit: true,
            restrict_transports: data.rules.transport_casualties_restricted,
        }
    }

    /// Constraints for AA fire: every hit kills.
    #[must_use]
    pub const fn single_hit() -> Self {
        Self {
            allow_multiple_hits_per_unit: false,
            restrict_transports: false,
        }
    }
}

/// A decision the owning player must make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasualtyChoice {
    /// Player who chooses.
    pub player: PlayerId,
    /// Hits to assign.
    pub hits: u32,
    /// Units that may be chosen.
    pub candidates: Vec<UnitId>,
    /// Engine's proposal.
    pub default_selection: CasualtyDetails,
    /// Damage is allowed.
    pub allow_multiple_hits_per_unit: bool,
    /// Transports among the candidates and the cargo that dies with them.
    pub dependents: BTreeMap<UnitId, Vec<UnitId>>,
}

/// What the selector decided: a forced part and any choices left to players.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasualtySelection {
    /// Casualties the engine decided alone.
    pub forced: CasualtyDetails,
    /// Decisions still needed, one per player at most.
    pub choices: Vec<CasualtyChoice>,
}

impl CasualtySelection {
    /// Check if no player input is needed.
    #[must_use]
    pub fn is_auto_determined(&self) -> bool {
        self.choices.is_empty()
    }

    /// Combine the forced part with the players' answers (same order as
    /// `choices`).
    #[must_use]
    pub fn resolve(&self, answers: Vec<CasualtyDetails>) -> CasualtyDetails {
        let mut details = self.forced.clone();
        details.auto_calculated = self.choices.is_empty();
        for answer in answers {
            details.killed.extend(answer.killed);
            details.damaged.extend(answer.damaged);
        }
        details
    }

    /// Resolve every choice with its default selection.
    #[must_use]
    pub fn resolve_with_defaults(&self) -> CasualtyDetails {
        self.resolve(
            self.choices
                .iter()
                .map(|c| c.default_selection.clone())
                .collect(),
        )
    }
}

fn remaining_hit_points(data: &GameData, state: &GameState, unit: UnitId) -> u32 {
    state.unit(unit).map_or(0, |u| {
        data.unit_type(u.unit_type)
            .hit_points
            .saturating_sub(u.state.hits)
            .max(1)
    })
}

/// Hits a pool can absorb: one per unit, or every remaining hit point when
/// multiple hits per unit are allowed.
#[must_use]
pub fn hit_capacity(data: &GameData, state: &GameState, units: &[UnitId], allow_multi: bool) -> u32 {
    if allow_multi {
        units
            .iter()
            .map(|u| remaining_hit_points(data, state, *u))
            .sum()
    } else {
        units.len() as u32
    }
}

fn is_pure_transport(data: &GameData, state: &GameState, unit: UnitId) -> bool {
    state
        .unit(unit)
        .is_some_and(|u| data.unit_type(u.unit_type).is_pure_transport())
}

/// The engine's proposal: damage multi-hit units first, then kill the
/// cheapest, weakest units.
#[must_use]
pub fn default_casualties(
    data: &GameData,
    state: &GameState,
    candidates: &[UnitId],
    hits: u32,
    allow_multi: bool,
) -> CasualtyDetails {
    let mut order: Vec<UnitId> = candidates.to_vec();
    order.sort_by_key(|id| {
        state.unit(*id).map_or((u32::MAX, u32::MAX, *id), |u| {
            let t = data.unit_type(u.unit_type);
            (t.cost, t.attack + t.defense, *id)
        })
    });

    let mut remaining = hits;
    let mut damaged = Vec::new();
    let mut damaged_count: BTreeMap<UnitId, u32> = BTreeMap::new();

    if allow_multi {
        for id in order.iter().rev() {
            let spare = remaining_hit_points(data, state, *id).saturating_sub(1);
            let take = spare.min(remaining);
            for _ in 0..take {
                damaged.push(*id);
            }
            if take > 0 {
                damaged_count.insert(*id, take);
            }
            remaining -= take;
        }
    }

    let mut killed = Vec::new();
    for id in &order {
        if remaining == 0 {
            break;
        }
        if damaged_count.contains_key(id) {
            continue;
        }
        killed.push(*id);
        let absorbed = if allow_multi {
            remaining_hit_points(data, state, *id)
        } else {
            1
        };
        remaining = remaining.saturating_sub(absorbed);
    }

    // Damaged units still standing may have to die when hits remain.
    for id in &order {
        if remaining == 0 {
            break;
        }
        if let Some(taken) = damaged_count.remove(id) {
            damaged.retain(|d| d != id);
            killed.push(*id);
            remaining = remaining.saturating_sub(remaining_hit_points(data, state, *id) - taken);
        }
    }

    CasualtyDetails::new(killed, damaged)
}

fn dependents_of(state: &GameState, candidates: &[UnitId]) -> BTreeMap<UnitId, Vec<UnitId>> {
    candidates
        .iter()
        .filter_map(|id| {
            let cargo = state.transports().cargo_of(*id);
            (!cargo.is_empty()).then_some((*id, cargo))
        })
        .collect()
}

fn all_identical_single_hit(data: &GameData, state: &GameState, candidates: &[UnitId]) -> bool {
    let mut kinds = BTreeSet::new();
    for id in candidates {
        let Some(unit) = state.unit(*id) else {
            return false;
        };
        if remaining_hit_points(data, state, *id) != 1 || state.transports().is_transporting(*id) {
            return false;
        }
        kinds.insert((unit.unit_type, unit.owner));
    }
    kinds.len() <= 1
}

fn choose(
    data: &GameData,
    state: &GameState,
    player: PlayerId,
    hits: u32,
    candidates: &[UnitId],
    allow_multi: bool,
) -> CasualtySelection {
    if all_identical_single_hit(data, state, candidates) {
        let mut killed = candidates.to_vec();
        killed.sort_unstable();
        killed.truncate(hits as usize);
        return CasualtySelection {
            forced: CasualtyDetails::automatic(killed, Vec::new()),
            choices: Vec::new(),
        };
    }
    CasualtySelection {
        forced: CasualtyDetails::automatic(Vec::new(), Vec::new()),
        choices: vec![CasualtyChoice {
            player,
            hits,
            candidates: candidates.to_vec(),
            default_selection: default_casualties(data, state, candidates, hits, allow_multi),
            allow_multiple_hits_per_unit: allow_multi,
            dependents: dependents_of(state, candidates),
        }],
    }
}

/// Decide casualties for `hits` against `candidates`.
///
/// Infrastructure is never a candidate and is filtered out here.
#[must_use]
pub fn select_casualties(
    data: &GameData,
    state: &GameState,
    hits: u32,
    candidates: &[UnitId],
    selecting_player: PlayerId,
    constraints: CasualtyConstraints,
) -> CasualtySelection {
    let allow_multi = constraints.allow_multiple_hits_per_unit;
    let pool: Vec<UnitId> = candidates
        .iter()
        .copied()
        .filter(|id| {
            state
                .unit(*id)
                .is_some_and(|u| !data.unit_type(u.unit_type).is_infrastructure)
        })
        .collect();

    if hits == 0 || pool.is_empty() {
        return CasualtySelection {
            forced: CasualtyDetails::automatic(Vec::new(), Vec::new()),
            choices: Vec::new(),
        };
    }

    if hits >= hit_capacity(data, state, &pool, allow_multi) {
        tracing::debug!(hits, pool = pool.len(), "Hits cover the whole pool");
        return CasualtySelection {
            forced: CasualtyDetails::automatic(pool, Vec::new()),
            choices: Vec::new(),
        };
    }

    let (transports, others): (Vec<UnitId>, Vec<UnitId>) = pool
        .iter()
        .partition(|id| is_pure_transport(data, state, **id));

    if constraints.restrict_transports && !transports.is_empty() && !others.is_empty() {
        let others_capacity = hit_capacity(data, state, &others, allow_multi);
        if hits < others_capacity {
            return choose(data, state, selecting_player, hits, &others, allow_multi);
        }
        let mut selection = CasualtySelection {
            forced: CasualtyDetails::automatic(others, Vec::new()),
            choices: Vec::new(),
        };
        let spill = spill_onto_transports(state, &transports, hits - others_capacity);
        for (owner, (hits_here, owned)) in spill {
            if hits_here as usize >= owned.len() {
                selection.forced.killed.extend(owned);
            } else {
                let part = choose(data, state, owner, hits_here, &owned, allow_multi);
                selection.forced.killed.extend(part.forced.killed);
                selection.choices.extend(part.choices);
            }
        }
        tracing::debug!(
            hits,
            forced = selection.forced.killed.len(),
            choices = selection.choices.len(),
            "Restricted transport casualties"
        );
        return selection;
    }

    choose(data, state, selecting_player, hits, &pool, allow_multi)
}

/// Distribute `hits` over the transports of each owner so that, while the
/// hits do not exhaust every transport, each owner keeps at least one.
/// Each hit goes to the owner with the most transports left, lowest
/// player id first on ties.
fn spill_onto_transports(
    state: &GameState,
    transports: &[UnitId],
    hits: u32,
) -> BTreeMap<PlayerId, (u32, Vec<UnitId>)> {
    let groups = group_by_owner(state, transports);
    let mut left: BTreeMap<PlayerId, u32> = groups
        .iter()
        .map(|(owner, units)| (*owner, units.len() as u32))
        .collect();
    let mut assigned: BTreeMap<PlayerId, u32> = BTreeMap::new();

    for _ in 0..hits {
        let Some(owner) = left
            .iter()
            .filter(|(_, n)| **n > 0)
            .max_by(|(pa, na), (pb, nb)| na.cmp(nb).then(pb.cmp(pa)))
            .map(|(owner, _)| *owner)
        else {
            break;
        };
        if let Some(n) = left.get_mut(&owner) {
            *n -= 1;
        }
        *assigned.entry(owner).or_insert(0) += 1;
    }

    groups
        .into_iter()
        .filter_map(|(owner, units)| {
            let hits_here = assigned.get(&owner).copied().unwrap_or(0);
            (hits_here > 0).then_some((owner, (hits_here, units)))
        })
        .collect()
}

/// Check a player's answer to a [`CasualtyChoice`].
///
/// The answer must name only candidates, name each killed unit once,
/// damage only units with hit points to spare, and absorb exactly
/// `min(hits, capacity)` hits.
///
/// # Errors
/// Returns [`GameError::InvalidCasualtySelection`] describing the first
/// problem found.
pub fn validate_selection(
    data: &GameData,
    state: &GameState,
    choice: &CasualtyChoice,
    answer: &CasualtyDetails,
) -> Result<()> {
    let candidates: BTreeSet<UnitId> = choice.candidates.iter().copied().collect();
    let invalid = |message: String| Err(GameError::InvalidCasualtySelection(message));

    let mut killed = BTreeSet::new();
    for id in &answer.killed {
        if !candidates.contains(id) {
            return invalid(format!("{id} is not a candidate"));
        }
        if !killed.insert(*id) {
            return invalid(format!("{id} is killed twice"));
        }
    }

    let mut damage: BTreeMap<UnitId, u32> = BTreeMap::new();
    for id in &answer.damaged {
        if !candidates.contains(id) {
            return invalid(format!("{id} is not a candidate"));
        }
        if killed.contains(id) {
            return invalid(format!("{id} is both killed and damaged"));
        }
        *damage.entry(*id).or_insert(0) += 1;
    }
    if !choice.allow_multiple_hits_per_unit && !damage.is_empty() {
        return invalid("damage is not allowed for this volley".into());
    }
    for (id, taken) in &damage {
        let spare = remaining_hit_points(data, state, *id).saturating_sub(1);
        if *taken > spare {
            return invalid(format!("{id} cannot absorb {taken} hits without dying"));
        }
    }

    let absorbed: u32 = answer
        .killed
        .iter()
        .map(|id| {
            if choice.allow_multiple_hits_per_unit {
                remaining_hit_points(data, state, *id)
            } else {
                1
            }
        })
        .sum::<u32>()
        + answer.damaged.len() as u32;
    let capacity = hit_capacity(
        data,
        state,
        &choice.candidates,
        choice.allow_multiple_hits_per_unit,
    );
    let required = choice.hits.min(capacity);
    if absorbed != required {
        return invalid(format!("selection absorbs {absorbed} hits, expected {required}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::classic_world;

    #[test]
    fn test_hits_cover_pool_kills_everything() {
        let mut world = classic_world(false);
        let mut pool = world.place_many(world.defender, world.land, "infantry", 2);
        pool.push(world.place(world.defender, world.land, "armour"));
        let selection = select_casualties(
            &world.data,
            &world.state,
            5,
            &pool,
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        assert!(selection.is_auto_determined());
        assert!(selection.forced.auto_calculated);
        assert_eq!(selection.forced.killed, pool);
    }

    #[test]
    fn test_zero_hits_is_empty() {
        let mut world = classic_world(false);
        let pool = world.place_many(world.defender, world.land, "infantry", 2);
        let selection = select_casualties(
            &world.data,
            &world.state,
            0,
            &pool,
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        assert!(selection.forced.is_empty());
        assert!(selection.is_auto_determined());
    }

    #[test]
    fn test_identical_units_are_automatic() {
        let mut world = classic_world(false);
        let pool = world.place_many(world.defender, world.land, "infantry", 3);
        let selection = select_casualties(
            &world.data,
            &world.state,
            2,
            &pool,
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        assert!(selection.is_auto_determined());
        assert_eq!(selection.forced.killed, pool[..2].to_vec());
    }

    #[test]
    fn test_mixed_pool_needs_a_choice_with_cheapest_default() {
        let mut world = classic_world(false);
        let armour = world.place(world.defender, world.land, "armour");
        let infantry = world.place(world.defender, world.land, "infantry");
        let pool = vec![armour, infantry];
        let selection = select_casualties(
            &world.data,
            &world.state,
            1,
            &pool,
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        assert_eq!(selection.choices.len(), 1);
        let choice = &selection.choices[0];
        assert_eq!(choice.player, world.defender);
        assert_eq!(choice.default_selection.killed, vec![infantry]);
        validate_selection(&world.data, &world.state, choice, &choice.default_selection).unwrap();
    }

    #[test]
    fn test_battleship_is_damaged_before_anything_dies() {
        let mut world = classic_world(false);
        let battleship = world.place(world.defender, world.sea, "battleship");
        let destroyer = world.place(world.defender, world.sea, "destroyer");
        let selection = select_casualties(
            &world.data,
            &world.state,
            1,
            &[battleship, destroyer],
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        let default = &selection.choices[0].default_selection;
        assert_eq!(default.damaged, vec![battleship]);
        assert!(default.killed.is_empty());
    }

    #[test]
    fn test_validation_rejects_wrong_count_and_strangers() {
        let mut world = classic_world(false);
        let armour = world.place(world.defender, world.land, "armour");
        let infantry = world.place(world.defender, world.land, "infantry");
        let stranger = world.place(world.defender, world.far, "infantry");
        let selection = select_casualties(
            &world.data,
            &world.state,
            1,
            &[armour, infantry],
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        let choice = &selection.choices[0];

        let too_many = CasualtyDetails::new(vec![armour, infantry], Vec::new());
        assert!(matches!(
            validate_selection(&world.data, &world.state, choice, &too_many),
            Err(GameError::InvalidCasualtySelection(_))
        ));
        let wrong_unit = CasualtyDetails::new(vec![stranger], Vec::new());
        assert!(validate_selection(&world.data, &world.state, choice, &wrong_unit).is_err());
        let duplicate = CasualtyDetails::new(vec![armour, armour], Vec::new());
        assert!(validate_selection(&world.data, &world.state, choice, &duplicate).is_err());
        let armour_only = CasualtyDetails::new(vec![armour], Vec::new());
        assert!(validate_selection(&world.data, &world.state, choice, &armour_only).is_ok());
    }

    #[test]
    fn test_validation_rejects_damage_beyond_spare_hit_points() {
        let mut world = classic_world(false);
        let battleship = world.place(world.defender, world.sea, "battleship");
        let destroyer = world.place(world.defender, world.sea, "destroyer");
        let selection = select_casualties(
            &world.data,
            &world.state,
            2,
            &[battleship, destroyer],
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        let choice = &selection.choices[0];
        let double_damage = CasualtyDetails::new(Vec::new(), vec![battleship, battleship]);
        assert!(validate_selection(&world.data, &world.state, choice, &double_damage).is_err());
        let ok = CasualtyDetails::new(vec![destroyer], vec![battleship]);
        assert!(validate_selection(&world.data, &world.state, choice, &ok).is_ok());
    }

    #[test]
    fn test_restricted_transports_protected_while_combat_units_absorb() {
        let mut world = classic_world(false);
        let destroyer = world.place(world.defender, world.sea, "destroyer");
        let submarine = world.place(world.defender, world.sea, "submarine");
        let transport = world.place(world.defender, world.sea, "transport");
        let selection = select_casualties(
            &world.data,
            &world.state,
            1,
            &[destroyer, submarine, transport],
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        assert_eq!(selection.choices.len(), 1);
        assert!(!selection.choices[0].candidates.contains(&transport));
    }

    #[test]
    fn test_restricted_transports_leave_one_per_owner() {
        let mut world = classic_world(false);
        let destroyer = world.place(world.defender, world.sea, "destroyer");
        let russian = world.place_many(world.defender, world.sea, "transport", 2);
        let british = world.place_many(world.defender_ally, world.sea, "transport", 2);
        let mut pool = vec![destroyer];
        pool.extend(&russian);
        pool.extend(&british);

        // 1 hit on the destroyer, 2 spill onto transports: one per owner.
        let selection = select_casualties(
            &world.data,
            &world.state,
            3,
            &pool,
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        assert!(selection.is_auto_determined());
        let killed = &selection.forced.killed;
        assert!(killed.contains(&destroyer));
        assert_eq!(killed.iter().filter(|u| russian.contains(u)).count(), 1);
        assert_eq!(killed.iter().filter(|u| british.contains(u)).count(), 1);
    }

    #[test]
    fn test_unrestricted_transports_are_ordinary_candidates() {
        let mut world = classic_world(false);
        world.data.rules.transport_casualties_restricted = false;
        let destroyer = world.place(world.defender, world.sea, "destroyer");
        let transport = world.place(world.defender, world.sea, "transport");
        let selection = select_casualties(
            &world.data,
            &world.state,
            1,
            &[destroyer, transport],
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        assert!(selection.choices[0].candidates.contains(&transport));
    }

    #[test]
    fn test_infrastructure_is_never_a_casualty() {
        let mut world = classic_world(false);
        let aa = world.place(world.defender, world.land, "aa_gun");
        let infantry = world.place(world.defender, world.land, "infantry");
        let selection = select_casualties(
            &world.data,
            &world.state,
            2,
            &[aa, infantry],
            world.defender,
            CasualtyConstraints::for_combat(&world.data),
        );
        assert_eq!(selection.forced.killed, vec![infantry]);
    }
}
