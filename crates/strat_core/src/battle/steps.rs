//! Battle steps.
//!
//! Each step runs atomically. A step that needs answers parks itself back
//! on the stack with its progress recorded (dice already rolled, requests
//! already issued) and picks up from there when every answer is in, so no
//! die is ever rolled twice.
//!
//! A round, in execution order:
//! 1. AA fire, casualties removed at once (first round)
//! 2. shore bombardment, casualties held until the end of the round
//!    (first round)
//! 3. submerge before battle, if the rules allow it (first round)
//! 4. submarine sneak attacks, casualties removed before return fire
//! 5. main fire from both sides, casualties picked from the same roster
//! 6. removal of everything picked this round
//! 7. unescorted transports are lost
//! 8. end check, then retreat and submerge offers, then the next round

use std::collections::{BTreeMap, BTreeSet};

use super::fight::Battle;
use super::{BattleOutcome, Side};
use crate::bridge::Bridge;
use crate::casualty::{select_casualties, CasualtyChoice, CasualtyConstraints, CasualtyDetails};
use crate::change::Change;
use crate::decision::{DecisionKind, DecisionRequest, DecisionResponse, RequestId};
use crate::dice::RollContext;
use crate::error::Result;
use crate::game_data::GameData;
use crate::ids::{TerritoryId, UnitId};
use crate::state::GameState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FireKind {
    Aa,
    Bombard,
    Sneak,
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetFilter {
    All,
    NotAir,
    NotSub,
    AirOnly,
}

#[derive(Debug, Clone)]
enum VolleyStatus {
    Waiting,
    Requested {
        forced: CasualtyDetails,
        requests: Vec<RequestId>,
    },
    Done,
}

#[derive(Debug, Clone)]
struct Volley {
    firing: Side,
    filter: TargetFilter,
    hits: u32,
    aa: bool,
    status: VolleyStatus,
}

#[derive(Debug, Clone)]
pub(super) struct FireStep {
    kind: FireKind,
    volleys: Option<Vec<Volley>>,
}

#[derive(Debug, Clone)]
pub(super) enum Step {
    StartRound,
    Fire(FireStep),
    RemoveCasualties { end_of_round: bool },
    RemoveUnescortedTransports,
    CheckEnd,
    Withdraw {
        retreat: bool,
        requests: Option<Vec<DecisionRequest>>,
    },
    NextRound,
    RaidDamage,
    ResolveUnopposed,
}

impl Step {
    pub(super) const fn fire(kind: FireKind) -> Self {
        Self::Fire(FireStep {
            kind,
            volleys: None,
        })
    }
}

pub(super) enum StepResult {
    Done,
    Suspend(Step),
    Finish(BattleOutcome),
}

fn matches_filter(data: &GameData, state: &GameState, unit: UnitId, filter: TargetFilter) -> bool {
    let Some(unit) = state.unit(unit) else {
        return false;
    };
    let unit_type = data.unit_type(unit.unit_type);
    match filter {
        TargetFilter::All => true,
        TargetFilter::NotAir => !unit_type.is_air(),
        TargetFilter::NotSub => !unit_type.is_sub,
        TargetFilter::AirOnly => unit_type.is_air(),
    }
}

fn type_matches<F>(data: &GameData, state: &GameState, unit: UnitId, predicate: F) -> bool
where
    F: Fn(&crate::data::UnitTypeData) -> bool,
{
    state
        .unit(unit)
        .is_some_and(|u| predicate(data.unit_type(u.unit_type)))
}

impl Battle {
    pub(super) fn execute(&mut self, step: Step, bridge: &mut Bridge<'_>) -> Result<StepResult> {
        tracing::trace!(battle = %self.key, round = self.round, ?step, "Executing step");
        match step {
            Step::StartRound => Ok(self.start_round(bridge)),
            Step::Fire(fire) => self.fire(fire, bridge),
            Step::RemoveCasualties { end_of_round } => {
                if end_of_round {
                    let deferred = std::mem::take(&mut self.deferred_casualties);
                    self.casualties.killed.extend(deferred.killed);
                    self.casualties.damaged.extend(deferred.damaged);
                }
                self.remove_casualties(bridge)?;
                Ok(StepResult::Done)
            }
            Step::RemoveUnescortedTransports => {
                self.remove_unescorted_transports(bridge)?;
                Ok(StepResult::Done)
            }
            Step::CheckEnd => Ok(self
                .end_condition(bridge.data(), bridge.state(), true)
                .map_or(StepResult::Done, StepResult::Finish)),
            Step::Withdraw { retreat, requests } => self.withdraw(bridge, retreat, requests),
            Step::NextRound => {
                self.round += 1;
                self.stack.push(Step::StartRound);
                Ok(StepResult::Done)
            }
            Step::RaidDamage => self.raid_damage(bridge),
            Step::ResolveUnopposed => Ok(StepResult::Finish(BattleOutcome::AttackerWon)),
        }
    }

    fn start_round(&mut self, bridge: &mut Bridge<'_>) -> StepResult {
        let data = bridge.data();
        if let Some(outcome) = self.end_condition(data, bridge.state(), false) {
            return StepResult::Finish(outcome);
        }
        self.fired_first.clear();
        let first = self.round == 1;

        self.stack.push(Step::NextRound);
        self.stack.push(Step::Withdraw {
            retreat: true,
            requests: None,
        });
        self.stack.push(Step::CheckEnd);
        self.stack.push(Step::RemoveUnescortedTransports);
        self.stack.push(Step::RemoveCasualties { end_of_round: true });
        self.stack.push(Step::fire(FireKind::Main));
        self.stack.push(Step::RemoveCasualties { end_of_round: false });
        self.stack.push(Step::fire(FireKind::Sneak));
        if first && data.rules.submerge_before_battle {
            self.stack.push(Step::Withdraw {
                retreat: false,
                requests: None,
            });
        }
        if first {
            self.stack.push(Step::fire(FireKind::Bombard));
            self.stack.push(Step::RemoveCasualties { end_of_round: false });
            self.stack.push(Step::fire(FireKind::Aa));
        }
        bridge.start_event(format!("Round {} of {}", self.round, self.key));
        StepResult::Done
    }

    pub(super) fn has_destroyer(&self, data: &GameData, state: &GameState, side: Side) -> bool {
        self.active(state, side)
            .iter()
            .any(|id| type_matches(data, state, *id, |t| t.is_destroyer))
    }

    fn pending_killed(&self) -> BTreeSet<UnitId> {
        self.casualties
            .killed
            .iter()
            .chain(&self.deferred_casualties.killed)
            .copied()
            .collect()
    }

    fn targets(&self, data: &GameData, state: &GameState, side: Side, filter: TargetFilter) -> Vec<UnitId> {
        let killed = self.pending_killed();
        self.active(state, side)
            .into_iter()
            .filter(|id| !killed.contains(id))
            .filter(|id| matches_filter(data, state, *id, filter))
            .filter(|id| !type_matches(data, state, *id, |t| t.is_infrastructure))
            .collect()
    }

    fn fire(&mut self, mut fire: FireStep, bridge: &mut Bridge<'_>) -> Result<StepResult> {
        if fire.volleys.is_none() {
            fire.volleys = Some(self.roll_volleys(fire.kind, bridge)?);
        }
        let Some(mut volleys) = fire.volleys.take() else {
            return Ok(StepResult::Done);
        };
        let finished = self.select_for_volleys(fire.kind, &mut volleys, bridge)?;
        if finished {
            Ok(StepResult::Done)
        } else {
            fire.volleys = Some(volleys);
            Ok(StepResult::Suspend(Step::Fire(fire)))
        }
    }

    fn roll_volleys(&mut self, kind: FireKind, bridge: &mut Bridge<'_>) -> Result<Vec<Volley>> {
        let data = bridge.data();
        let territory = self.key.territory;
        let territory_name = data.map.territory(territory).name.clone();
        let mut volleys = Vec::new();

        match kind {
            FireKind::Aa => {
                let state = bridge.state();
                let aa: Vec<UnitId> = self
                    .active(state, Side::Defender)
                    .into_iter()
                    .filter(|id| type_matches(data, state, *id, |t| t.is_aa && t.aa_strength > 0))
                    .collect();
                let targets = self.targets(data, state, Side::Attacker, TargetFilter::AirOnly);
                if aa.is_empty() || targets.is_empty() {
                    return Ok(volleys);
                }
                let roll = bridge.roll_aa(
                    &aa,
                    &targets,
                    self.defender,
                    &format!("AA fire in {territory_name}"),
                )?;
                volleys.push(Volley::new(Side::Defender, TargetFilter::AirOnly, roll.hits(), true));
            }
            FireKind::Bombard => {
                let state = bridge.state();
                let firers: Vec<UnitId> = self
                    .bombarding
                    .iter()
                    .copied()
                    .filter(|id| state.contains_unit(*id))
                    .collect();
                if firers.is_empty() {
                    return Ok(volleys);
                }
                let context =
                    RollContext::bombardment(territory, format!("Bombardment of {territory_name}"));
                let roll = bridge.roll_dice(&firers, false, self.attacker, &context)?;
                volleys.push(Volley::new(Side::Attacker, TargetFilter::All, roll.hits(), false));
            }
            FireKind::Sneak => {
                for side in [Side::Attacker, Side::Defender] {
                    let state = bridge.state();
                    let allowed = match side {
                        Side::Attacker => data.rules.sub_sneak_attack,
                        Side::Defender => data.rules.defending_subs_sneak_attack,
                    };
                    if !allowed || self.has_destroyer(data, state, side.opponent()) {
                        continue;
                    }
                    let subs: Vec<UnitId> = self
                        .active(state, side)
                        .into_iter()
                        .filter(|id| type_matches(data, state, *id, |t| t.is_sub))
                        .collect();
                    if subs.is_empty()
                        || self
                            .targets(data, state, side.opponent(), TargetFilter::NotAir)
                            .is_empty()
                    {
                        continue;
                    }
                    self.fired_first.extend(subs.iter().copied());
                    let context = RollContext::new(
                        territory,
                        self.active(state, side),
                        format!("Submarine sneak attack in {territory_name}"),
                    );
                    let roll = bridge.roll_dice(
                        &subs,
                        side.is_defending(),
                        self.player_of(side),
                        &context,
                    )?;
                    volleys.push(Volley::new(side, TargetFilter::NotAir, roll.hits(), false));
                }
            }
            FireKind::Main => {
                for side in [Side::Attacker, Side::Defender] {
                    for (filter, firers) in self.firing_groups(data, bridge.state(), side) {
                        let state = bridge.state();
                        if self.targets(data, state, side.opponent(), filter).is_empty() {
                            continue;
                        }
                        let context = RollContext::new(
                            territory,
                            self.active(state, side),
                            format!("{side:?} fire in {territory_name}"),
                        );
                        let roll = bridge.roll_dice(
                            &firers,
                            side.is_defending(),
                            self.player_of(side),
                            &context,
                        )?;
                        volleys.push(Volley::new(side, filter, roll.hits(), false));
                    }
                }
            }
        }
        Ok(volleys)
    }

    /// Split a side's main fire by what each unit may hit: submarines never
    /// hit aircraft, aircraft cannot find submarines without a friendly
    /// destroyer.
    fn firing_groups(&self, data: &GameData, state: &GameState, side: Side) -> Vec<(TargetFilter, Vec<UnitId>)> {
        let air_blind = data.rules.air_cannot_hit_subs_without_destroyer
            && !self.has_destroyer(data, state, side);
        let mut groups: BTreeMap<u8, (TargetFilter, Vec<UnitId>)> = BTreeMap::new();
        for id in self.active(state, side) {
            if self.fired_first.contains(&id) {
                continue;
            }
            let Some(unit) = state.unit(id) else { continue };
            let unit_type = data.unit_type(unit.unit_type);
            let (order, filter) = if unit_type.is_sub {
                (1, TargetFilter::NotAir)
            } else if unit_type.is_air() && air_blind {
                (2, TargetFilter::NotSub)
            } else {
                (0, TargetFilter::All)
            };
            groups
                .entry(order)
                .or_insert_with(|| (filter, Vec::new()))
                .1
                .push(id);
        }
        groups.into_values().collect()
    }

    /// Pick casualties for each volley. Volleys aimed at different sides
    /// are asked for together; volleys aimed at the same side are settled
    /// one after another so later ones skip units already chosen.
    fn select_for_volleys(
        &mut self,
        kind: FireKind,
        volleys: &mut [Volley],
        bridge: &mut Bridge<'_>,
    ) -> Result<bool> {
        let deferred = kind == FireKind::Bombard;
        for target_side in [Side::Attacker, Side::Defender] {
            for volley in volleys
                .iter_mut()
                .filter(|v| v.firing.opponent() == target_side)
            {
                if let VolleyStatus::Requested { forced, requests } = &volley.status {
                    if requests.iter().any(|r| self.pending.contains_key(r)) {
                        break;
                    }
                    let mut details = forced.clone();
                    for request in requests {
                        if let Some(DecisionResponse::Casualties(answer)) =
                            self.answers.remove(request)
                        {
                            details.killed.extend(answer.killed);
                            details.damaged.extend(answer.damaged);
                        }
                    }
                    self.record_casualties(details, deferred);
                    volley.status = VolleyStatus::Done;
                }
                if matches!(volley.status, VolleyStatus::Done) {
                    continue;
                }

                let (forced, choices) = self.choose_casualties(volley, bridge)?;
                if choices.is_empty() {
                    self.record_casualties(forced, deferred);
                    volley.status = VolleyStatus::Done;
                    continue;
                }
                let requests = choices
                    .into_iter()
                    .map(|choice| {
                        let message = format!(
                            "Select {} casualties in {}",
                            choice.hits, self.key
                        );
                        self.request(choice.player, DecisionKind::Casualties(choice), message)
                    })
                    .collect();
                volley.status = VolleyStatus::Requested { forced, requests };
                break;
            }
        }
        Ok(volleys.iter().all(|v| matches!(v.status, VolleyStatus::Done)))
    }

    fn choose_casualties(
        &mut self,
        volley: &Volley,
        bridge: &mut Bridge<'_>,
    ) -> Result<(CasualtyDetails, Vec<CasualtyChoice>)> {
        let data = bridge.data();
        let target_side = volley.firing.opponent();
        let candidates = self.targets(data, bridge.state(), target_side, volley.filter);
        if volley.hits == 0 || candidates.is_empty() {
            return Ok((CasualtyDetails::default(), Vec::new()));
        }

        if volley.aa && !data.rules.choose_aa_casualties {
            let mut remaining = candidates;
            let mut killed = Vec::new();
            while killed.len() < volley.hits as usize && !remaining.is_empty() {
                if remaining.len() == 1 {
                    killed.push(remaining.remove(0));
                    continue;
                }
                let draw = bridge.draw(remaining.len() as u32, 1, "AA casualties")?;
                let index = draw.first().copied().unwrap_or(0) as usize;
                killed.push(remaining.remove(index.min(remaining.len() - 1)));
            }
            return Ok((CasualtyDetails::automatic(killed, Vec::new()), Vec::new()));
        }

        let constraints = if volley.aa {
            CasualtyConstraints::single_hit()
        } else {
            CasualtyConstraints::for_combat(data)
        };
        let selection = select_casualties(
            data,
            bridge.state(),
            volley.hits,
            &candidates,
            self.player_of(target_side),
            constraints,
        );
        Ok((selection.forced, selection.choices))
    }

    fn record_casualties(&mut self, details: CasualtyDetails, deferred: bool) {
        let bucket = if deferred {
            &mut self.deferred_casualties
        } else {
            &mut self.casualties
        };
        bucket.killed.extend(details.killed);
        bucket.damaged.extend(details.damaged);
    }

    /// Apply damage and remove the dead, along with cargo aboard dead
    /// transports.
    fn remove_casualties(&mut self, bridge: &mut Bridge<'_>) -> Result<()> {
        let details = std::mem::take(&mut self.casualties);
        if details.is_empty() {
            return Ok(());
        }
        let data = bridge.data();
        let state = bridge.state();

        let mut killed: BTreeSet<UnitId> = details
            .killed
            .into_iter()
            .filter(|id| state.contains_unit(*id))
            .collect();
        let mut damage: BTreeMap<UnitId, u32> = BTreeMap::new();
        for id in details.damaged {
            if !killed.contains(&id) {
                *damage.entry(id).or_insert(0) += 1;
            }
        }

        let mut changes = Vec::new();
        for (id, hits) in damage {
            let unit = state.require_unit(id)?;
            if unit.state.hits + hits >= data.unit_type(unit.unit_type).hit_points {
                killed.insert(id);
            } else {
                changes.push(Change::unit_state(state, id, |s| s.hits += hits)?);
            }
        }

        for id in killed.clone() {
            killed.extend(state.transports().cargo_of(id));
            if let Some(cargo) = self.dependents.get(&id) {
                self.lost_dependents.extend(cargo.iter().copied());
            }
        }

        for id in &killed {
            let unit = state.require_unit(*id)?;
            let cost = data.unit_type(unit.unit_type).cost;
            if data.is_allied(unit.owner, self.attacker) {
                self.attacker_tuv_lost += cost;
            } else {
                self.defender_tuv_lost += cost;
            }
        }

        let ids: Vec<UnitId> = killed.into_iter().collect();
        changes.push(Change::remove_units(state, &ids)?);
        bridge.start_event(format!("{} units lost in {}", ids.len(), self.key));
        bridge.add_change(Change::composite(changes))?;
        self.forget(&ids);
        tracing::debug!(battle = %self.key, killed = ids.len(), "Removed casualties");
        Ok(())
    }

    /// In a sea battle, transports left without escort against an enemy
    /// that can still hit are lost.
    fn remove_unescorted_transports(&mut self, bridge: &mut Bridge<'_>) -> Result<()> {
        let data = bridge.data();
        if !data.rules.transport_casualties_restricted || !data.map.is_water(self.key.territory) {
            return Ok(());
        }
        let state = bridge.state();
        let mut lost = Vec::new();
        for side in [Side::Attacker, Side::Defender] {
            let units = self.active(state, side);
            let unescorted = !units.is_empty()
                && units
                    .iter()
                    .all(|id| type_matches(data, state, *id, |t| t.is_pure_transport()));
            let opponent = side.opponent();
            let threatened = self.active(state, opponent).iter().any(|id| {
                type_matches(data, state, *id, |t| t.strength(opponent.is_defending()) > 0)
            });
            if unescorted && threatened {
                lost.extend(units);
            }
        }
        if lost.is_empty() {
            return Ok(());
        }
        tracing::debug!(battle = %self.key, transports = lost.len(), "Unescorted transports lost");
        self.casualties.killed.extend(lost);
        self.remove_casualties(bridge)
    }

    /// The battle is over when a side is gone, nothing can hit, or the
    /// round limit is reached.
    pub(super) fn end_condition(
        &self,
        data: &GameData,
        state: &GameState,
        include_round_limit: bool,
    ) -> Option<BattleOutcome> {
        let attackers = self.active(state, Side::Attacker);
        let defenders: Vec<UnitId> = self
            .active(state, Side::Defender)
            .into_iter()
            .filter(|id| !type_matches(data, state, *id, |t| t.is_infrastructure))
            .collect();

        if attackers.is_empty() {
            let submerged = self.attacking.iter().any(|id| state.contains_unit(*id));
            return Some(if submerged {
                BattleOutcome::Retreated
            } else if defenders.is_empty() {
                BattleOutcome::Draw
            } else {
                BattleOutcome::DefenderWon
            });
        }
        if defenders.is_empty() {
            return Some(BattleOutcome::AttackerWon);
        }

        if !self.can_hurt(data, state, Side::Attacker, &attackers, &defenders)
            && !self.can_hurt(data, state, Side::Defender, &defenders, &attackers)
        {
            return Some(BattleOutcome::Draw);
        }

        let limit = data.rules.max_battle_rounds;
        if include_round_limit && limit > 0 && self.round >= limit {
            return Some(BattleOutcome::Draw);
        }
        None
    }

    /// Check if any unit of `side` could score a hit on any of `targets`.
    fn can_hurt(
        &self,
        data: &GameData,
        state: &GameState,
        side: Side,
        units: &[UnitId],
        targets: &[UnitId],
    ) -> bool {
        let air_blind = data.rules.air_cannot_hit_subs_without_destroyer
            && !self.has_destroyer(data, state, side);
        let target_types: Vec<_> = targets
            .iter()
            .filter_map(|id| state.unit(*id))
            .map(|u| data.unit_type(u.unit_type))
            .collect();
        units
            .iter()
            .filter_map(|id| state.unit(*id))
            .map(|u| data.unit_type(u.unit_type))
            .filter(|t| t.strength(side.is_defending()) > 0)
            .any(|firer| {
                target_types.iter().any(|target| {
                    !((firer.is_sub && target.is_air())
                        || (firer.is_air() && air_blind && target.is_sub))
                })
            })
    }

    fn retreat_options(&self, data: &GameData, state: &GameState) -> Vec<TerritoryId> {
        if !self.can_retreat(data) {
            return Vec::new();
        }
        self.attacked_from
            .keys()
            .copied()
            .filter(|t| *t != self.key.territory)
            .filter(|t| {
                let enemy_present = !state
                    .units_in_matching(*t, |u| data.is_at_war(self.attacker, u.owner))
                    .is_empty();
                let friendly = data.map.is_water(*t)
                    || state
                        .owner(*t)
                        .is_some_and(|owner| data.is_allied(self.attacker, owner));
                friendly && !enemy_present
            })
            .collect()
    }

    fn submerge_candidates(&self, data: &GameData, state: &GameState, side: Side) -> Vec<UnitId> {
        if !data.rules.subs_may_submerge || self.has_destroyer(data, state, side.opponent()) {
            return Vec::new();
        }
        self.active(state, side)
            .into_iter()
            .filter(|id| type_matches(data, state, *id, |t| t.is_sub))
            .collect()
    }

    /// Offer submerging and, at the end of a round, retreat.
    fn withdraw(
        &mut self,
        bridge: &mut Bridge<'_>,
        retreat: bool,
        requests: Option<Vec<DecisionRequest>>,
    ) -> Result<StepResult> {
        let data = bridge.data();
        let Some(requests) = requests else {
            let state = bridge.state();
            let mut asked = Vec::new();
            for side in [Side::Attacker, Side::Defender] {
                let subs = self.submerge_candidates(data, state, side);
                if !subs.is_empty() {
                    let id = self.request(
                        self.player_of(side),
                        DecisionKind::Submerge { units: subs },
                        format!("Submerge submarines in {}?", self.key),
                    );
                    asked.extend(self.pending.get(&id).cloned());
                }
            }
            if retreat {
                let possible = self.retreat_options(data, state);
                if !possible.is_empty() {
                    let id = self.request(
                        self.attacker,
                        DecisionKind::Retreat { possible },
                        format!("Retreat from {}?", self.key),
                    );
                    asked.extend(self.pending.get(&id).cloned());
                }
            }
            if asked.is_empty() {
                return Ok(StepResult::Done);
            }
            return Ok(StepResult::Suspend(Step::Withdraw {
                retreat,
                requests: Some(asked),
            }));
        };

        let mut retreated = false;
        for request in requests {
            match (self.answers.remove(&request.id), request.kind) {
                (Some(DecisionResponse::Submerge(true)), DecisionKind::Submerge { units }) => {
                    let state = bridge.state();
                    let changes = units
                        .iter()
                        .filter(|id| state.contains_unit(**id))
                        .map(|id| Change::unit_state(state, *id, |s| s.submerged = true))
                        .collect::<Result<Vec<_>>>()?;
                    bridge.add_change(Change::composite(changes))?;
                    bridge.start_event(format!("{} submarines submerge in {}", units.len(), self.key));
                }
                (Some(DecisionResponse::Retreat(Some(to))), DecisionKind::Retreat { .. }) => {
                    self.retreat(bridge, to)?;
                    retreated = true;
                }
                _ => {}
            }
        }
        if retreated && self.active(bridge.state(), Side::Attacker).is_empty() {
            return Ok(StepResult::Finish(BattleOutcome::Retreated));
        }

        Ok(self
            .end_condition(data, bridge.state(), false)
            .map_or(StepResult::Done, StepResult::Finish))
    }

    fn retreat(&mut self, bridge: &mut Bridge<'_>, to: TerritoryId) -> Result<()> {
        let state = bridge.state();
        let mut moving: Vec<UnitId> = self
            .active(state, Side::Attacker)
            .into_iter()
            .filter(|id| !self.amphibious.contains(id))
            .collect();
        let cargo: Vec<UnitId> = moving
            .iter()
            .flat_map(|id| state.transports().cargo_of(*id))
            .collect();
        for unit in cargo {
            if !moving.contains(&unit) {
                moving.push(unit);
            }
        }
        if moving.is_empty() {
            return Ok(());
        }
        bridge.add_change(Change::move_units(moving.clone(), self.key.territory, to))?;
        bridge.start_event(format!("Attackers retreat from {} to {to}", self.key));
        tracing::debug!(battle = %self.key, %to, units = moving.len(), "Retreated");
        self.attacking.retain(|id| !moving.contains(id));
        Ok(())
    }

    fn raid_damage(&mut self, bridge: &mut Bridge<'_>) -> Result<StepResult> {
        let data = bridge.data();
        let bombers: Vec<UnitId> = self
            .active(bridge.state(), Side::Attacker)
            .into_iter()
            .filter(|id| type_matches(data, bridge.state(), *id, |t| t.is_strategic_bomber))
            .collect();
        if bombers.is_empty() {
            return Ok(StepResult::Finish(BattleOutcome::DefenderWon));
        }
        let info = data.map.territory(self.key.territory);
        let (_, rolled) = bridge.roll_bombing_damage(
            &bombers,
            self.attacker,
            &format!("Bombing raid on {}", info.name),
        )?;
        let damage = if data.rules.bombing_capped_by_production {
            rolled.min(info.production)
        } else {
            rolled
        };
        let loss = i32::try_from(damage).unwrap_or(i32::MAX);
        let change = Change::resource(bridge.state(), self.defender, -loss);
        if let Change::Resource { delta, .. } = &change {
            self.bombing_damage = delta.unsigned_abs();
        }
        bridge.add_change(change)?;
        bridge.start_event(format!(
            "Bombers destroy {} resources in {}",
            self.bombing_damage, info.name
        ));
        Ok(StepResult::Finish(BattleOutcome::AttackerWon))
    }
}

impl Volley {
    const fn new(firing: Side, filter: TargetFilter, hits: u32, aa: bool) -> Self {
        Self {
            firing,
            filter,
            hits,
            aa,
            status: VolleyStatus::Waiting,
        }
    }
}
