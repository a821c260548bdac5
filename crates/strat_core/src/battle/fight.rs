//! One battle: shared state plus a stack of resumable steps.

use std::collections::{BTreeMap, BTreeSet};

use super::steps::{FireKind, Step, StepResult};
use super::{BattleKey, BattleKind, BattleOutcome, BattleProgress, BattleResultDescription, BattleType, Side};
use crate::bridge::Bridge;
use crate::casualty::{validate_selection, CasualtyDetails};
use crate::change::Change;
use crate::decision::{DecisionKind, DecisionRequest, DecisionResponse, RequestId};
use crate::dice::{self, RollContext};
use crate::error::{GameError, Result};
use crate::game_data::GameData;
use crate::ids::{PlayerId, TerritoryId, UnitId};
use crate::state::GameState;

/// Units joining a battle from one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackSpec {
    /// Moving player.
    pub attacker: PlayerId,
    /// Battle territory.
    pub territory: TerritoryId,
    /// Normal battle or bombing raid.
    pub battle_type: BattleType,
    /// Units arriving.
    pub units: Vec<UnitId>,
    /// Territory they came from (the route's penultimate step).
    pub from: TerritoryId,
    /// Arriving units that landed from transports.
    pub amphibious: Vec<UnitId>,
}

/// A pending or finished battle.
#[derive(Debug, Clone)]
pub struct Battle {
    pub(super) key: BattleKey,
    pub(super) kind: BattleKind,
    pub(super) attacker: PlayerId,
    pub(super) defender: PlayerId,
    pub(super) round: u32,
    pub(super) started: bool,
    pub(super) attacking: Vec<UnitId>,
    pub(super) defending: Vec<UnitId>,
    pub(super) bombarding: Vec<UnitId>,
    pub(super) amphibious: BTreeSet<UnitId>,
    /// Attackers by the territory they came from.
    pub(super) attacked_from: BTreeMap<TerritoryId, BTreeSet<UnitId>>,
    /// Amphibious attackers by the sea zone they landed from.
    pub(super) amphibious_from: BTreeMap<TerritoryId, BTreeSet<UnitId>>,
    pub(super) dependents: BTreeMap<UnitId, Vec<UnitId>>,
    pub(super) stack: Vec<Step>,
    pub(super) pending: BTreeMap<RequestId, DecisionRequest>,
    pub(super) answers: BTreeMap<RequestId, DecisionResponse>,
    pub(super) next_request: u64,
    pub(super) fired_first: BTreeSet<UnitId>,
    pub(super) casualties: CasualtyDetails,
    pub(super) deferred_casualties: CasualtyDetails,
    pub(super) lost_dependents: Vec<UnitId>,
    pub(super) attacker_tuv_lost: u32,
    pub(super) defender_tuv_lost: u32,
    pub(super) bombing_damage: u32,
    pub(super) conquered: bool,
    pub(super) outcome: Option<BattleOutcome>,
}

impl Battle {
    /// Create a battle for the first attack on a territory.
    ///
    /// # Errors
    /// Returns [`GameError::InvalidState`] if nobody in the territory is at
    /// war with the attacker.
    pub fn new(data: &GameData, state: &GameState, spec: &AttackSpec) -> Result<Self> {
        let enemies =
            state.units_in_matching(spec.territory, |u| data.is_at_war(spec.attacker, u.owner));
        let owner = state
            .owner(spec.territory)
            .filter(|owner| data.is_at_war(spec.attacker, *owner));
        let defender = owner
            .or_else(|| enemies.first().and_then(|id| state.unit(*id)).map(|u| u.owner))
            .ok_or_else(|| {
                GameError::InvalidState(format!("nobody to fight in {}", spec.territory))
            })?;

        let has_combat_defenders = enemies.iter().any(|id| {
            state
                .unit(*id)
                .is_some_and(|u| !data.unit_type(u.unit_type).is_infrastructure)
        });
        let kind = match spec.battle_type {
            BattleType::BombingRaid => BattleKind::BombingRaid,
            BattleType::Normal if has_combat_defenders => BattleKind::MustFight,
            BattleType::Normal => BattleKind::NonFighting,
        };

        let mut battle = Self {
            key: BattleKey::new(spec.territory, spec.battle_type),
            kind,
            attacker: spec.attacker,
            defender,
            round: 0,
            started: false,
            attacking: Vec::new(),
            defending: Vec::new(),
            bombarding: Vec::new(),
            amphibious: BTreeSet::new(),
            attacked_from: BTreeMap::new(),
            amphibious_from: BTreeMap::new(),
            dependents: BTreeMap::new(),
            stack: Vec::new(),
            pending: BTreeMap::new(),
            answers: BTreeMap::new(),
            next_request: 0,
            fired_first: BTreeSet::new(),
            casualties: CasualtyDetails::default(),
            deferred_casualties: CasualtyDetails::default(),
            lost_dependents: Vec::new(),
            attacker_tuv_lost: 0,
            defender_tuv_lost: 0,
            bombing_damage: 0,
            conquered: false,
            outcome: None,
        };
        battle.add_attack(spec);
        tracing::debug!(battle = %battle.key, kind = ?battle.kind, %defender, "Created battle");
        Ok(battle)
    }

    /// Add more attackers from another move.
    pub fn add_attack(&mut self, spec: &AttackSpec) {
        for unit in &spec.units {
            if !self.attacking.contains(unit) {
                self.attacking.push(*unit);
            }
        }
        self.amphibious.extend(spec.amphibious.iter().copied());
        let (landed, arrived): (Vec<UnitId>, Vec<UnitId>) = spec
            .units
            .iter()
            .copied()
            .partition(|u| spec.amphibious.contains(u));
        if !landed.is_empty() {
            self.amphibious_from
                .entry(spec.from)
                .or_default()
                .extend(landed);
        }
        if !arrived.is_empty() {
            self.attacked_from
                .entry(spec.from)
                .or_default()
                .extend(arrived);
        }
    }

    /// Withdraw attackers whose move was undone. A source territory is
    /// dropped once none of its attackers remain. Returns true when no
    /// attacker is left.
    pub fn remove_attack(&mut self, units: &[UnitId]) -> bool {
        self.forget(units);
        let gone: BTreeSet<UnitId> = units.iter().copied().collect();
        for sources in [&mut self.attacked_from, &mut self.amphibious_from] {
            for from in sources.values_mut() {
                from.retain(|u| !gone.contains(u));
            }
            sources.retain(|_, from| !from.is_empty());
        }
        self.attacking.is_empty()
    }

    /// Drop units from every role in this battle.
    pub(super) fn forget(&mut self, units: &[UnitId]) {
        let gone: BTreeSet<UnitId> = units.iter().copied().collect();
        self.attacking.retain(|u| !gone.contains(u));
        self.defending.retain(|u| !gone.contains(u));
        self.bombarding.retain(|u| !gone.contains(u));
        self.amphibious.retain(|u| !gone.contains(u));
        for cargo in self.dependents.values_mut() {
            cargo.retain(|u| !gone.contains(u));
        }
    }

    /// Assign shore bombardment.
    pub fn add_bombarding(&mut self, units: &[UnitId]) {
        for unit in units {
            if !self.bombarding.contains(unit) {
                self.bombarding.push(*unit);
            }
        }
    }

    /// Record that `cargo`, fighting elsewhere, dies if `transport` dies here.
    pub fn add_dependents(&mut self, transport: UnitId, cargo: &[UnitId]) {
        let entry = self.dependents.entry(transport).or_default();
        for unit in cargo {
            if !entry.contains(unit) {
                entry.push(*unit);
            }
        }
    }

    /// Battle key.
    #[must_use]
    pub const fn key(&self) -> BattleKey {
        self.key
    }

    /// Battle kind.
    #[must_use]
    pub const fn kind(&self) -> BattleKind {
        self.kind
    }

    /// Attacking player.
    #[must_use]
    pub const fn attacker(&self) -> PlayerId {
        self.attacker
    }

    /// Defending player.
    #[must_use]
    pub const fn defender(&self) -> PlayerId {
        self.defender
    }

    /// Current round, 0 before the battle starts.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Check if the first step has run.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Attacking units.
    #[must_use]
    pub fn attacking(&self) -> &[UnitId] {
        &self.attacking
    }

    /// Defending units, known once the battle starts.
    #[must_use]
    pub fn defending(&self) -> &[UnitId] {
        &self.defending
    }

    /// Ships bombarding the shore.
    #[must_use]
    pub fn bombarding(&self) -> &[UnitId] {
        &self.bombarding
    }

    /// Attackers that landed from transports.
    #[must_use]
    pub fn amphibious(&self) -> Vec<UnitId> {
        self.amphibious.iter().copied().collect()
    }

    /// Check if any attacker landed from a transport.
    #[must_use]
    pub fn is_amphibious(&self) -> bool {
        !self.amphibious.is_empty()
    }

    /// Territories non-amphibious attackers came from.
    #[must_use]
    pub fn attacked_from(&self) -> Vec<TerritoryId> {
        self.attacked_from.keys().copied().collect()
    }

    /// Sea zones amphibious attackers landed from.
    #[must_use]
    pub fn amphibious_from(&self) -> Vec<TerritoryId> {
        self.amphibious_from.keys().copied().collect()
    }

    /// Transport to cargo-elsewhere map.
    #[must_use]
    pub fn dependents(&self) -> &BTreeMap<UnitId, Vec<UnitId>> {
        &self.dependents
    }

    /// Final outcome, once resolved.
    #[must_use]
    pub const fn outcome(&self) -> Option<BattleOutcome> {
        self.outcome
    }

    /// Check if the battle has resolved.
    #[must_use]
    pub const fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Check if the territory changed hands.
    #[must_use]
    pub const fn conquered(&self) -> bool {
        self.conquered
    }

    /// Cost of the attacker's and the defender's losses.
    #[must_use]
    pub const fn tuv_lost(&self) -> (u32, u32) {
        (self.attacker_tuv_lost, self.defender_tuv_lost)
    }

    /// Requests waiting for an answer.
    #[must_use]
    pub fn outstanding(&self) -> Vec<DecisionRequest> {
        self.pending.values().cloned().collect()
    }

    /// Check if the attacker may retreat at all: someone arrived over land
    /// or sea rather than from a transport, and amphibious units do not pin
    /// the whole force.
    #[must_use]
    pub fn can_retreat(&self, data: &GameData) -> bool {
        !self.attacked_from.is_empty()
            && (self.amphibious.is_empty() || data.rules.partial_amphibious_retreat)
    }

    /// Total defending power the territory would muster now. Zero means the
    /// defence cannot hurt anyone.
    ///
    /// # Errors
    /// Returns [`GameError::UnknownUnit`] if board and battle disagree.
    pub fn defending_power(&self, data: &GameData, state: &GameState) -> Result<u32> {
        let defenders = if self.started {
            self.defending.clone()
        } else {
            self.enemies_present(data, state)
        };
        let context = RollContext::new(self.key.territory, defenders.clone(), "preview");
        let powers = dice::unit_powers(data, state, &defenders, true, &context)?;
        Ok(dice::total_power(&powers, data.dice_sides()))
    }

    fn enemies_present(&self, data: &GameData, state: &GameState) -> Vec<UnitId> {
        state.units_in_matching(self.key.territory, |u| {
            data.is_at_war(self.attacker, u.owner) && !self.attacking.contains(&u.id)
        })
    }

    pub(super) const fn player_of(&self, side: Side) -> PlayerId {
        match side {
            Side::Attacker => self.attacker,
            Side::Defender => self.defender,
        }
    }

    pub(super) fn side_units(&self, side: Side) -> &[UnitId] {
        match side {
            Side::Attacker => &self.attacking,
            Side::Defender => &self.defending,
        }
    }

    /// Units of a side still on the board and not submerged.
    pub(super) fn active(&self, state: &GameState, side: Side) -> Vec<UnitId> {
        self.side_units(side)
            .iter()
            .copied()
            .filter(|id| state.unit(*id).is_some_and(|u| !u.state.submerged))
            .collect()
    }

    pub(super) fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    /// Queue a request and return it.
    pub(super) fn request(&mut self, player: PlayerId, kind: DecisionKind, message: String) -> RequestId {
        let id = self.next_request_id();
        self.pending.insert(
            id,
            DecisionRequest {
                id,
                battle: self.key,
                player,
                kind,
                message,
            },
        );
        id
    }

    fn start(&mut self, bridge: &mut Bridge<'_>) {
        let data = bridge.data();
        let state = bridge.state();
        let territory = self.key.territory;
        self.started = true;
        self.round = 1;
        self.attacking
            .retain(|id| state.unit(*id).is_some_and(|u| u.location == territory));
        let attacking = self.attacking.clone();
        self.amphibious.retain(|id| attacking.contains(id));
        self.defending = self.enemies_present(data, state);

        match self.kind {
            BattleKind::MustFight => self.stack.push(Step::StartRound),
            BattleKind::NonFighting => self.stack.push(Step::ResolveUnopposed),
            BattleKind::BombingRaid => {
                self.stack.push(Step::RaidDamage);
                self.stack.push(Step::RemoveCasualties { end_of_round: false });
                self.stack.push(Step::fire(FireKind::Aa));
            }
        }
        let attacker_name = data.player(self.attacker).map_or("?", |p| p.name.as_str());
        let territory_name = &data.map.territory(territory).name;
        bridge.start_event(format!("{attacker_name} attacks {territory_name}"));
        tracing::info!(
            battle = %self.key,
            attackers = self.attacking.len(),
            defenders = self.defending.len(),
            "Battle started"
        );
    }

    /// Run steps until the battle suspends or resolves.
    pub(super) fn fight(&mut self, bridge: &mut Bridge<'_>) -> Result<BattleProgress> {
        if self.outcome.is_some() {
            return Err(GameError::BattleOver(self.key));
        }
        if !self.pending.is_empty() {
            return Ok(BattleProgress::Suspended(self.outstanding()));
        }
        if !self.started {
            self.start(bridge);
        }
        self.run(bridge)
    }

    /// Deliver an answer. The request is consumed only if the answer is
    /// valid; steps continue once nothing is outstanding.
    pub(super) fn resume(
        &mut self,
        bridge: &mut Bridge<'_>,
        request: RequestId,
        response: DecisionResponse,
    ) -> Result<BattleProgress> {
        if self.outcome.is_some() {
            return Err(GameError::BattleOver(self.key));
        }
        let Some(pending) = self.pending.get(&request) else {
            return Err(GameError::UnknownRequest {
                battle: self.key,
                request: request.0,
            });
        };
        if !response.answers(&pending.kind) {
            return Err(GameError::MismatchedResponse(request.0));
        }
        match (&pending.kind, &response) {
            (DecisionKind::Casualties(choice), DecisionResponse::Casualties(details)) => {
                validate_selection(bridge.data(), bridge.state(), choice, details)?;
            }
            (DecisionKind::Retreat { possible }, DecisionResponse::Retreat(Some(to)))
                if !possible.contains(to) =>
            {
                return Err(GameError::InvalidState(format!(
                    "{to} is not a retreat option for {}",
                    self.key
                )));
            }
            _ => {}
        }
        self.pending.remove(&request);
        self.answers.insert(request, response);
        tracing::debug!(battle = %self.key, %request, outstanding = self.pending.len(), "Answer received");

        if self.pending.is_empty() {
            self.run(bridge)
        } else {
            Ok(BattleProgress::Suspended(self.outstanding()))
        }
    }

    fn run(&mut self, bridge: &mut Bridge<'_>) -> Result<BattleProgress> {
        while let Some(step) = self.stack.pop() {
            match self.execute(step, bridge)? {
                StepResult::Done => {}
                StepResult::Suspend(step) => {
                    self.stack.push(step);
                    return Ok(BattleProgress::Suspended(self.outstanding()));
                }
                StepResult::Finish(outcome) => {
                    self.finish(bridge, outcome)?;
                    return Ok(BattleProgress::Finished(outcome));
                }
            }
        }
        Err(GameError::InvariantViolation(format!(
            "{} ran out of steps without resolving",
            self.key
        )))
    }

    fn finish(&mut self, bridge: &mut Bridge<'_>, outcome: BattleOutcome) -> Result<()> {
        self.stack.clear();
        let data = bridge.data();
        let territory = self.key.territory;
        let mut changes = Vec::new();
        {
            let state = bridge.state();
            for id in self.attacking.iter().chain(&self.defending) {
                let Some(unit) = state.unit(*id) else { continue };
                if unit.location != territory {
                    continue;
                }
                changes.push(Change::unit_state(state, *id, |s| {
                    s.submerged = false;
                    s.was_in_combat = true;
                })?);
            }

            let land_unit_survives = self.attacking.iter().any(|id| {
                state.unit(*id).is_some_and(|u| {
                    u.location == territory && data.unit_type(u.unit_type).is_land()
                })
            });
            if outcome == BattleOutcome::AttackerWon
                && self.kind != BattleKind::BombingRaid
                && !data.map.is_water(territory)
                && land_unit_survives
            {
                changes.push(Change::conquer(data, state, territory, self.attacker));
                self.conquered = true;
            }
        }
        bridge.add_change(Change::composite(changes))?;
        if self.conquered {
            bridge.start_event(format!(
                "{} takes {}",
                data.player(self.attacker).map_or("?", |p| p.name.as_str()),
                data.map.territory(territory).name
            ));
        }
        self.outcome = Some(outcome);
        tracing::info!(
            battle = %self.key,
            ?outcome,
            rounds = self.round,
            attacker_tuv_lost = self.attacker_tuv_lost,
            defender_tuv_lost = self.defender_tuv_lost,
            "Battle resolved"
        );
        Ok(())
    }

    /// Describe the result for the battle log.
    #[must_use]
    pub fn description(&self) -> BattleResultDescription {
        match (self.kind, self.outcome) {
            (BattleKind::BombingRaid, Some(BattleOutcome::AttackerWon)) => {
                BattleResultDescription::Bombed {
                    damage: self.bombing_damage,
                }
            }
            (BattleKind::NonFighting, Some(BattleOutcome::AttackerWon)) => {
                BattleResultDescription::NoBattle
            }
            (_, Some(BattleOutcome::AttackerWon)) if self.conquered => {
                BattleResultDescription::Conquered
            }
            (_, Some(BattleOutcome::AttackerWon)) => BattleResultDescription::WonWithoutConquering,
            (_, Some(BattleOutcome::DefenderWon)) => BattleResultDescription::Lost,
            (_, Some(BattleOutcome::Retreated)) => BattleResultDescription::Retreated,
            (_, Some(BattleOutcome::Draw) | None) => BattleResultDescription::Stalemate,
        }
    }

    /// Drain units whose transport died here but who fight elsewhere.
    pub(super) fn take_lost_dependents(&mut self) -> Vec<UnitId> {
        std::mem::take(&mut self.lost_dependents)
    }
}
