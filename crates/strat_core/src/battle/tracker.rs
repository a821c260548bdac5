//! Pending battles of the current turn.

use std::collections::{BTreeMap, BTreeSet};

use super::fight::{AttackSpec, Battle};
use super::record::{BattleRecord, BattleRecords};
use super::{BattleKey, BattleOutcome, BattleProgress, BattleType};
use crate::bridge::Bridge;
use crate::change::Change;
use crate::decision::{DecisionResponse, RemotePlayer, RequestId};
use crate::error::{GameError, Result};
use crate::game_data::GameData;
use crate::ids::{TerritoryId, UnitId};
use crate::state::GameState;

/// Owns every pending battle, the dependencies between them, and the
/// territories taken this turn.
#[derive(Debug, Clone, Default)]
pub struct BattleTracker {
    pending: BTreeMap<BattleKey, Battle>,
    dependencies: BTreeMap<BattleKey, BTreeSet<BattleKey>>,
    conquered: BTreeSet<TerritoryId>,
    blitzed: BTreeSet<TerritoryId>,
    records: BattleRecords,
}

impl BattleTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join an attack to the pending battle at its territory, creating the
    /// battle if needed.
    ///
    /// # Errors
    /// Returns [`GameError::InvalidState`] if a new battle would have no
    /// defender.
    pub fn add_attack(&mut self, data: &GameData, state: &GameState, spec: &AttackSpec) -> Result<BattleKey> {
        let key = BattleKey::new(spec.territory, spec.battle_type);
        if let Some(battle) = self.pending.get_mut(&key) {
            battle.add_attack(spec);
        } else {
            let battle = Battle::new(data, state, spec)?;
            self.pending.insert(key, battle);
        }
        Ok(key)
    }

    /// Withdraw undone attackers; the battle disappears once nobody attacks.
    pub fn remove_attack(&mut self, key: BattleKey, units: &[UnitId]) {
        let Some(battle) = self.pending.get_mut(&key) else {
            return;
        };
        if battle.remove_attack(units) && !battle.is_started() {
            self.pending.remove(&key);
            self.drop_dependencies(key);
            tracing::debug!(battle = %key, "Battle dropped after undo");
        }
    }

    /// Require `blocker` to resolve before `battle`.
    pub fn add_dependency(&mut self, battle: BattleKey, blocker: BattleKey) {
        if battle != blocker {
            self.dependencies.entry(battle).or_default().insert(blocker);
        }
    }

    /// Record cargo that dies if `transport` dies in `battle`.
    pub fn add_dependents(&mut self, battle: BattleKey, transport: UnitId, cargo: &[UnitId]) {
        if let Some(battle) = self.pending.get_mut(&battle) {
            battle.add_dependents(transport, cargo);
        }
    }

    /// Assign bombarding ships to a battle.
    pub fn add_bombarding(&mut self, battle: BattleKey, units: &[UnitId]) {
        if let Some(battle) = self.pending.get_mut(&battle) {
            battle.add_bombarding(units);
        }
    }

    /// Battles that must resolve before `key` may fight. A raid always
    /// comes before the ordinary battle in the same territory.
    #[must_use]
    pub fn blocking(&self, key: BattleKey) -> Vec<BattleKey> {
        let mut blocking: BTreeSet<BattleKey> = self
            .dependencies
            .get(&key)
            .map(|deps| deps.iter().filter(|k| self.pending.contains_key(k)).copied().collect())
            .unwrap_or_default();
        if key.battle_type == BattleType::Normal {
            let raid = BattleKey::raid(key.territory);
            if self.pending.contains_key(&raid) {
                blocking.insert(raid);
            }
        }
        blocking.into_iter().collect()
    }

    /// Keys of every pending battle.
    #[must_use]
    pub fn pending_battles(&self) -> Vec<BattleKey> {
        self.pending.keys().copied().collect()
    }

    /// Check if no battle is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// A pending battle.
    #[must_use]
    pub fn battle(&self, key: BattleKey) -> Option<&Battle> {
        self.pending.get(&key)
    }

    /// Check if a battle was fought to its end this turn.
    #[must_use]
    pub fn has_fought(&self, key: BattleKey) -> bool {
        self.records.records().iter().any(|r| r.key == key)
    }

    /// Pending battle at a territory, of either type.
    #[must_use]
    pub fn battles_in(&self, territory: TerritoryId) -> Vec<BattleKey> {
        [BattleKey::normal(territory), BattleKey::raid(territory)]
            .into_iter()
            .filter(|k| self.pending.contains_key(k))
            .collect()
    }

    /// Start or continue a battle.
    ///
    /// # Errors
    /// Returns [`GameError::BattleNotFound`] or [`GameError::BattleBlocked`],
    /// or whatever a step raised.
    pub fn fight(&mut self, bridge: &mut Bridge<'_>, key: BattleKey) -> Result<BattleProgress> {
        let blocking = self.blocking(key);
        if !blocking.is_empty() {
            return Err(GameError::BattleBlocked {
                battle: key,
                blocking,
            });
        }
        let battle = self
            .pending
            .get_mut(&key)
            .ok_or(GameError::BattleNotFound(key))?;
        let progress = battle.fight(bridge)?;
        self.settle(bridge, key, &progress)?;
        Ok(progress)
    }

    /// Deliver an answer to one of a battle's outstanding requests.
    ///
    /// # Errors
    /// Returns [`GameError::BattleNotFound`], the battle's validation errors
    /// (the request stays outstanding), or whatever a step raised.
    pub fn resume(
        &mut self,
        bridge: &mut Bridge<'_>,
        key: BattleKey,
        request: RequestId,
        response: DecisionResponse,
    ) -> Result<BattleProgress> {
        let battle = self
            .pending
            .get_mut(&key)
            .ok_or(GameError::BattleNotFound(key))?;
        let progress = battle.resume(bridge, request, response)?;
        self.settle(bridge, key, &progress)?;
        Ok(progress)
    }

    /// Fight a battle to the end, asking `remote` every question.
    ///
    /// # Errors
    /// As [`fight`](Self::fight) and [`resume`](Self::resume).
    pub fn fight_to_completion(
        &mut self,
        bridge: &mut Bridge<'_>,
        key: BattleKey,
        remote: &mut dyn RemotePlayer,
    ) -> Result<BattleOutcome> {
        let mut progress = self.fight(bridge, key)?;
        loop {
            match progress {
                BattleProgress::Finished(outcome) => return Ok(outcome),
                BattleProgress::Suspended(requests) => {
                    let mut last = None;
                    for request in requests {
                        let response = remote.answer(&request);
                        last = Some(self.resume(bridge, key, request.id, response)?);
                    }
                    progress = last.ok_or_else(|| {
                        GameError::InvariantViolation(format!("{key} suspended without requests"))
                    })?;
                }
            }
        }
    }

    fn settle(&mut self, bridge: &mut Bridge<'_>, key: BattleKey, progress: &BattleProgress) -> Result<()> {
        let BattleProgress::Finished(_) = progress else {
            return Ok(());
        };
        let Some(mut battle) = self.pending.remove(&key) else {
            return Ok(());
        };
        let (attacker_tuv_lost, defender_tuv_lost) = battle.tuv_lost();
        self.records.push(BattleRecord {
            key,
            attacker: battle.attacker(),
            defender: battle.defender(),
            outcome: battle.outcome().unwrap_or(BattleOutcome::Draw),
            description: battle.description(),
            rounds: battle.round(),
            attacker_tuv_lost,
            defender_tuv_lost,
        });
        if battle.conquered() {
            self.conquered.insert(key.territory);
        }
        self.drop_dependencies(key);

        let lost = battle.take_lost_dependents();
        if !lost.is_empty() {
            for other in self.pending.values_mut() {
                other.forget(&lost);
            }
            let on_board: Vec<UnitId> = lost
                .into_iter()
                .filter(|id| bridge.state().contains_unit(*id))
                .collect();
            if !on_board.is_empty() {
                let change = Change::remove_units(bridge.state(), &on_board)?;
                bridge.start_event(format!(
                    "{} units lost with their transports in {key}",
                    on_board.len()
                ));
                bridge.add_change(change)?;
            }
            let emptied: Vec<BattleKey> = self
                .pending
                .iter()
                .filter(|(_, b)| b.attacking().is_empty() && !b.is_started())
                .map(|(k, _)| *k)
                .collect();
            for key in emptied {
                self.pending.remove(&key);
                self.drop_dependencies(key);
            }
        }
        Ok(())
    }

    fn drop_dependencies(&mut self, resolved: BattleKey) {
        self.dependencies.remove(&resolved);
        for deps in self.dependencies.values_mut() {
            deps.remove(&resolved);
        }
        self.dependencies.retain(|_, deps| !deps.is_empty());
    }

    /// Mark a territory taken this turn.
    pub fn mark_conquered(&mut self, territory: TerritoryId, blitz: bool) {
        self.conquered.insert(territory);
        if blitz {
            self.blitzed.insert(territory);
        }
    }

    /// Forget a conquest that was undone.
    pub fn unmark_conquered(&mut self, territory: TerritoryId) {
        self.conquered.remove(&territory);
        self.blitzed.remove(&territory);
    }

    /// Check if a territory changed hands this turn.
    #[must_use]
    pub fn was_conquered(&self, territory: TerritoryId) -> bool {
        self.conquered.contains(&territory)
    }

    /// Check if a territory was taken by a blitz this turn.
    #[must_use]
    pub fn was_blitzed(&self, territory: TerritoryId) -> bool {
        self.blitzed.contains(&territory)
    }

    /// Territories taken this turn.
    #[must_use]
    pub fn conquered(&self) -> &BTreeSet<TerritoryId> {
        &self.conquered
    }

    /// Results of the battles fought this turn.
    #[must_use]
    pub fn records(&self) -> &BattleRecords {
        &self.records
    }

    /// Reset per-turn bookkeeping. Pending battles carry over.
    pub fn clear_turn(&mut self) -> Vec<BattleRecord> {
        self.conquered.clear();
        self.blitzed.clear();
        self.records.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DefaultPlayer;
    use crate::random::ScriptedRandomSource;
    use crate::test_support::classic_world;

    fn spec(attacker: crate::ids::PlayerId, territory: TerritoryId, battle_type: BattleType, units: Vec<UnitId>, from: TerritoryId) -> AttackSpec {
        AttackSpec {
            attacker,
            territory,
            battle_type,
            units,
            from,
            amphibious: Vec::new(),
        }
    }

    #[test]
    fn test_attacks_on_one_territory_share_a_battle() {
        let mut world = classic_world(false);
        world.place(world.defender, world.land, "infantry");
        let first = world.place(world.attacker, world.land, "infantry");
        let second = world.place(world.attacker, world.land, "armour");
        let mut tracker = BattleTracker::new();

        let a = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.land, BattleType::Normal, vec![first], world.home))
            .unwrap();
        let b = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.land, BattleType::Normal, vec![second], world.sea))
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(tracker.pending_battles().len(), 1);
        let battle = tracker.battle(a).unwrap();
        assert_eq!(battle.attacking(), &[first, second]);
        assert_eq!(battle.attacked_from(), vec![world.home, world.sea]);
    }

    #[test]
    fn test_undo_of_last_attacker_drops_battle() {
        let mut world = classic_world(false);
        world.place(world.defender, world.land, "infantry");
        let unit = world.place(world.attacker, world.land, "infantry");
        let mut tracker = BattleTracker::new();
        let key = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.land, BattleType::Normal, vec![unit], world.home))
            .unwrap();

        tracker.remove_attack(key, &[unit]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_undo_prunes_the_territories_attacks_came_from() {
        let mut world = classic_world(false);
        world.place(world.defender, world.land, "infantry");
        let walked = world.place(world.attacker, world.land, "infantry");
        let landed = world.place(world.attacker, world.land, "armour");
        let mut tracker = BattleTracker::new();
        let key = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.land, BattleType::Normal, vec![walked], world.home))
            .unwrap();
        tracker
            .add_attack(
                &world.data,
                &world.state,
                &AttackSpec {
                    amphibious: vec![landed],
                    ..spec(world.attacker, world.land, BattleType::Normal, vec![landed], world.sea)
                },
            )
            .unwrap();
        let battle = tracker.battle(key).unwrap();
        assert_eq!(battle.attacked_from(), vec![world.home]);
        assert_eq!(battle.amphibious_from(), vec![world.sea]);

        tracker.remove_attack(key, &[landed]);
        let battle = tracker.battle(key).unwrap();
        assert_eq!(battle.attacked_from(), vec![world.home]);
        assert!(battle.amphibious_from().is_empty());
        assert!(!battle.is_amphibious());
        assert!(battle.can_retreat(&world.data));
    }

    #[test]
    fn test_raid_blocks_normal_battle_in_same_territory() {
        let mut world = classic_world(false);
        world.place(world.defender, world.land, "infantry");
        let bomber = world.place(world.attacker, world.land, "bomber");
        let infantry = world.place(world.attacker, world.land, "infantry");
        let mut tracker = BattleTracker::new();
        let raid = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.land, BattleType::BombingRaid, vec![bomber], world.home))
            .unwrap();
        let normal = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.land, BattleType::Normal, vec![infantry], world.home))
            .unwrap();

        assert_eq!(tracker.blocking(normal), vec![raid]);
        let mut random = ScriptedRandomSource::failing();
        let err = tracker.fight(&mut world.bridge(&mut random), normal).unwrap_err();
        assert!(matches!(err, GameError::BattleBlocked { .. }));
    }

    #[test]
    fn test_dependency_blocks_until_resolved() {
        let mut world = classic_world(false);
        world.place(world.defender, world.far, "infantry");
        let far_attacker = world.place(world.attacker, world.far, "infantry");
        let walk_in = world.place(world.attacker, world.land, "infantry");
        let mut tracker = BattleTracker::new();
        let contested = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.far, BattleType::Normal, vec![far_attacker], world.land))
            .unwrap();
        let open = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.land, BattleType::Normal, vec![walk_in], world.home))
            .unwrap();
        tracker.add_dependency(contested, open);

        let mut random = ScriptedRandomSource::failing();
        assert!(tracker.fight(&mut world.bridge(&mut random), contested).is_err());

        let outcome = tracker
            .fight_to_completion(&mut world.bridge(&mut random), open, &mut DefaultPlayer)
            .unwrap();
        assert_eq!(outcome, BattleOutcome::AttackerWon);
        assert!(tracker.was_conquered(world.land));
        assert!(tracker.blocking(contested).is_empty());
        assert_eq!(tracker.records().len(), 1);
    }

    #[test]
    fn test_lost_transport_takes_dependents_elsewhere() {
        let mut world = classic_world(false);
        let transport = world.place(world.attacker, world.sea, "transport");
        world.place(world.defender, world.sea, "destroyer");
        let landed = world.place(world.attacker, world.land, "infantry");
        world.place(world.defender, world.land, "infantry");
        let mut tracker = BattleTracker::new();
        let sea_battle = tracker
            .add_attack(&world.data, &world.state, &spec(world.attacker, world.sea, BattleType::Normal, vec![transport], world.sea2))
            .unwrap();
        let land_battle = tracker
            .add_attack(
                &world.data,
                &world.state,
                &AttackSpec {
                    amphibious: vec![landed],
                    ..spec(world.attacker, world.land, BattleType::Normal, vec![landed], world.sea)
                },
            )
            .unwrap();
        tracker.add_dependents(sea_battle, transport, &[landed]);
        tracker.add_dependency(land_battle, sea_battle);

        // Destroyer hits; transports cannot fire back.
        let mut random = ScriptedRandomSource::new(vec![0]);
        let outcome = tracker
            .fight_to_completion(&mut world.bridge(&mut random), sea_battle, &mut DefaultPlayer)
            .unwrap();

        assert_eq!(outcome, BattleOutcome::DefenderWon);
        assert!(!world.state.contains_unit(transport));
        assert!(!world.state.contains_unit(landed));
        assert!(tracker.battle(land_battle).is_none(), "assault with no attackers is gone");
    }
}
