//! Combat-phase scheduling.
//!
//! At the start of the combat phase the scheduler resolves everything that
//! needs no judgement: raids, battles nobody can lose, amphibious assaults
//! that cannot retreat, and the last battle standing. Whatever is left stays
//! pending for the player to pick.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{BattleKey, BattleKind, BattleOutcome, BattleTracker, BattleType};
use crate::air;
use crate::bridge::Bridge;
use crate::change::Change;
use crate::decision::RemotePlayer;
use crate::error::{GameError, Result};
use crate::ids::{PlayerId, UnitId};

/// What the scheduler did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleReport {
    /// Battles fought, in order.
    pub fought: Vec<(BattleKey, BattleOutcome)>,
    /// Ships assigned to bombard an assault.
    pub bombardments: Vec<(BattleKey, Vec<UnitId>)>,
    /// The amphibious assault left for the player once its sea battles
    /// were fought.
    pub surfaced: Option<BattleKey>,
    /// Battles still pending.
    pub remaining: Vec<BattleKey>,
}

fn require<'t>(tracker: &'t BattleTracker, key: BattleKey) -> Result<&'t super::Battle> {
    tracker.battle(key).ok_or_else(|| {
        GameError::InvariantViolation(format!("{key} vanished from the tracker"))
    })
}

fn fight(
    bridge: &mut Bridge<'_>,
    tracker: &mut BattleTracker,
    remote: &mut dyn RemotePlayer,
    key: BattleKey,
    report: &mut ScheduleReport,
) -> Result<()> {
    require(tracker, key)?;
    let outcome = tracker.fight_to_completion(bridge, key, remote)?;
    tracing::info!(battle = %key, ?outcome, "Scheduler fought battle");
    report.fought.push((key, outcome));
    Ok(())
}

fn ready_normal_battles(tracker: &BattleTracker) -> Vec<BattleKey> {
    tracker
        .pending_battles()
        .into_iter()
        .filter(|k| k.battle_type == BattleType::Normal && tracker.blocking(*k).is_empty())
        .collect()
}

/// Let the attacker's ships bombard amphibious assaults from the sea zones
/// the assault landed from, when no battle is pending there. Each ship
/// bombards at most one assault.
///
/// # Errors
/// Returns [`GameError::InvariantViolation`] if a battle disappears.
pub fn assign_bombardment(
    bridge: &Bridge<'_>,
    tracker: &mut BattleTracker,
    remote: &mut dyn RemotePlayer,
) -> Result<Vec<(BattleKey, Vec<UnitId>)>> {
    let data = bridge.data();
    let state = bridge.state();
    let mut used: BTreeSet<UnitId> = BTreeSet::new();
    let mut assigned = Vec::new();

    for key in tracker.pending_battles() {
        if key.battle_type != BattleType::Normal {
            continue;
        }
        let battle = require(tracker, key)?;
        if !battle.is_amphibious() || battle.is_started() {
            continue;
        }
        let attacker = battle.attacker();
        for sea in battle.amphibious_from() {
            if !tracker.battles_in(sea).is_empty() {
                continue;
            }
            let ships: Vec<UnitId> = state.units_in_matching(sea, |u| {
                u.owner == attacker
                    && !used.contains(&u.id)
                    && !u.state.was_in_combat
                    && data.unit_type(u.unit_type).bombard > 0
            });
            if ships.is_empty() || !remote.confirm_shore_bombard(sea, key.territory) {
                continue;
            }
            used.extend(ships.iter().copied());
            tracker.add_bombarding(key, &ships);
            tracing::debug!(battle = %key, %sea, ships = ships.len(), "Assigned bombardment");
            assigned.push((key, ships));
        }
    }
    Ok(assigned)
}

/// Auto-fight the battles of a combat phase that need no player choice.
///
/// # Errors
/// Returns [`GameError::InvariantViolation`] if a battle disappears while
/// being scheduled, or any error raised by a battle.
pub fn run_combat_phase(
    bridge: &mut Bridge<'_>,
    tracker: &mut BattleTracker,
    remote: &mut dyn RemotePlayer,
) -> Result<ScheduleReport> {
    let mut report = ScheduleReport {
        bombardments: assign_bombardment(bridge, tracker, remote)?,
        ..ScheduleReport::default()
    };

    let raids: Vec<BattleKey> = tracker
        .pending_battles()
        .into_iter()
        .filter(|k| k.battle_type == BattleType::BombingRaid)
        .collect();
    for key in raids {
        fight(bridge, tracker, remote, key, &mut report)?;
    }

    for key in ready_normal_battles(tracker) {
        let Some(battle) = tracker.battle(key) else {
            continue;
        };
        let genuine = battle.kind() == BattleKind::MustFight
            && battle.defending_power(bridge.data(), bridge.state())? > 0;
        if !genuine {
            fight(bridge, tracker, remote, key, &mut report)?;
        }
    }

    for key in ready_normal_battles(tracker) {
        let Some(battle) = tracker.battle(key) else {
            continue;
        };
        if battle.is_amphibious() && !battle.can_retreat(bridge.data()) {
            fight(bridge, tracker, remote, key, &mut report)?;
        }
    }

    let amphibious: Vec<BattleKey> = tracker
        .pending_battles()
        .into_iter()
        .filter(|k| tracker.battle(*k).is_some_and(super::Battle::is_amphibious))
        .collect();
    if let [assault] = amphibious.as_slice() {
        let assault = *assault;
        loop {
            let blocking = tracker.blocking(assault);
            let Some(next) = blocking
                .into_iter()
                .find(|k| tracker.blocking(*k).is_empty())
            else {
                break;
            };
            fight(bridge, tracker, remote, next, &mut report)?;
        }
        if tracker.battle(assault).is_some() {
            report.surfaced = Some(assault);
        }
    }

    let normal: Vec<BattleKey> = tracker
        .pending_battles()
        .into_iter()
        .filter(|k| k.battle_type == BattleType::Normal)
        .collect();
    if let [last] = normal.as_slice() {
        if tracker.blocking(*last).is_empty() {
            fight(bridge, tracker, remote, *last, &mut report)?;
        }
    }

    report.remaining = tracker.pending_battles();
    tracing::info!(
        fought = report.fought.len(),
        remaining = report.remaining.len(),
        "Combat phase scheduled"
    );
    Ok(report)
}

/// Remove `player`'s air units that have nowhere to land once combat is
/// over.
///
/// # Errors
/// Propagates change application failures.
pub fn cleanup_stranded_air(
    bridge: &mut Bridge<'_>,
    tracker: &BattleTracker,
    player: PlayerId,
) -> Result<Vec<UnitId>> {
    let stranded = air::stranded_air(bridge.data(), bridge.state(), player, tracker.conquered());
    if stranded.is_empty() {
        return Ok(stranded);
    }
    let change = Change::remove_units(bridge.state(), &stranded)?;
    bridge.start_event(format!("{} aircraft could not land and were lost", stranded.len()));
    bridge.add_change(change)?;
    tracing::info!(%player, lost = stranded.len(), "Removed stranded aircraft");
    Ok(stranded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::AttackSpec;
    use crate::decision::DefaultPlayer;
    use crate::random::ScriptedRandomSource;
    use crate::ids::TerritoryId;
    use crate::test_support::classic_world;

    fn spec(
        attacker: PlayerId,
        territory: TerritoryId,
        battle_type: BattleType,
        units: Vec<UnitId>,
        from: TerritoryId,
    ) -> AttackSpec {
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
    fn test_raids_and_defenceless_battles_fight_themselves() {
        let mut world = classic_world(false);
        let bomber = world.place(world.attacker, world.land, "bomber");
        world.place(world.defender, world.land, "infantry");
        let walk_in = world.place(world.attacker, world.far, "infantry");
        let blocked = world.place(world.attacker, world.land, "armour");
        let sub = world.place(world.attacker, world.sea, "submarine");
        world.place(world.defender, world.sea, "cruiser");
        let mut tracker = BattleTracker::new();
        let (attacker, land, far, home) = (world.attacker, world.land, world.far, world.home);
        let (sea, sea2) = (world.sea, world.sea2);
        tracker
            .add_attack(&world.data, &world.state, &spec(attacker, land, BattleType::BombingRaid, vec![bomber], home))
            .unwrap();
        tracker
            .add_attack(&world.data, &world.state, &spec(attacker, far, BattleType::Normal, vec![walk_in], land))
            .unwrap();
        tracker
            .add_attack(&world.data, &world.state, &spec(attacker, land, BattleType::Normal, vec![blocked], home))
            .unwrap();
        tracker
            .add_attack(&world.data, &world.state, &spec(attacker, sea, BattleType::Normal, vec![sub], sea2))
            .unwrap();

        // Raid: no AA at Front, bomber rolls a 2.
        let mut random = ScriptedRandomSource::new(vec![1]);
        let report = run_combat_phase(&mut world.bridge(&mut random), &mut tracker, &mut DefaultPlayer)
            .unwrap();

        assert_eq!(report.fought[0], (BattleKey::raid(land), BattleOutcome::AttackerWon));
        assert_eq!(report.fought[1], (BattleKey::normal(far), BattleOutcome::AttackerWon));
        assert_eq!(world.state.owner(far), Some(attacker));
        assert_eq!(report.remaining, vec![BattleKey::normal(land), BattleKey::normal(sea)]);
    }

    #[test]
    fn test_last_battle_is_fought() {
        let mut world = classic_world(false);
        let armour = world.place(world.attacker, world.land, "armour");
        world.place(world.defender, world.land, "infantry");
        let mut tracker = BattleTracker::new();
        let (attacker, land, home) = (world.attacker, world.land, world.home);
        tracker
            .add_attack(&world.data, &world.state, &spec(attacker, land, BattleType::Normal, vec![armour], home))
            .unwrap();

        // Armour hits, infantry misses.
        let mut random = ScriptedRandomSource::new(vec![0, 5]);
        let report = run_combat_phase(&mut world.bridge(&mut random), &mut tracker, &mut DefaultPlayer)
            .unwrap();

        assert_eq!(report.fought, vec![(BattleKey::normal(land), BattleOutcome::AttackerWon)]);
        assert!(report.remaining.is_empty());
        assert_eq!(world.state.owner(land), Some(attacker));
    }

    #[test]
    fn test_stranded_fighter_is_removed() {
        let mut world = classic_world(false);
        let fighter = world.place(world.attacker, world.sea2, "fighter");
        let tracker = BattleTracker::new();

        let mut random = ScriptedRandomSource::failing();
        let attacker = world.attacker;
        let lost = cleanup_stranded_air(&mut world.bridge(&mut random), &tracker, attacker)
            .unwrap();

        assert_eq!(lost, vec![fighter]);
        assert!(!world.state.contains_unit(fighter));
    }
}
