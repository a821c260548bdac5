//! Combat tests that drive dice, casualties and battles through the public
//! API on the shared fixture map.

use strat_core::casualty::{select_casualties, CasualtyConstraints};
use strat_core::dice::{roll_dice, RollContext};
use strat_core::prelude::*;
use strat_test_utils::fixtures::{fixed, Fixture};

#[test]
fn test_low_luck_three_defending_infantry_hit_once_without_dice() {
    let mut fixture = Fixture::new(true);
    let (defender, front) = (fixture.defender, fixture.front);
    let infantry = fixture.place_many(defender, front, "infantry", 3);

    let context = RollContext::new(front, infantry.clone(), "defending infantry");
    let mut random = ScriptedRandomSource::failing();
    let roll = roll_dice(
        &fixture.data,
        &fixture.state,
        &mut random,
        &infantry,
        true,
        defender,
        &context,
    )
    .unwrap();

    assert_eq!(roll.hits(), 1);
    assert_eq!(roll.expected_hits(), fixed(1));
    assert_eq!(random.calls(), 0);
}

#[test]
fn test_low_luck_battle_needs_no_dice_when_power_divides_evenly() {
    let mut fixture = Fixture::new(true);
    let (attacker, defender, front) = (fixture.attacker, fixture.defender, fixture.front);
    // 6 armour attack for 18 (3 hits); 3 infantry defend for 6 (1 hit).
    let armour = fixture.place_many(attacker, front, "armour", 6);
    fixture.place_many(defender, front, "infantry", 3);

    let spec = fixture.attack(front, armour.clone());
    let mut tracker = BattleTracker::new();
    let key = tracker.add_attack(&fixture.data, &fixture.state, &spec).unwrap();
    let mut random = ScriptedRandomSource::failing();
    let outcome = tracker
        .fight_to_completion(&mut fixture.bridge(&mut random), key, &mut DefaultPlayer)
        .unwrap();

    assert_eq!(outcome, BattleOutcome::AttackerWon);
    assert_eq!(fixture.state.owner(front), Some(attacker));
    let survivors = armour
        .iter()
        .filter(|id| fixture.state.contains_unit(**id))
        .count();
    assert_eq!(survivors, 5);

    let record = tracker.records().records().last().cloned().unwrap();
    assert_eq!(record.rounds, 1);
    assert_eq!(record.defender_tuv_lost, 3 * fixture.data.unit_type(fixture.type_id("infantry")).cost);
    fixture.state.check_invariants().unwrap();
}

#[test]
fn test_restricted_transports_die_after_escort_one_owner_at_a_time() {
    let mut fixture = Fixture::new(false);
    let (defender, ally, sea) = (fixture.defender, fixture.defender_ally, fixture.sea);
    let destroyer = fixture.place(defender, sea, "destroyer");
    let russian = fixture.place_many(defender, sea, "transport", 2);
    let british = fixture.place_many(ally, sea, "transport", 2);
    let mut pool = vec![destroyer];
    pool.extend(&russian);
    pool.extend(&british);
    let constraints = CasualtyConstraints::for_combat(&fixture.data);

    // One hit: only the destroyer is eligible, so it is forced.
    let one = select_casualties(&fixture.data, &fixture.state, 1, &pool, defender, constraints);
    assert!(one.is_auto_determined());
    assert_eq!(one.forced.killed, vec![destroyer]);

    // Two hits: the destroyer plus one transport from the lowest player id.
    let two = select_casualties(&fixture.data, &fixture.state, 2, &pool, defender, constraints);
    assert!(two.is_auto_determined());
    assert!(two.forced.killed.contains(&destroyer));
    assert_eq!(two.forced.killed.iter().filter(|u| russian.contains(u)).count(), 1);
    assert!(two.forced.killed.iter().all(|u| !british.contains(u)));

    // Enough hits for everything: everything dies.
    let all = select_casualties(&fixture.data, &fixture.state, 5, &pool, defender, constraints);
    assert_eq!(all.forced.killed.len(), pool.len());
}

#[test]
fn test_defender_wins_when_attackers_die() {
    let mut fixture = Fixture::new(false);
    let (attacker, defender, front) = (fixture.attacker, fixture.defender, fixture.front);
    let infantry = fixture.place(attacker, front, "infantry");
    fixture.place_many(defender, front, "infantry", 2);

    let spec = fixture.attack(front, vec![infantry]);
    let mut tracker = BattleTracker::new();
    let key = tracker.add_attack(&fixture.data, &fixture.state, &spec).unwrap();
    // Attacker misses (5 >= 1); first defender hits (0 < 2).
    let mut random = ScriptedRandomSource::new(vec![5, 0, 5]);
    let outcome = tracker
        .fight_to_completion(&mut fixture.bridge(&mut random), key, &mut DefaultPlayer)
        .unwrap();

    assert_eq!(outcome, BattleOutcome::DefenderWon);
    assert!(!fixture.state.contains_unit(infantry));
    assert_eq!(fixture.state.owner(front), Some(defender));
    assert!(tracker.is_empty());
}
