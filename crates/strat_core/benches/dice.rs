//! Dice, casualty and battle benchmarks for strat_core.
//!
//! Run with: `cargo bench -p strat_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strat_core::battle::BattleTracker;
use strat_core::casualty::{select_casualties, CasualtyConstraints};
use strat_core::decision::DefaultPlayer;
use strat_core::dice::{roll_dice, RollContext};
use strat_core::random::SeededRandomSource;
use strat_test_utils::fixtures::Fixture;

fn army(low_luck: bool) -> Fixture {
    let mut fixture = Fixture::new(low_luck);
    let (attacker, defender, front) = (fixture.attacker, fixture.defender, fixture.front);
    fixture.place_many(attacker, front, "infantry", 10);
    fixture.place_many(attacker, front, "artillery", 5);
    fixture.place_many(attacker, front, "armour", 5);
    fixture.place_many(defender, front, "infantry", 15);
    fixture.place_many(defender, front, "armour", 3);
    fixture
}

/// Roll 20 attacking units, with dice and with low luck.
pub fn dice_benchmark(c: &mut Criterion) {
    for low_luck in [false, true] {
        let fixture = army(low_luck);
        let attacker = fixture.attacker;
        let units = fixture
            .state
            .units_in_matching(fixture.front, |u| u.owner == attacker);
        let context = RollContext::new(fixture.front, units.clone(), "bench");
        let name = if low_luck { "roll_low_luck_20" } else { "roll_dice_20" };
        let mut random = SeededRandomSource::new(1);
        c.bench_function(name, |b| {
            b.iter(|| {
                roll_dice(
                    &fixture.data,
                    &fixture.state,
                    &mut random,
                    black_box(&units),
                    false,
                    attacker,
                    &context,
                )
            })
        });
    }
}

/// Pick default casualties for a mixed defending stack.
pub fn casualty_benchmark(c: &mut Criterion) {
    let fixture = army(false);
    let defender = fixture.defender;
    let units = fixture
        .state
        .units_in_matching(fixture.front, |u| u.owner == defender);
    let constraints = CasualtyConstraints::for_combat(&fixture.data);
    c.bench_function("select_casualties_18", |b| {
        b.iter(|| {
            select_casualties(
                &fixture.data,
                &fixture.state,
                black_box(7),
                &units,
                defender,
                constraints,
            )
        })
    });
}

/// Fight a whole land battle to completion.
pub fn battle_benchmark(c: &mut Criterion) {
    c.bench_function("battle_to_completion", |b| {
        b.iter(|| {
            let mut fixture = army(false);
            let front = fixture.front;
            let attacker = fixture.attacker;
            let units = fixture
                .state
                .units_in_matching(front, |u| u.owner == attacker);
            let spec = fixture.attack(front, units);
            let mut tracker = BattleTracker::new();
            let key = tracker.add_attack(&fixture.data, &fixture.state, &spec);
            let mut random = SeededRandomSource::new(black_box(7));
            key.and_then(|key| {
                tracker.fight_to_completion(&mut fixture.bridge(&mut random), key, &mut DefaultPlayer)
            })
        })
    });
}

criterion_group!(benches, dice_benchmark, casualty_benchmark, battle_benchmark);
criterion_main!(benches);
