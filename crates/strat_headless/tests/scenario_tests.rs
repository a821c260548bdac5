//! Scenario files played end to end through the determinism harness.

use std::path::PathBuf;

use strat_core::random::RandomSource;
use strat_headless::{GameRunner, Scenario};
use strat_test_utils::determinism::{run_parallel_scoped, verify_replay};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

fn play(runner: &mut GameRunner<'_>, random: &mut dyn RandomSource) {
    runner.play(random, 0).unwrap();
}

#[test]
fn test_shipped_scenarios_validate() {
    let scenario = Scenario::load(scenario_path("channel.ron")).unwrap();
    let (data, state) = scenario.build().unwrap();
    scenario.check_orders(&data).unwrap();
    state.check_invariants().unwrap();
}

#[test]
fn test_channel_is_deterministic_across_threads() {
    let scenario = Scenario::load(scenario_path("channel.ron")).unwrap();
    let result = run_parallel_scoped(
        4,
        2024,
        || GameRunner::new(&scenario).unwrap(),
        |runner, random| play(runner, random),
        |runner| runner.state().state_hash(),
    );
    result.assert_deterministic();
}

#[test]
fn test_channel_replays_from_its_dice_log() {
    let scenario = Scenario::load(scenario_path("channel.ron")).unwrap();
    let check = verify_replay(
        77,
        || GameRunner::new(&scenario).unwrap(),
        play,
        |runner| runner.state().state_hash(),
    );
    assert!(check.draws > 0);
    assert!(check.matches());
}
