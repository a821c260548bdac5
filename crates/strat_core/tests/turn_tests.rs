//! Whole-turn tests: move, fight, undo, end the turn and replay.

use strat_core::move_validator::messages;
use strat_core::prelude::*;
use strat_test_utils::fixtures::Fixture;

struct Turn {
    delegate: MoveDelegate,
    tracker: BattleTracker,
    ledger: UndoLedger,
}

impl Turn {
    fn combat(player: PlayerId) -> Self {
        Self {
            delegate: MoveDelegate::combat(player),
            tracker: BattleTracker::new(),
            ledger: UndoLedger::new(),
        }
    }

    fn perform(
        &mut self,
        fixture: &mut Fixture,
        random: &mut dyn RandomSource,
        units: Vec<UnitId>,
        route: Vec<TerritoryId>,
    ) -> MoveOutcome {
        let request = MoveRequest::new(units, Route::new(route));
        self.delegate
            .perform_move(
                &mut fixture.bridge(random),
                &mut self.tracker,
                &mut self.ledger,
                &mut DefaultPlayer,
                &request,
            )
            .unwrap()
    }

    fn undo(&mut self, fixture: &mut Fixture, id: ActionId) -> Result<()> {
        let mut random = ScriptedRandomSource::failing();
        self.delegate.undo_move(
            &mut fixture.bridge(&mut random),
            &mut self.tracker,
            &mut self.ledger,
            id,
        )
    }
}

fn performed(outcome: MoveOutcome) -> ActionId {
    match outcome {
        MoveOutcome::Performed(id) => id,
        other => panic!("move not performed: {other:?}"),
    }
}

/// Germany attacks Front with everything in Home and fights it out.
fn play_attack(fixture: &mut Fixture, random: &mut dyn RandomSource) -> Vec<BattleRecord> {
    let (attacker, home, front) = (fixture.attacker, fixture.home, fixture.front);
    let units = fixture
        .state
        .units_in_matching(home, |u| u.owner == attacker);
    let mut turn = Turn::combat(attacker);
    performed(turn.perform(fixture, random, units, vec![home, front]));
    assert!(turn.tracker.battle(BattleKey::normal(front)).is_some());

    let report = run_combat_phase(&mut fixture.bridge(random), &mut turn.tracker, &mut DefaultPlayer).unwrap();
    assert_eq!(report.fought.len(), 1);
    assert!(report.remaining.is_empty());

    turn.delegate
        .end_turn(&mut fixture.bridge(random), &mut turn.tracker, &mut turn.ledger)
        .unwrap()
}

fn attack_fixture() -> Fixture {
    let mut fixture = Fixture::new(false);
    let (attacker, defender, home, front) =
        (fixture.attacker, fixture.defender, fixture.home, fixture.front);
    fixture.place_many(attacker, home, "armour", 3);
    fixture.place_many(attacker, home, "infantry", 2);
    fixture.place_many(defender, front, "infantry", 3);
    fixture
}

#[test]
fn test_turn_replays_from_its_dice_log() {
    let mut fixture = attack_fixture();
    let mut replay = BattleReplay::new("fixture", 11, &fixture.state).unwrap();
    let mut random = RecordingRandomSource::new(SeededRandomSource::new(11));
    let records = play_attack(&mut fixture, &mut random);
    assert_eq!(records.len(), 1);
    assert!(!random.log().is_empty());
    replay.finalize(random.into_log(), &fixture.state);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("turn.replay");
    replay.save(&path).unwrap();
    let loaded = BattleReplay::load(&path).unwrap();

    let mut again = Fixture::new(false);
    again.state = loaded.restore_initial_state().unwrap();
    let mut source = loaded.random_source();
    let replayed = play_attack(&mut again, &mut source);
    assert!(source.is_exhausted());
    assert_eq!(replayed, records);
    loaded.verify(&again.state).unwrap();
}

#[test]
fn test_moves_through_conquests_undo_in_reverse() {
    let mut fixture = Fixture::new(false);
    let (attacker, defender, home, front, far) =
        (fixture.attacker, fixture.defender, fixture.home, fixture.front, fixture.far);
    let infantry = fixture.place(attacker, home, "infantry");
    let armour = fixture.place(attacker, home, "armour");
    let before = fixture.state.state_hash();
    let mut turn = Turn::combat(attacker);
    let mut random = ScriptedRandomSource::failing();

    let take_front = performed(turn.perform(&mut fixture, &mut random, vec![infantry], vec![home, front]));
    assert_eq!(fixture.state.owner(front), Some(attacker));
    let take_far = performed(turn.perform(&mut fixture, &mut random, vec![armour], vec![home, front, far]));
    assert_eq!(fixture.state.owner(far), Some(attacker));

    assert!(turn
        .ledger
        .get(take_far)
        .unwrap()
        .depends_on()
        .contains(&take_front));
    assert!(matches!(
        turn.undo(&mut fixture, take_front),
        Err(GameError::UndoNotAllowed { .. })
    ));

    turn.undo(&mut fixture, take_far).unwrap();
    assert_eq!(fixture.state.owner(far), Some(defender));
    turn.undo(&mut fixture, take_front).unwrap();
    assert_eq!(fixture.state.owner(front), Some(defender));
    assert_eq!(fixture.state.state_hash(), before);
    assert!(turn.ledger.is_empty());
    assert!(turn.tracker.conquered().is_empty());
}

#[test]
fn test_move_into_a_fought_battle_cannot_be_undone() {
    let mut fixture = attack_fixture();
    let (attacker, home, front) = (fixture.attacker, fixture.home, fixture.front);
    let units = fixture
        .state
        .units_in_matching(home, |u| u.owner == attacker);
    let mut turn = Turn::combat(attacker);
    let mut random = SeededRandomSource::new(5);
    let attack = performed(turn.perform(&mut fixture, &mut random, units, vec![home, front]));

    let report = run_combat_phase(&mut fixture.bridge(&mut random), &mut turn.tracker, &mut DefaultPlayer).unwrap();
    assert_eq!(report.fought.len(), 1);
    assert!(turn.tracker.battle(BattleKey::normal(front)).is_none());

    let history_before = fixture.history.len();
    let hash_before = fixture.state.state_hash();
    let result = turn.undo(&mut fixture, attack);
    assert!(
        matches!(result, Err(GameError::UndoNotAllowed { .. })),
        "{result:?}"
    );
    assert_eq!(fixture.history.len(), history_before);
    assert_eq!(fixture.state.state_hash(), hash_before);
}

#[test]
fn test_non_combat_stays_out_of_unconquered_neutrals() {
    let mut fixture = Fixture::new(false);
    fixture.data.rules.neutrals_impassable = false;
    let (attacker, front, neutral) = (fixture.attacker, fixture.front, fixture.neutral);
    let change = Change::territory_owner(&fixture.state, front, Some(attacker));
    change.apply(&mut fixture.state).unwrap();
    let armour = fixture.place(attacker, front, "armour");
    let tracker = BattleTracker::new();
    let request = MoveRequest::new(vec![armour], Route::new(vec![front, neutral]));

    let result = MoveDelegate::non_combat(attacker).validate(&fixture.data, &fixture.state, &tracker, &request);
    assert_eq!(result.error(), Some(messages::NEUTRAL_IN_NON_COMBAT));

    let through = MoveRequest::new(vec![armour], Route::new(vec![front, neutral, fixture.far]));
    let result = MoveDelegate::combat(attacker).validate(&fixture.data, &fixture.state, &tracker, &through);
    assert_eq!(result.error(), Some(messages::STOP_IN_NEUTRAL));
}

#[test]
fn test_retreat_options_follow_a_partial_undo() {
    let mut fixture = Fixture::new(false);
    let (attacker, defender, home, front, sea) =
        (fixture.attacker, fixture.defender, fixture.home, fixture.front, fixture.sea);
    fixture.place(attacker, sea, "transport");
    let marine = fixture.place(attacker, home, "infantry");
    let armour = fixture.place(attacker, home, "armour");
    fixture.place(defender, front, "infantry");
    let mut turn = Turn::combat(attacker);
    let mut random = ScriptedRandomSource::failing();

    performed(turn.perform(&mut fixture, &mut random, vec![marine], vec![home, sea]));
    performed(turn.perform(&mut fixture, &mut random, vec![marine], vec![sea, front]));
    let overland = performed(turn.perform(&mut fixture, &mut random, vec![armour], vec![home, front]));

    let key = BattleKey::normal(front);
    let battle = turn.tracker.battle(key).unwrap();
    assert_eq!(battle.attacked_from(), vec![home]);
    assert_eq!(battle.amphibious_from(), vec![sea]);

    turn.undo(&mut fixture, overland).unwrap();
    let battle = turn.tracker.battle(key).unwrap();
    assert_eq!(battle.attacking(), &[marine]);
    assert!(battle.attacked_from().is_empty());
    assert_eq!(battle.amphibious_from(), vec![sea]);
    assert!(!battle.can_retreat(&fixture.data));
}

#[test]
fn test_transport_capacity_boundary() {
    let mut fixture = Fixture::new(false);
    let (attacker, home, sea) = (fixture.attacker, fixture.home, fixture.sea);
    fixture.place(attacker, sea, "transport");
    let infantry = fixture.place(attacker, home, "infantry");
    let armour = fixture.place_many(attacker, home, "armour", 2);
    let delegate = MoveDelegate::combat(attacker);
    let tracker = BattleTracker::new();
    let route = Route::new(vec![home, sea]);

    let fits = MoveRequest::new(vec![infantry, armour[0]], route.clone());
    assert!(delegate
        .validate(&fixture.data, &fixture.state, &tracker, &fits)
        .is_valid());

    let too_much = MoveRequest::new(armour.clone(), route.clone());
    let result = delegate.validate(&fixture.data, &fixture.state, &tracker, &too_much);
    assert_eq!(result.error(), Some(messages::NO_CAPACITY));

    let nowhere = MoveRequest::new(vec![infantry], Route::new(vec![home, sea, fixture.sea2]));
    assert!(!delegate
        .validate(&fixture.data, &fixture.state, &tracker, &nowhere)
        .is_valid());
}

#[test]
fn test_end_turn_refuses_while_battles_pending() {
    let mut fixture = attack_fixture();
    let (attacker, home, front) = (fixture.attacker, fixture.home, fixture.front);
    let armour = fixture
        .state
        .units_in_matching(home, |u| u.owner == attacker);
    let mut turn = Turn::combat(attacker);
    let mut random = ScriptedRandomSource::failing();
    performed(turn.perform(&mut fixture, &mut random, armour, vec![home, front]));

    let result = turn.delegate.end_turn(
        &mut fixture.bridge(&mut random),
        &mut turn.tracker,
        &mut turn.ledger,
    );
    assert!(matches!(result, Err(GameError::InvalidState(_))));
    assert_eq!(turn.ledger.len(), 1);
}
