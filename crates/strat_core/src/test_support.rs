//! Small fixture world for unit tests.
//!
//! ```text
//!   Rear - Home ---- Front ---- Far
//!            \        /  \       |
//!             \      /    Neutral|
//!              Sea -------- Sea2-+
//! ```

use crate::bridge::Bridge;
use crate::change::Change;
use crate::data::{GameRules, PlayerData, ScenarioData, TerritoryData, UnitTypeData};
use crate::game_data::GameData;
use crate::history::History;
use crate::ids::{PlayerId, TerritoryId, UnitId, UnitTypeId};
use crate::random::RandomSource;
use crate::state::GameState;

pub(crate) struct TestWorld {
    pub data: GameData,
    pub state: GameState,
    pub history: History,
    pub attacker: PlayerId,
    pub attacker_ally: PlayerId,
    pub defender: PlayerId,
    pub defender_ally: PlayerId,
    pub rear: TerritoryId,
    pub home: TerritoryId,
    pub land: TerritoryId,
    pub far: TerritoryId,
    pub neutral: TerritoryId,
    pub sea: TerritoryId,
    pub sea2: TerritoryId,
}

fn land(name: &str, owner: Option<&str>, adjacent: &[&str]) -> TerritoryData {
    let mut t = TerritoryData::land(name);
    t.owner = owner.map(str::to_string);
    t.adjacent = adjacent.iter().map(|s| (*s).to_string()).collect();
    t.production = 3;
    t
}

fn sea(name: &str, adjacent: &[&str]) -> TerritoryData {
    let mut t = TerritoryData::sea(name);
    t.adjacent = adjacent.iter().map(|s| (*s).to_string()).collect();
    t
}

fn player(name: &str, alliance: &str) -> PlayerData {
    PlayerData {
        name: name.into(),
        alliance: alliance.into(),
        resources: 20,
    }
}

pub(crate) fn classic_world(low_luck: bool) -> TestWorld {
    let mut neutral = land("Neutral", None, &["Front", "Far"]);
    neutral.neutral = true;
    let scenario = ScenarioData {
        name: "test".into(),
        rules: GameRules {
            low_luck,
            ..GameRules::default()
        },
        players: vec![
            player("Germany", "Axis"),
            player("Russia", "Allies"),
            player("Britain", "Allies"),
            player("Italy", "Axis"),
        ],
        unit_types: Vec::new(),
        territories: vec![
            land("Rear", Some("Germany"), &["Home"]),
            land("Home", Some("Germany"), &["Front", "Sea"]),
            land("Front", Some("Russia"), &["Far", "Sea"]),
            land("Far", Some("Russia"), &["Sea2"]),
            neutral,
            sea("Sea", &["Sea2"]),
            sea("Sea2", &[]),
        ],
    };
    let (data, state) = scenario.build().expect("fixture scenario builds");
    let t = |name: &str| data.map.id_of(name).expect("fixture territory");
    let p = |name: &str| data.player_id(name).expect("fixture player");
    TestWorld {
        attacker: p("Germany"),
        attacker_ally: p("Italy"),
        defender: p("Russia"),
        defender_ally: p("Britain"),
        rear: t("Rear"),
        home: t("Home"),
        land: t("Front"),
        far: t("Far"),
        neutral: t("Neutral"),
        sea: t("Sea"),
        sea2: t("Sea2"),
        history: History::new(),
        data,
        state,
    }
}

impl TestWorld {
    pub fn type_id(&self, name: &str) -> UnitTypeId {
        self.data.units.id_of(name).expect("fixture unit type")
    }

    pub fn set_type<F: FnOnce(&mut UnitTypeData)>(&mut self, id: UnitTypeId, edit: F) {
        edit(self.data.units.get_mut(id));
    }

    pub fn place_many(
        &mut self,
        owner: PlayerId,
        territory: TerritoryId,
        name: &str,
        count: u32,
    ) -> Vec<UnitId> {
        let unit_type = self.type_id(name);
        let units: Vec<_> = (0..count)
            .map(|_| self.state.allocate_unit(unit_type, owner, territory))
            .collect();
        let ids = units.iter().map(|u| u.id).collect();
        Change::add_units(units)
            .apply(&mut self.state)
            .expect("placement applies");
        ids
    }

    pub fn place(&mut self, owner: PlayerId, territory: TerritoryId, name: &str) -> UnitId {
        self.place_many(owner, territory, name, 1)[0]
    }

    pub fn load(&mut self, transport: UnitId, cargo: UnitId) {
        let transport_unit = self.state.unit(transport).expect("transport on board").clone();
        let cargo_unit = self.state.unit(cargo).expect("cargo on board").clone();
        Change::LoadTransport {
            transport,
            capacity: self
                .data
                .unit_type(transport_unit.unit_type)
                .transport_capacity
                .unwrap_or(0),
            cargo,
            cost: self
                .data
                .unit_type(cargo_unit.unit_type)
                .transport_cost
                .unwrap_or(0),
            allied: transport_unit.owner != cargo_unit.owner,
        }
        .apply(&mut self.state)
        .expect("load applies");
    }

    pub fn bridge<'a>(&'a mut self, random: &'a mut dyn RandomSource) -> Bridge<'a> {
        Bridge::new(&self.data, &mut self.state, random, &mut self.history)
    }
}
