//! Test fixtures and helpers.
//!
//! A small classic scenario shared by integration tests, benchmarks and the
//! headless runner's tests:
//!
//! ```text
//!   Rear - Home ---- Front ---- Far
//!            \        /  \       |
//!             \      /    Neutral|
//!              Sea -------- Sea2-+
//! ```
//!
//! Germany and Italy (Axis) face Russia and Britain (Allies). Germany owns
//! Rear and Home, Russia owns Front and Far.

use fixed::types::I32F32;
use strat_core::battle::{AttackSpec, BattleType};
use strat_core::bridge::Bridge;
use strat_core::change::Change;
use strat_core::data::ScenarioData;
use strat_core::game_data::GameData;
use strat_core::history::History;
use strat_core::ids::{PlayerId, TerritoryId, UnitId, UnitTypeId};
use strat_core::random::RandomSource;
use strat_core::state::GameState;

/// RON text of the fixture scenario.
pub const FIXTURE_SCENARIO: &str = r#"
ScenarioData(
    name: "fixture",
    players: [
        PlayerData(name: "Germany", alliance: "Axis", resources: 20),
        PlayerData(name: "Russia", alliance: "Allies", resources: 20),
        PlayerData(name: "Britain", alliance: "Allies", resources: 20),
        PlayerData(name: "Italy", alliance: "Axis", resources: 20),
    ],
    territories: [
        TerritoryData(name: "Rear", owner: Some("Germany"), production: 3, adjacent: ["Home"]),
        TerritoryData(name: "Home", owner: Some("Germany"), production: 3, adjacent: ["Front", "Sea"]),
        TerritoryData(name: "Front", owner: Some("Russia"), production: 3, adjacent: ["Far", "Sea"]),
        TerritoryData(name: "Far", owner: Some("Russia"), production: 3, adjacent: ["Sea2"]),
        TerritoryData(name: "Neutral", neutral: true, production: 3, adjacent: ["Front", "Far"]),
        TerritoryData(name: "Sea", water: true, adjacent: ["Sea2"]),
        TerritoryData(name: "Sea2", water: true),
    ],
)
"#;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Parse the fixture scenario.
///
/// # Panics
///
/// Panics if [`FIXTURE_SCENARIO`] is not valid RON.
#[must_use]
pub fn fixture_scenario(low_luck: bool) -> ScenarioData {
    let mut scenario = ScenarioData::from_ron(FIXTURE_SCENARIO).expect("fixture scenario parses");
    scenario.rules.low_luck = low_luck;
    scenario
}

/// A built fixture scenario with every id looked up.
pub struct Fixture {
    /// Reference data.
    pub data: GameData,
    /// Current board.
    pub state: GameState,
    /// History written through [`Fixture::bridge`].
    pub history: History,
    /// Germany.
    pub attacker: PlayerId,
    /// Italy.
    pub attacker_ally: PlayerId,
    /// Russia.
    pub defender: PlayerId,
    /// Britain.
    pub defender_ally: PlayerId,
    /// German land behind Home.
    pub rear: TerritoryId,
    /// German coastal land.
    pub home: TerritoryId,
    /// Russian coastal land next to Home.
    pub front: TerritoryId,
    /// Russian land beyond Front.
    pub far: TerritoryId,
    /// Unowned neutral land.
    pub neutral: TerritoryId,
    /// Sea zone off Home and Front.
    pub sea: TerritoryId,
    /// Sea zone off Far.
    pub sea2: TerritoryId,
}

impl Fixture {
    /// Build the fixture with dice or low-luck rules.
    ///
    /// # Panics
    ///
    /// Panics if the fixture scenario fails to build.
    #[must_use]
    pub fn new(low_luck: bool) -> Self {
        Self::from_scenario(&fixture_scenario(low_luck))
    }

    /// Build the fixture from an edited scenario. Territory and player
    /// names must be the fixture's.
    ///
    /// # Panics
    ///
    /// Panics if the scenario fails to build or misses a fixture name.
    #[must_use]
    pub fn from_scenario(scenario: &ScenarioData) -> Self {
        let (data, state) = scenario.build().expect("fixture scenario builds");
        let t = |name: &str| data.map.id_of(name).expect("fixture territory");
        let p = |name: &str| data.player_id(name).expect("fixture player");
        Self {
            attacker: p("Germany"),
            attacker_ally: p("Italy"),
            defender: p("Russia"),
            defender_ally: p("Britain"),
            rear: t("Rear"),
            home: t("Home"),
            front: t("Front"),
            far: t("Far"),
            neutral: t("Neutral"),
            sea: t("Sea"),
            sea2: t("Sea2"),
            history: History::new(),
            data,
            state,
        }
    }

    /// Look up a unit type by name.
    ///
    /// # Panics
    ///
    /// Panics on an unknown name.
    #[must_use]
    pub fn type_id(&self, name: &str) -> UnitTypeId {
        self.data.units.id_of(name).expect("fixture unit type")
    }

    /// Place `count` units of a type, bypassing movement rules.
    ///
    /// # Panics
    ///
    /// Panics if the placement change fails.
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

    /// Place one unit.
    pub fn place(&mut self, owner: PlayerId, territory: TerritoryId, name: &str) -> UnitId {
        self.place_many(owner, territory, name, 1)[0]
    }

    /// Put `cargo` aboard `transport` directly.
    ///
    /// # Panics
    ///
    /// Panics if either unit is missing or the transport is full.
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

    /// A bridge over the fixture's board and history.
    pub fn bridge<'a>(&'a mut self, random: &'a mut dyn RandomSource) -> Bridge<'a> {
        Bridge::new(&self.data, &mut self.state, random, &mut self.history)
    }

    /// A normal land attack by Germany from Home.
    #[must_use]
    pub fn attack(&self, territory: TerritoryId, units: Vec<UnitId>) -> AttackSpec {
        AttackSpec {
            attacker: self.attacker,
            territory,
            battle_type: BattleType::Normal,
            units,
            from: self.home,
            amphibious: Vec::new(),
        }
    }
}
