//! Reference data definitions.
//!
//! Pure data structures deserialised from RON scenario documents:
//! unit types, territories, players and rule switches. Reading files is
//! left to the caller; [`ScenarioData::from_ron`] parses text.

pub mod classic;
mod map_data;
mod rules;
mod scenario_data;
mod unit_data;

pub use map_data::{PlayerData, TerritoryData, UnitStack};
pub use rules::GameRules;
pub use scenario_data::ScenarioData;
pub use unit_data::{Domain, SupportRule, UnitCatalog, UnitTypeData};
