//! The built-in classic unit set.
//!
//! Scenarios that omit `unit_types` get this catalog. Type ids follow the
//! order of [`unit_types`].

use super::unit_data::{Domain, SupportRule, UnitTypeData};

/// Infantry type name.
pub const INFANTRY: &str = "infantry";
/// Artillery type name.
pub const ARTILLERY: &str = "artillery";
/// Armour type name.
pub const ARMOUR: &str = "armour";
/// AA gun type name.
pub const AA_GUN: &str = "aa_gun";
/// Fighter type name.
pub const FIGHTER: &str = "fighter";
/// Bomber type name.
pub const BOMBER: &str = "bomber";
/// Transport type name.
pub const TRANSPORT: &str = "transport";
/// Submarine type name.
pub const SUBMARINE: &str = "submarine";
/// Destroyer type name.
pub const DESTROYER: &str = "destroyer";
/// Cruiser type name.
pub const CRUISER: &str = "cruiser";
/// Battleship type name.
pub const BATTLESHIP: &str = "battleship";
/// Carrier type name.
pub const CARRIER: &str = "carrier";

fn sea(name: &str, cost: u32, attack: u32, defense: u32) -> UnitTypeData {
    let mut unit = UnitTypeData::new(name, cost, attack, defense, 2);
    unit.domain = Domain::Sea;
    unit
}

fn air(name: &str, cost: u32, attack: u32, defense: u32, movement: u32) -> UnitTypeData {
    let mut unit = UnitTypeData::new(name, cost, attack, defense, movement);
    unit.domain = Domain::Air;
    unit
}

/// The classic unit types.
#[must_use]
pub fn unit_types() -> Vec<UnitTypeData> {
    let mut infantry = UnitTypeData::new(INFANTRY, 3, 1, 2, 1);
    infantry.transport_cost = Some(2);

    let mut artillery = UnitTypeData::new(ARTILLERY, 4, 2, 2, 1);
    artillery.transport_cost = Some(3);
    artillery.support = Some(SupportRule {
        bonus: 1,
        count: 1,
        supports: vec![INFANTRY.to_string()],
        offence: true,
        defence: false,
    });

    let mut armour = UnitTypeData::new(ARMOUR, 5, 3, 3, 2);
    armour.transport_cost = Some(3);
    armour.can_blitz = true;

    let mut aa_gun = UnitTypeData::new(AA_GUN, 5, 0, 0, 1);
    aa_gun.transport_cost = Some(3);
    aa_gun.is_aa = true;
    aa_gun.aa_strength = 1;
    aa_gun.is_infrastructure = true;

    let mut fighter = air(FIGHTER, 10, 3, 4, 4);
    fighter.carrier_cost = Some(1);

    let mut bomber = air(BOMBER, 15, 4, 1, 6);
    bomber.is_strategic_bomber = true;

    let mut transport = sea(TRANSPORT, 8, 0, 0);
    transport.transport_capacity = Some(5);

    let mut submarine = sea(SUBMARINE, 8, 2, 2);
    submarine.is_sub = true;

    let mut destroyer = sea(DESTROYER, 12, 3, 3);
    destroyer.is_destroyer = true;

    let mut cruiser = sea(CRUISER, 12, 3, 3);
    cruiser.bombard = 3;

    let mut battleship = sea(BATTLESHIP, 24, 4, 4);
    battleship.hit_points = 2;
    battleship.bombard = 4;

    let mut carrier = sea(CARRIER, 16, 1, 3);
    carrier.carrier_capacity = Some(2);

    vec![
        infantry, artillery, armour, aa_gun, fighter, bomber, transport, submarine, destroyer,
        cruiser, battleship, carrier,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let types = unit_types();
        let mut names: Vec<_> = types.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), types.len());
    }

    #[test]
    fn test_transport_fits_infantry_and_one_heavy() {
        let types = unit_types();
        let find = |name: &str| types.iter().find(|t| t.name == name).expect("classic type");
        let capacity = find(TRANSPORT).transport_capacity.unwrap_or(0);
        let infantry = find(INFANTRY).transport_cost.unwrap_or(0);
        let armour = find(ARMOUR).transport_cost.unwrap_or(0);
        assert!(infantry + armour <= capacity);
        assert!(armour * 2 > capacity);
    }
}
