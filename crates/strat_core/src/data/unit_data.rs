//! Unit type definitions.

use serde::{Deserialize, Serialize};

use crate::ids::UnitTypeId;

/// Movement domain of a unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Domain {
    /// Moves over land territories; enters water only aboard a transport.
    #[default]
    Land,
    /// Moves through sea zones only.
    Sea,
    /// Flies over anything; must end its turn somewhere it can land.
    Air,
}

/// Combat support granted by a unit (artillery-style pairing).
///
/// Each supporting unit grants `bonus` to up to `count` friendly units whose
/// type name appears in `supports`. Pairing is greedy in roster order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportRule {
    /// Strength added to each supported unit.
    pub bonus: u32,
    /// Number of units one supporter can pair with.
    #[serde(default = "default_one")]
    pub count: u32,
    /// Names of the unit types that can receive the bonus.
    pub supports: Vec<String>,
    /// Applies when the supporter's side is attacking.
    #[serde(default = "default_true")]
    pub offence: bool,
    /// Applies when the supporter's side is defending.
    #[serde(default)]
    pub defence: bool,
}

/// Data-driven unit type definition.
///
/// # Example RON
///
/// ```ron
/// UnitTypeData(
///     name: "artillery",
///     cost: 4,
///     attack: 2,
///     defense: 2,
///     movement: 1,
///     transport_cost: Some(3),
///     support: Some(SupportRule(bonus: 1, supports: ["infantry"])),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTypeData {
    /// Unique name, also used to reference the type from scenarios.
    pub name: String,

    /// Production cost; the unit's TUV.
    #[serde(default)]
    pub cost: u32,

    /// Attack strength (hits on a 0-based draw strictly below it).
    #[serde(default)]
    pub attack: u32,

    /// Defense strength.
    #[serde(default)]
    pub defense: u32,

    /// Dice rolled per unit when attacking.
    #[serde(default = "default_one")]
    pub attack_rolls: u32,

    /// Dice rolled per unit when defending.
    #[serde(default = "default_one")]
    pub defense_rolls: u32,

    /// Movement points per turn.
    #[serde(default)]
    pub movement: u32,

    /// Hits the unit absorbs before dying.
    #[serde(default = "default_one")]
    pub hit_points: u32,

    /// Movement domain.
    #[serde(default)]
    pub domain: Domain,

    /// Submarine: sneak attack, may submerge, cannot hit air.
    #[serde(default)]
    pub is_sub: bool,

    /// Destroyer: cancels enemy submarine abilities.
    #[serde(default)]
    pub is_destroyer: bool,

    /// Fires anti-aircraft shots before combat and at fly-over.
    #[serde(default)]
    pub is_aa: bool,

    /// Cannot be taken as a casualty; captured with the territory.
    #[serde(default)]
    pub is_infrastructure: bool,

    /// May conduct strategic bombing raids.
    #[serde(default)]
    pub is_strategic_bomber: bool,

    /// May move through empty enemy territory during combat movement.
    #[serde(default)]
    pub can_blitz: bool,

    /// With several rolls, only the best die counts.
    #[serde(default)]
    pub choose_best_roll: bool,

    /// Cargo capacity; present on transports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_capacity: Option<u32>,

    /// Capacity this unit consumes aboard a transport; `None` means it cannot
    /// be transported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_cost: Option<u32>,

    /// Aircraft capacity; present on carriers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_capacity: Option<u32>,

    /// Carrier capacity this aircraft consumes; `None` means it cannot land
    /// on carriers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_cost: Option<u32>,

    /// Shore bombardment strength (0 = cannot bombard).
    #[serde(default)]
    pub bombard: u32,

    /// Anti-aircraft strength.
    #[serde(default)]
    pub aa_strength: u32,

    /// Maximum AA shots per battle (`None` = one per target).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_aa_attacks: Option<u32>,

    /// Support granted to other units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<SupportRule>,
}

const fn default_one() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

impl UnitTypeData {
    /// Create a land unit with the given stats and defaults elsewhere.
    #[must_use]
    pub fn new(name: impl Into<String>, cost: u32, attack: u32, defense: u32, movement: u32) -> Self {
        Self {
            name: name.into(),
            cost,
            attack,
            defense,
            attack_rolls: 1,
            defense_rolls: 1,
            movement,
            hit_points: 1,
            domain: Domain::Land,
            is_sub: false,
            is_destroyer: false,
            is_aa: false,
            is_infrastructure: false,
            is_strategic_bomber: false,
            can_blitz: false,
            choose_best_roll: false,
            transport_capacity: None,
            transport_cost: None,
            carrier_capacity: None,
            carrier_cost: None,
            bombard: 0,
            aa_strength: 0,
            max_aa_attacks: None,
            support: None,
        }
    }

    /// Check if this is a land unit.
    #[must_use]
    pub fn is_land(&self) -> bool {
        self.domain == Domain::Land
    }

    /// Check if this is a sea unit.
    #[must_use]
    pub fn is_sea(&self) -> bool {
        self.domain == Domain::Sea
    }

    /// Check if this is an air unit.
    #[must_use]
    pub fn is_air(&self) -> bool {
        self.domain == Domain::Air
    }

    /// Check if this unit carries cargo.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        self.transport_capacity.is_some()
    }

    /// A transport with no combat value. These are the units the restricted
    /// transport casualty rule protects until last.
    #[must_use]
    pub fn is_pure_transport(&self) -> bool {
        self.is_transport() && self.is_sea() && self.attack == 0 && self.defense == 0
    }

    /// Check if this unit is a carrier.
    #[must_use]
    pub fn is_carrier(&self) -> bool {
        self.carrier_capacity.is_some()
    }

    /// Strength for the given side, before support.
    #[must_use]
    pub const fn strength(&self, defending: bool) -> u32 {
        if defending {
            self.defense
        } else {
            self.attack
        }
    }

    /// Dice per unit for the given side.
    #[must_use]
    pub const fn rolls(&self, defending: bool) -> u32 {
        if defending {
            self.defense_rolls
        } else {
            self.attack_rolls
        }
    }
}

/// Indexed catalog of unit types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitCatalog {
    types: Vec<UnitTypeData>,
}

impl UnitCatalog {
    /// Build a catalog; ids follow insertion order.
    #[must_use]
    pub fn new(types: Vec<UnitTypeData>) -> Self {
        Self { types }
    }

    /// Look up a unit type.
    ///
    /// Ids come from this catalog, so an out-of-range id is a programming
    /// error and panics.
    #[must_use]
    pub fn get(&self, id: UnitTypeId) -> &UnitTypeData {
        &self.types[id.index()]
    }

    /// Mutable access for scenario construction and tuning.
    pub fn get_mut(&mut self, id: UnitTypeId) -> &mut UnitTypeData {
        &mut self.types[id.index()]
    }

    /// Find a unit type by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<UnitTypeId> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .map(|i| UnitTypeId::new(i as u32))
    }

    /// Number of unit types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate over all types in id order.
    pub fn iter(&self) -> impl Iterator<Item = (UnitTypeId, &UnitTypeData)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (UnitTypeId::new(i as u32), t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ron_defaults() {
        let ron = r#"UnitTypeData(name: "infantry", cost: 3, attack: 1, defense: 2, movement: 1)"#;
        let unit: UnitTypeData = ron::from_str(ron).expect("valid RON");
        assert_eq!(unit.attack_rolls, 1);
        assert_eq!(unit.hit_points, 1);
        assert!(unit.is_land());
        assert!(unit.support.is_none());
    }

    #[test]
    fn test_support_rule_defaults() {
        let ron = r#"SupportRule(bonus: 1, supports: ["infantry"])"#;
        let rule: SupportRule = ron::from_str(ron).expect("valid RON");
        assert_eq!(rule.count, 1);
        assert!(rule.offence);
        assert!(!rule.defence);
    }

    #[test]
    fn test_pure_transport() {
        let mut transport = UnitTypeData::new("transport", 8, 0, 0, 2);
        transport.domain = Domain::Sea;
        transport.transport_capacity = Some(5);
        assert!(transport.is_pure_transport());

        transport.defense = 1;
        assert!(transport.is_transport());
        assert!(!transport.is_pure_transport());
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = UnitCatalog::new(vec![
            UnitTypeData::new("infantry", 3, 1, 2, 1),
            UnitTypeData::new("armour", 5, 3, 3, 2),
        ]);
        let armour = catalog.id_of("armour").expect("present");
        assert_eq!(armour.0, 1);
        assert_eq!(catalog.get(armour).movement, 2);
        assert!(catalog.id_of("cavalry").is_none());
    }
}
