//! Game rule switches.

use serde::{Deserialize, Serialize};

/// The rule switches the engine honours.
///
/// Every field has a serde default so scenario files only list what they
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Sides on each die.
    pub dice_sides: u32,
    /// Resolve combat proportionally instead of rolling every die.
    pub low_luck: bool,
    /// Pure transports are taken as casualties only after every other unit.
    pub transport_casualties_restricted: bool,
    /// Attacking submarines fire first when the defender has no destroyer.
    pub sub_sneak_attack: bool,
    /// Defending submarines fire first when the attacker has no destroyer.
    pub defending_subs_sneak_attack: bool,
    /// Submarines may submerge instead of fighting.
    pub subs_may_submerge: bool,
    /// Submarines may submerge before the first round.
    pub submerge_before_battle: bool,
    /// Air units cannot target submarines unless their side has a destroyer.
    pub air_cannot_hit_subs_without_destroyer: bool,
    /// The owner chooses AA casualties; otherwise they are drawn at random.
    pub choose_aa_casualties: bool,
    /// Unowned neutral territories cannot be entered.
    pub neutrals_impassable: bool,
    /// Rounds before a battle ends in a draw; 0 means unlimited.
    pub max_battle_rounds: u32,
    /// Non-amphibious attackers may retreat out of a partly amphibious assault.
    pub partial_amphibious_retreat: bool,
    /// AA fires at air units flying over its territory in combat movement.
    pub aa_fires_on_flyover: bool,
    /// A transport unloads into at most one territory per turn.
    pub unload_restricted: bool,
    /// Bombing damage per raid is capped by the territory's production.
    pub bombing_capped_by_production: bool,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            dice_sides: 6,
            low_luck: false,
            transport_casualties_restricted: true,
            sub_sneak_attack: true,
            defending_subs_sneak_attack: true,
            subs_may_submerge: true,
            submerge_before_battle: false,
            air_cannot_hit_subs_without_destroyer: true,
            choose_aa_casualties: false,
            neutrals_impassable: true,
            max_battle_rounds: 0,
            partial_amphibious_retreat: false,
            aa_fires_on_flyover: true,
            unload_restricted: true,
            bombing_capped_by_production: true,
        }
    }
}
