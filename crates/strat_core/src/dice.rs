//! Dice: turning unit rosters into hits.
//!
//! Rules, for a die with `d` sides and a unit of strength `s`:
//! - a 0-based draw `v` hits iff `v < s`;
//! - `s` is clamped to `[0, d]`; `s == d` always hits and draws nothing;
//! - supporting units add their bonus to paired units, greedily in roster
//!   order, without rolling extra dice;
//! - choose-best-roll units keep their lowest die and tag the others
//!   [`DieType::Ignored`];
//! - low luck sums the power `P` of the whole roster, scores `P / d` hits
//!   outright and resolves the remainder `P % d` with a single extra draw.
//!
//! Rolling nothing (no units, or no power) never touches the random source.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::game_data::GameData;
use crate::ids::{PlayerId, TerritoryId, UnitId};
use crate::math::{fixed_serde, ratio, Fixed};
use crate::random::RandomSource;
use crate::state::GameState;

/// Outcome of one die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    /// Draw at or above the strength.
    Miss,
    /// Draw below the strength.
    Hit,
    /// Rolled but discarded (choose-best-roll).
    Ignored,
}

impl DieType {
    const fn code(self) -> u32 {
        match self {
            Self::Miss => 0,
            Self::Hit => 1,
            Self::Ignored => 2,
        }
    }

    const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Miss),
            1 => Some(Self::Hit),
            2 => Some(Self::Ignored),
            _ => None,
        }
    }
}

/// A single die: the 0-based value, the strength it was rolled at and its
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Die {
    value: u8,
    rolled_at: u8,
    die_type: DieType,
}

impl Die {
    /// Create a die. Values above 255 saturate.
    #[must_use]
    pub fn new(value: u32, rolled_at: u32, die_type: DieType) -> Self {
        Self {
            value: u8::try_from(value).unwrap_or(u8::MAX),
            rolled_at: u8::try_from(rolled_at).unwrap_or(u8::MAX),
            die_type,
        }
    }

    /// The 0-based draw.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.value as u32
    }

    /// Strength the die was rolled at.
    #[must_use]
    pub const fn rolled_at(self) -> u32 {
        self.rolled_at as u32
    }

    /// Hit, miss or ignored.
    #[must_use]
    pub const fn die_type(self) -> DieType {
        self.die_type
    }

    /// Pack into an integer: bits 0-7 value, 8-15 rolled-at, 16-23 type.
    #[must_use]
    pub const fn compress(self) -> u32 {
        (self.value as u32) | ((self.rolled_at as u32) << 8) | (self.die_type.code() << 16)
    }

    /// Unpack a value produced by [`compress`](Self::compress).
    ///
    /// # Errors
    /// Returns [`GameError::InvalidState`] for an unknown type code.
    pub fn decompress(packed: u32) -> Result<Self> {
        let die_type = DieType::from_code((packed >> 16) & 0xFF)
            .ok_or_else(|| GameError::InvalidState(format!("bad die type in {packed:#x}")))?;
        Ok(Self {
            value: (packed & 0xFF) as u8,
            rolled_at: ((packed >> 8) & 0xFF) as u8,
            die_type,
        })
    }
}

/// Result of rolling for one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    dice: Vec<Die>,
    hits: u32,
    #[serde(with = "fixed_serde")]
    expected_hits: Fixed,
    player: PlayerId,
}

impl DiceRoll {
    /// A roll with no dice and no hits.
    #[must_use]
    pub fn empty(player: PlayerId) -> Self {
        Self {
            dice: Vec::new(),
            hits: 0,
            expected_hits: Fixed::ZERO,
            player,
        }
    }

    /// Dice in roll order.
    #[must_use]
    pub fn dice(&self) -> &[Die] {
        &self.dice
    }

    /// Number of hits.
    #[must_use]
    pub const fn hits(&self) -> u32 {
        self.hits
    }

    /// Mean hits over all possible draws.
    #[must_use]
    pub const fn expected_hits(&self) -> Fixed {
        self.expected_hits
    }

    /// Rolling player.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        self.player
    }
}

/// Where and why a roll happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollContext {
    /// Battle territory.
    pub territory: TerritoryId,
    /// Every unit on the rolling side, used to find supporters.
    pub friendly: Vec<UnitId>,
    /// Roll bombard strength instead of attack.
    pub bombard: bool,
    /// History annotation.
    pub annotation: String,
}

impl RollContext {
    /// Context for an ordinary combat roll.
    #[must_use]
    pub fn new(territory: TerritoryId, friendly: Vec<UnitId>, annotation: impl Into<String>) -> Self {
        Self {
            territory,
            friendly,
            bombard: false,
            annotation: annotation.into(),
        }
    }

    /// Context for shore bombardment.
    #[must_use]
    pub fn bombardment(territory: TerritoryId, annotation: impl Into<String>) -> Self {
        Self {
            territory,
            friendly: Vec::new(),
            bombard: true,
            annotation: annotation.into(),
        }
    }
}

/// Effective strength and dice count of one unit in one roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitPower {
    /// The unit.
    pub unit: UnitId,
    /// Strength after support, clamped to the dice sides.
    pub strength: u32,
    /// Dice per unit.
    pub rolls: u32,
    /// Keeps only its best die.
    pub choose_best: bool,
}

struct SupportSlot {
    bonus: u32,
    remaining: u32,
    supports: Vec<String>,
}

/// Compute each unit's effective strength, pairing supporters greedily.
///
/// # Errors
/// Returns [`GameError::UnknownUnit`] if a unit is not on the board.
pub fn unit_powers(
    data: &GameData,
    state: &GameState,
    units: &[UnitId],
    defending: bool,
    context: &RollContext,
) -> Result<Vec<UnitPower>> {
    let sides = data.dice_sides();

    let mut slots = Vec::new();
    if !context.bombard {
        let mut supporters: Vec<UnitId> = context.friendly.clone();
        for unit in units {
            if !supporters.contains(unit) {
                supporters.push(*unit);
            }
        }
        for id in supporters {
            let Some(unit) = state.unit(id) else { continue };
            let Some(rule) = &data.unit_type(unit.unit_type).support else {
                continue;
            };
            let applies = if defending { rule.defence } else { rule.offence };
            if applies && rule.count > 0 {
                slots.push(SupportSlot {
                    bonus: rule.bonus,
                    remaining: rule.count,
                    supports: rule.supports.clone(),
                });
            }
        }
    }

    units
        .iter()
        .map(|id| {
            let unit = state.require_unit(*id)?;
            let unit_type = data.unit_type(unit.unit_type);
            let (mut strength, rolls) = if context.bombard {
                (unit_type.bombard, 1)
            } else {
                (unit_type.strength(defending), unit_type.rolls(defending))
            };
            if strength > 0 {
                if let Some(slot) = slots
                    .iter_mut()
                    .find(|s| s.remaining > 0 && s.supports.contains(&unit_type.name))
                {
                    strength += slot.bonus;
                    slot.remaining -= 1;
                }
            }
            Ok(UnitPower {
                unit: *id,
                strength: strength.min(sides),
                rolls,
                choose_best: unit_type.choose_best_roll && rolls > 1,
            })
        })
        .collect()
}

/// Total power of a roster: the sum low luck would resolve.
#[must_use]
pub fn total_power(powers: &[UnitPower], sides: u32) -> u32 {
    powers
        .iter()
        .map(|p| {
            if p.strength == 0 {
                0
            } else if p.choose_best {
                let per_extra_roll = (sides / 6).max(1);
                (p.strength + per_extra_roll * (p.rolls - 1)).min(sides)
            } else {
                p.strength * p.rolls
            }
        })
        .sum()
}

/// Split low-luck power into guaranteed hits and the remainder that needs a
/// draw.
#[must_use]
pub const fn low_luck_split(power: u32, sides: u32) -> (u32, u32) {
    (power / sides, power % sides)
}

fn roll_low_luck(
    random: &mut dyn RandomSource,
    power: u32,
    sides: u32,
    player: PlayerId,
    annotation: &str,
) -> Result<DiceRoll> {
    if power == 0 {
        return Ok(DiceRoll::empty(player));
    }
    let (guaranteed, remainder) = low_luck_split(power, sides);
    let mut dice: Vec<Die> = (0..guaranteed)
        .map(|_| Die::new(0, sides, DieType::Hit))
        .collect();
    let mut hits = guaranteed;
    if remainder > 0 {
        let draw = first_draw(random.draw(sides, 1, annotation)?, annotation)?;
        if draw < remainder {
            hits += 1;
            dice.push(Die::new(draw, remainder, DieType::Hit));
        } else {
            dice.push(Die::new(draw, remainder, DieType::Miss));
        }
    }
    Ok(DiceRoll {
        dice,
        hits,
        expected_hits: ratio(power, sides),
        player,
    })
}

fn first_draw(values: Vec<u32>, annotation: &str) -> Result<u32> {
    values.first().copied().ok_or_else(|| {
        GameError::RandomSource(format!("random source returned no values ({annotation})"))
    })
}

fn roll_normal(
    random: &mut dyn RandomSource,
    powers: &[UnitPower],
    sides: u32,
    player: PlayerId,
    annotation: &str,
) -> Result<DiceRoll> {
    let needed: u32 = powers
        .iter()
        .filter(|p| p.strength > 0 && p.strength < sides)
        .map(|p| p.rolls)
        .sum();
    let draws = if needed > 0 {
        random.draw(sides, needed, annotation)?
    } else {
        Vec::new()
    };
    if draws.len() != needed as usize {
        return Err(GameError::RandomSource(format!(
            "asked for {needed} values, got {} ({annotation})",
            draws.len()
        )));
    }

    let mut cursor = 0usize;
    let mut dice = Vec::new();
    let mut hits = 0u32;
    let mut expected = Fixed::ZERO;

    for power in powers {
        if power.strength == 0 || power.rolls == 0 {
            continue;
        }
        if power.strength >= sides {
            let auto_hits = if power.choose_best { 1 } else { power.rolls };
            for _ in 0..auto_hits {
                dice.push(Die::new(0, sides, DieType::Hit));
            }
            hits += auto_hits;
            expected += Fixed::from_num(auto_hits);
            continue;
        }

        let values = &draws[cursor..cursor + power.rolls as usize];
        cursor += power.rolls as usize;

        if power.choose_best {
            let best = values
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| **v)
                .map_or(0, |(i, _)| i);
            for (i, value) in values.iter().enumerate() {
                let die_type = if i != best {
                    DieType::Ignored
                } else if *value < power.strength {
                    hits += 1;
                    DieType::Hit
                } else {
                    DieType::Miss
                };
                dice.push(Die::new(*value, power.strength, die_type));
            }
            let mut miss_all = Fixed::ONE;
            let miss_one = ratio(sides - power.strength, sides);
            for _ in 0..power.rolls {
                miss_all *= miss_one;
            }
            expected += Fixed::ONE - miss_all;
        } else {
            for value in values {
                if *value < power.strength {
                    hits += 1;
                    dice.push(Die::new(*value, power.strength, DieType::Hit));
                } else {
                    dice.push(Die::new(*value, power.strength, DieType::Miss));
                }
            }
            expected += ratio(power.strength * power.rolls, sides);
        }
    }

    Ok(DiceRoll {
        dice,
        hits,
        expected_hits: expected,
        player,
    })
}

/// Roll combat dice for `units`.
///
/// # Errors
/// Propagates random source failures and unknown units.
pub fn roll_dice(
    data: &GameData,
    state: &GameState,
    random: &mut dyn RandomSource,
    units: &[UnitId],
    defending: bool,
    player: PlayerId,
    context: &RollContext,
) -> Result<DiceRoll> {
    if units.is_empty() {
        return Ok(DiceRoll::empty(player));
    }
    let sides = data.dice_sides();
    let powers = unit_powers(data, state, units, defending, context)?;
    let roll = if data.rules.low_luck {
        roll_low_luck(
            random,
            total_power(&powers, sides),
            sides,
            player,
            &context.annotation,
        )?
    } else {
        roll_normal(random, &powers, sides, player, &context.annotation)?
    };
    tracing::debug!(
        %player,
        territory = %context.territory,
        units = units.len(),
        defending,
        hits = roll.hits,
        "Rolled dice"
    );
    Ok(roll)
}

/// Roll anti-aircraft fire from `aa_units` at the air units in `targets`.
///
/// Strength is the best AA strength present; each AA unit fires at most
/// `max_aa_attacks` shots and the whole volley at most one per target.
///
/// # Errors
/// Propagates random source failures and unknown units.
pub fn roll_aa(
    data: &GameData,
    state: &GameState,
    random: &mut dyn RandomSource,
    aa_units: &[UnitId],
    targets: &[UnitId],
    player: PlayerId,
    annotation: &str,
) -> Result<DiceRoll> {
    if aa_units.is_empty() || targets.is_empty() {
        return Ok(DiceRoll::empty(player));
    }
    let sides = data.dice_sides();
    let target_count = targets.len() as u32;
    let mut strength = 0u32;
    let mut shots = 0u32;
    for id in aa_units {
        let unit_type = data.unit_type(state.require_unit(*id)?.unit_type);
        strength = strength.max(unit_type.aa_strength);
        shots = shots.saturating_add(unit_type.max_aa_attacks.unwrap_or(target_count));
    }
    let strength = strength.min(sides);
    let shots = shots.min(target_count);
    if strength == 0 || shots == 0 {
        return Ok(DiceRoll::empty(player));
    }

    let roll = if data.rules.low_luck {
        roll_low_luck(random, strength * shots, sides, player, annotation)?
    } else {
        let power = UnitPower {
            unit: aa_units[0],
            strength,
            rolls: shots,
            choose_best: false,
        };
        roll_normal(random, &[power], sides, player, annotation)?
    };
    tracing::debug!(%player, shots, hits = roll.hits, "Rolled AA");
    Ok(roll)
}

/// Roll strategic bombing damage: one die per bomber, `value + 1` each.
/// Under low luck every bomber deals the average `(d + 1) / 2` without a
/// draw.
///
/// # Errors
/// Propagates random source failures.
pub fn roll_bombing_damage(
    data: &GameData,
    random: &mut dyn RandomSource,
    bombers: &[UnitId],
    player: PlayerId,
    annotation: &str,
) -> Result<(DiceRoll, u32)> {
    if bombers.is_empty() {
        return Ok((DiceRoll::empty(player), 0));
    }
    let sides = data.dice_sides();
    let count = bombers.len() as u32;
    let values = if data.rules.low_luck {
        vec![(sides + 1) / 2 - 1; bombers.len()]
    } else {
        random.draw(sides, count, annotation)?
    };
    let damage = values.iter().map(|v| v + 1).sum();
    let dice = values
        .iter()
        .map(|v| Die::new(*v, sides, DieType::Hit))
        .collect();
    Ok((
        DiceRoll {
            dice,
            hits: damage,
            expected_hits: ratio(count * (sides + 1), 2),
            player,
        },
        damage,
    ))
}
