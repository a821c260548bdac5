//! Battles: the step machine, the tracker of pending battles, and the
//! combat-phase scheduler.
//!
//! A [`Battle`] is one fight in one territory, resolved as a stack of
//! resumable steps. The [`BattleTracker`] owns every pending battle of the
//! turn, their dependencies and the territory they conquered. The
//! [`scheduler`] decides which battles fight themselves at the start of the
//! combat phase.

mod fight;
mod record;
pub mod scheduler;
mod steps;
mod tracker;

pub use fight::{AttackSpec, Battle};
pub use record::{BattleRecord, BattleRecords, BattleResultDescription};
pub use tracker::BattleTracker;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decision::DecisionRequest;
use crate::ids::TerritoryId;

/// Battle type; at most one battle of each type is pending per territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BattleType {
    /// Ordinary combat.
    Normal,
    /// Strategic bombing raid against production.
    BombingRaid,
}

/// Key of a pending battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BattleKey {
    /// Where the battle is.
    pub territory: TerritoryId,
    /// Which kind of battle.
    pub battle_type: BattleType,
}

impl BattleKey {
    /// Create a key.
    #[must_use]
    pub const fn new(territory: TerritoryId, battle_type: BattleType) -> Self {
        Self {
            territory,
            battle_type,
        }
    }

    /// Key of the ordinary battle in a territory.
    #[must_use]
    pub const fn normal(territory: TerritoryId) -> Self {
        Self::new(territory, BattleType::Normal)
    }

    /// Key of the bombing raid on a territory.
    #[must_use]
    pub const fn raid(territory: TerritoryId) -> Self {
        Self::new(territory, BattleType::BombingRaid)
    }
}

impl fmt::Display for BattleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.battle_type {
            BattleType::Normal => write!(f, "battle in {}", self.territory),
            BattleType::BombingRaid => write!(f, "raid on {}", self.territory),
        }
    }
}

/// How a battle behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleKind {
    /// Both sides have combat units and fight in rounds.
    MustFight,
    /// Nothing can defend; the attacker takes the territory unopposed.
    NonFighting,
    /// Bombers against production.
    BombingRaid,
}

/// How a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleOutcome {
    /// Every defender died (or the raid got through).
    AttackerWon,
    /// Every attacker died.
    DefenderWon,
    /// Both sides stand after the round limit, nothing can hit, or both
    /// sides were wiped out.
    Draw,
    /// The attacker withdrew.
    Retreated,
}

/// Result of driving a battle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleProgress {
    /// Waiting for answers to these requests.
    Suspended(Vec<DecisionRequest>),
    /// Resolved.
    Finished(BattleOutcome),
}

/// Side of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The moving player and allies.
    Attacker,
    /// Whoever was there.
    Defender,
}

impl Side {
    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Attacker => Self::Defender,
            Self::Defender => Self::Attacker,
        }
    }

    /// Whether this side rolls defense values.
    #[must_use]
    pub const fn is_defending(self) -> bool {
        matches!(self, Self::Defender)
    }
}
