//! Write-only audit trail of resolved battles.

use serde::{Deserialize, Serialize};

use super::{BattleKey, BattleOutcome};
use crate::ids::PlayerId;

/// What a resolved battle amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleResultDescription {
    /// The attacker won and took the territory.
    Conquered,
    /// The attacker won without taking anything (sea or air only).
    WonWithoutConquering,
    /// The territory fell without a fight.
    NoBattle,
    /// The attacker was destroyed.
    Lost,
    /// The attacker retreated.
    Retreated,
    /// Nobody won.
    Stalemate,
    /// Bombers got through and did this much damage.
    Bombed {
        /// Resources destroyed.
        damage: u32,
    },
}

/// One resolved battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    /// Where and what.
    pub key: BattleKey,
    /// Attacking player.
    pub attacker: PlayerId,
    /// Defending player.
    pub defender: PlayerId,
    /// Final result.
    pub outcome: BattleOutcome,
    /// Description for reports.
    pub description: BattleResultDescription,
    /// Rounds fought.
    pub rounds: u32,
    /// Cost of the attacker's losses.
    pub attacker_tuv_lost: u32,
    /// Cost of the defender's losses.
    pub defender_tuv_lost: u32,
}

/// Records of every battle this turn, in resolution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecords {
    records: Vec<BattleRecord>,
}

impl BattleRecords {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: BattleRecord) {
        self.records.push(record);
    }

    /// All records in order.
    #[must_use]
    pub fn records(&self) -> &[BattleRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Move every record out, leaving the log empty.
    pub fn take(&mut self) -> Vec<BattleRecord> {
        std::mem::take(&mut self.records)
    }
}
