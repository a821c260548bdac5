//! Per-player resource stockpiles.
//!
//! Stockpiles never go negative: a delta that would underflow is clamped so
//! the stockpile lands on zero, and the clamped delta is what gets recorded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::PlayerId;

/// Clamp `delta` so `current + delta` is not negative.
#[must_use]
pub const fn clamped_delta(current: i32, delta: i32) -> i32 {
    if current.saturating_add(delta) < 0 {
        -current
    } else {
        delta
    }
}

/// Resource stockpiles by player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resources {
    amounts: BTreeMap<PlayerId, i32>,
}

impl Resources {
    /// Create empty stockpiles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stockpile of a player.
    #[must_use]
    pub fn get(&self, player: PlayerId) -> i32 {
        self.amounts.get(&player).copied().unwrap_or(0)
    }

    /// Set a stockpile directly (scenario setup only).
    pub(crate) fn set(&mut self, player: PlayerId, amount: i32) {
        self.amounts.insert(player, amount.max(0));
    }

    /// Apply a delta that has already been clamped.
    pub(crate) fn apply(&mut self, player: PlayerId, delta: i32) {
        let entry = self.amounts.entry(player).or_insert(0);
        *entry = entry.saturating_add(delta).max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_delta() {
        assert_eq!(clamped_delta(10, -3), -3);
        assert_eq!(clamped_delta(10, -15), -10);
        assert_eq!(clamped_delta(0, -1), 0);
        assert_eq!(clamped_delta(5, 7), 7);
    }

    #[test]
    fn test_apply_never_goes_negative() {
        let mut resources = Resources::new();
        let player = PlayerId::new(0);
        resources.set(player, 4);
        resources.apply(player, clamped_delta(resources.get(player), -9));
        assert_eq!(resources.get(player), 0);
    }
}
