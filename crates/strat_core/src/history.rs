//! Append-only game history.

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::dice::DiceRoll;

/// One history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryEntry {
    /// A narrative event ("Germany attacks Karelia").
    Event(String),
    /// An applied change.
    Change(Change),
    /// A dice roll and what it was for.
    Dice {
        /// What was rolled.
        annotation: String,
        /// The roll.
        roll: DiceRoll,
    },
}

/// Everything that happened, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a narrative event.
    pub fn start_event(&mut self, description: impl Into<String>) {
        self.entries.push(HistoryEntry::Event(description.into()));
    }

    /// Record an applied change.
    pub fn add_change(&mut self, change: Change) {
        self.entries.push(HistoryEntry::Change(change));
    }

    /// Record a dice roll.
    pub fn add_dice(&mut self, annotation: impl Into<String>, roll: DiceRoll) {
        self.entries.push(HistoryEntry::Dice {
            annotation: annotation.into(),
            roll,
        });
    }

    /// All entries in order.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dice rolls recorded so far.
    pub fn dice(&self) -> impl Iterator<Item = &DiceRoll> {
        self.entries.iter().filter_map(|e| match e {
            HistoryEntry::Dice { roll, .. } => Some(roll),
            _ => None,
        })
    }
}
