//! The single funnel for board mutations.
//!
//! A [`Bridge`] bundles the read-only data with the mutable state, the
//! shared random source and the history writer. Battles, the move delegate
//! and undo receive it explicitly; nothing mutates the board any other way.

use crate::change::Change;
use crate::dice::{self, DiceRoll, RollContext};
use crate::error::Result;
use crate::game_data::GameData;
use crate::history::History;
use crate::ids::{PlayerId, TerritoryId, UnitId, UnitTypeId};
use crate::random::RandomSource;
use crate::state::GameState;
use crate::unit::Unit;

/// Mutation funnel for one authoritative game.
pub struct Bridge<'a> {
    data: &'a GameData,
    state: &'a mut GameState,
    random: &'a mut dyn RandomSource,
    history: &'a mut History,
}

impl<'a> Bridge<'a> {
    /// Bundle the collaborators.
    pub fn new(
        data: &'a GameData,
        state: &'a mut GameState,
        random: &'a mut dyn RandomSource,
        history: &'a mut History,
    ) -> Self {
        Self {
            data,
            state,
            random,
            history,
        }
    }

    /// Reference data. The returned borrow outlives `&self`, so callers can
    /// keep it while mutating through the bridge.
    #[must_use]
    pub fn data(&self) -> &'a GameData {
        self.data
    }

    /// Current board.
    #[must_use]
    pub fn state(&self) -> &GameState {
        self.state
    }

    /// History so far.
    #[must_use]
    pub fn history(&self) -> &History {
        self.history
    }

    /// Mint a unit id for a unit that an `AddUnits` change will place.
    pub fn allocate_unit(
        &mut self,
        unit_type: UnitTypeId,
        owner: PlayerId,
        location: TerritoryId,
    ) -> Unit {
        self.state.allocate_unit(unit_type, owner, location)
    }

    /// Apply a change and append it to the history.
    ///
    /// # Errors
    /// Returns the error from [`Change::apply`]; nothing is recorded and the
    /// board is unchanged.
    pub fn add_change(&mut self, change: Change) -> Result<()> {
        if change.is_empty() {
            return Ok(());
        }
        change.apply(self.state)?;
        #[cfg(feature = "debug-validation")]
        self.state.check_invariants()?;
        self.history.add_change(change);
        Ok(())
    }

    /// Record a narrative event.
    pub fn start_event(&mut self, description: impl Into<String>) {
        let description = description.into();
        tracing::debug!(event = %description, "History event");
        self.history.start_event(description);
    }

    /// Draw raw random values.
    ///
    /// # Errors
    /// Propagates random source failures.
    pub fn draw(&mut self, max_exclusive: u32, count: u32, annotation: &str) -> Result<Vec<u32>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.random.draw(max_exclusive, count, annotation)
    }

    /// Roll combat dice and record them.
    ///
    /// # Errors
    /// Propagates random source failures and unknown units.
    pub fn roll_dice(
        &mut self,
        units: &[UnitId],
        defending: bool,
        player: PlayerId,
        context: &RollContext,
    ) -> Result<DiceRoll> {
        let roll = dice::roll_dice(
            self.data,
            self.state,
            self.random,
            units,
            defending,
            player,
            context,
        )?;
        self.history.add_dice(context.annotation.clone(), roll.clone());
        Ok(roll)
    }

    /// Roll anti-aircraft fire and record it.
    ///
    /// # Errors
    /// Propagates random source failures and unknown units.
    pub fn roll_aa(
        &mut self,
        aa_units: &[UnitId],
        targets: &[UnitId],
        player: PlayerId,
        annotation: &str,
    ) -> Result<DiceRoll> {
        let roll = dice::roll_aa(
            self.data,
            self.state,
            self.random,
            aa_units,
            targets,
            player,
            annotation,
        )?;
        self.history.add_dice(annotation, roll.clone());
        Ok(roll)
    }

    /// Roll strategic bombing damage and record it. Returns the roll and the
    /// total damage.
    ///
    /// # Errors
    /// Propagates random source failures.
    pub fn roll_bombing_damage(
        &mut self,
        bombers: &[UnitId],
        player: PlayerId,
        annotation: &str,
    ) -> Result<(DiceRoll, u32)> {
        let (roll, damage) =
            dice::roll_bombing_damage(self.data, self.random, bombers, player, annotation)?;
        self.history.add_dice(annotation, roll.clone());
        Ok((roll, damage))
    }
}
