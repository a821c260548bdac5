//! Error types for the rules engine.
//!
//! Illegal moves are *not* errors: they come back as a
//! [`MoveValidationResult`](crate::move_validator::MoveValidationResult).
//! A [`GameError`] means an invariant was broken or a caller violated a
//! protocol, and the operation that raised it has been aborted.

use thiserror::Error;

use crate::battle::BattleKey;
use crate::ids::{TerritoryId, UnitId, UnitTypeId};

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all rules engine errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Unit is not on the board.
    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    /// Unit type is not in the catalog.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(UnitTypeId),

    /// Territory is not on the map.
    #[error("Unknown territory: {0}")]
    UnknownTerritory(TerritoryId),

    /// Data file parsing or validation error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path or name of the document that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// A board invariant does not hold.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Transport bookkeeping was asked to do something impossible.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The random source refused or could not produce a draw.
    #[error("Random source failure: {0}")]
    RandomSource(String),

    /// Battle is not pending in the tracker.
    #[error("No pending battle for {0}")]
    BattleNotFound(BattleKey),

    /// Battle cannot be fought until the battles it depends on are resolved.
    #[error("Battle {battle} is blocked by {blocking:?}")]
    BattleBlocked {
        /// The battle that was asked to fight.
        battle: BattleKey,
        /// Battles that must resolve first.
        blocking: Vec<BattleKey>,
    },

    /// Battle has already resolved.
    #[error("Battle {0} is already over")]
    BattleOver(BattleKey),

    /// A decision response named a request that is not outstanding.
    #[error("Request {request} is not outstanding in battle {battle}")]
    UnknownRequest {
        /// Battle the response was sent to.
        battle: BattleKey,
        /// Request id that was answered.
        request: u64,
    },

    /// The response type does not match the request.
    #[error("Response does not match request {0}")]
    MismatchedResponse(u64),

    /// Casualty selection failed validation; the request stays outstanding.
    #[error("Invalid casualty selection: {0}")]
    InvalidCasualtySelection(String),

    /// Undo was refused.
    #[error("Cannot undo action {action}: {reason}")]
    UndoNotAllowed {
        /// Ledger index of the action.
        action: usize,
        /// Why the undo was refused.
        reason: String,
    },

    /// A replayed random source disagreed with the recorded log.
    #[error("Replay diverged at draw {index}: {message}")]
    ReplayDivergence {
        /// Index of the draw in the log.
        index: usize,
        /// What did not match.
        message: String,
    },

    /// State hash mismatch when verifying a replay.
    #[error("Desync detected: expected hash {expected_hash}, got {actual_hash}")]
    DesyncDetected {
        /// Hash recorded with the replay.
        expected_hash: u64,
        /// Hash produced by re-running it.
        actual_hash: u64,
    },
}
