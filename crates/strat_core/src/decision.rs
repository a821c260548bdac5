//! Questions the engine asks players, and the players who answer them.
//!
//! A battle that needs input suspends with one or more
//! [`DecisionRequest`]s. Whoever drives the battle collects a
//! [`DecisionResponse`] for each request, in any order, and hands it back
//! through [`BattleTracker::resume`](crate::battle::BattleTracker::resume).
//! Move-time confirmations are plain synchronous calls on [`RemotePlayer`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::battle::BattleKey;
use crate::casualty::{CasualtyChoice, CasualtyDetails};
use crate::ids::{PlayerId, TerritoryId, UnitId};

/// Identifies an outstanding request within a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request#{}", self.0)
    }
}

/// What is being asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    /// Pick casualties.
    Casualties(CasualtyChoice),
    /// Retreat to one of `possible`, or stay.
    Retreat {
        /// Territories the attacker may retreat to.
        possible: Vec<TerritoryId>,
    },
    /// Submerge these submarines, or stay.
    Submerge {
        /// Submarines that may submerge.
        units: Vec<UnitId>,
    },
}

/// A question for one player about one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Request id, unique within the battle.
    pub id: RequestId,
    /// Battle asking.
    pub battle: BattleKey,
    /// Player who must answer.
    pub player: PlayerId,
    /// The question.
    pub kind: DecisionKind,
    /// Human-readable prompt.
    pub message: String,
}

/// An answer to a [`DecisionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionResponse {
    /// Chosen casualties.
    Casualties(CasualtyDetails),
    /// Retreat destination, `None` to keep fighting.
    Retreat(Option<TerritoryId>),
    /// Submerge or not.
    Submerge(bool),
}

impl DecisionResponse {
    /// Check if this response answers a request of the given kind.
    #[must_use]
    pub fn answers(&self, kind: &DecisionKind) -> bool {
        matches!(
            (self, kind),
            (Self::Casualties(_), DecisionKind::Casualties(_))
                | (Self::Retreat(_), DecisionKind::Retreat { .. })
                | (Self::Submerge(_), DecisionKind::Submerge { .. })
        )
    }
}

/// A player (human, AI or network peer) that answers the engine.
pub trait RemotePlayer {
    /// Pick casualties for a volley.
    fn select_casualties(&mut self, battle: BattleKey, choice: &CasualtyChoice) -> CasualtyDetails;

    /// Retreat to one of `possible`, or `None` to press on.
    fn retreat_query(&mut self, battle: BattleKey, possible: &[TerritoryId]) -> Option<TerritoryId>;

    /// Submerge the listed submarines?
    fn submerge_query(&mut self, battle: BattleKey, units: &[UnitId]) -> bool;

    /// Move on although AA guns will fire over `territories`?
    fn confirm_move_in_face_of_aa(&mut self, territories: &[TerritoryId]) -> bool;

    /// Bombard `target` from the sea zone `from`?
    fn confirm_shore_bombard(&mut self, from: TerritoryId, target: TerritoryId) -> bool;

    /// Conduct a strategic bombing raid on `target` instead of a normal attack?
    fn should_bomb(&mut self, target: TerritoryId) -> bool;

    /// Answer a battle request by dispatching to the query methods.
    fn answer(&mut self, request: &DecisionRequest) -> DecisionResponse {
        match &request.kind {
            DecisionKind::Casualties(choice) => {
                DecisionResponse::Casualties(self.select_casualties(request.battle, choice))
            }
            DecisionKind::Retreat { possible } => {
                DecisionResponse::Retreat(self.retreat_query(request.battle, possible))
            }
            DecisionKind::Submerge { units } => {
                DecisionResponse::Submerge(self.submerge_query(request.battle, units))
            }
        }
    }
}

/// Takes every default: engine-proposed casualties, never retreats or
/// submerges, accepts AA risk and bombardment, never bombs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlayer;

impl RemotePlayer for DefaultPlayer {
    fn select_casualties(&mut self, _battle: BattleKey, choice: &CasualtyChoice) -> CasualtyDetails {
        choice.default_selection.clone()
    }

    fn retreat_query(&mut self, _battle: BattleKey, _possible: &[TerritoryId]) -> Option<TerritoryId> {
        None
    }

    fn submerge_query(&mut self, _battle: BattleKey, _units: &[UnitId]) -> bool {
        false
    }

    fn confirm_move_in_face_of_aa(&mut self, _territories: &[TerritoryId]) -> bool {
        true
    }

    fn confirm_shore_bombard(&mut self, _from: TerritoryId, _target: TerritoryId) -> bool {
        true
    }

    fn should_bomb(&mut self, _target: TerritoryId) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::BattleType;

    #[test]
    fn test_response_matches_kind() {
        let retreat = DecisionKind::Retreat { possible: Vec::new() };
        assert!(DecisionResponse::Retreat(None).answers(&retreat));
        assert!(!DecisionResponse::Submerge(true).answers(&retreat));
    }

    #[test]
    fn test_default_player_stays_and_fights() {
        let key = BattleKey::new(TerritoryId::new(0), BattleType::Normal);
        let request = DecisionRequest {
            id: RequestId(1),
            battle: key,
            player: PlayerId::new(0),
            kind: DecisionKind::Retreat {
                possible: vec![TerritoryId::new(2)],
            },
            message: "retreat?".into(),
        };
        assert_eq!(DefaultPlayer.answer(&request), DecisionResponse::Retreat(None));
    }
}
