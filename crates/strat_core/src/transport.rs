//! Transport bookkeeping.
//!
//! The ledger is the single source of truth for "who carries whom":
//! - transport -> manifest (cargo aboard, with the capacity each consumes)
//! - cargo -> transport
//! - transport -> cargo unloaded this turn (still counts against capacity)
//! - cargo loaded onto an allied transport this turn (cannot unload yet)
//!
//! Capacity consumed by manifest plus unloaded-this-turn never exceeds the
//! transport's capacity; every successful [`TransportLedger::load`] keeps
//! that invariant. The ledger stores capacity costs itself so it never needs
//! the unit catalog.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GameError, Result};
use crate::ids::UnitId;

/// How a cargo unit is linked to its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Aboard; `allied` when loaded onto another player's transport this turn.
    Aboard {
        /// Loaded onto an allied transport this turn.
        allied: bool,
    },
    /// Unloaded from the transport this turn.
    Unloaded,
}

/// One ledger entry, as captured by [`TransportLedger::detach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportLink {
    /// Carrying unit.
    pub transport: UnitId,
    /// Carried unit.
    pub cargo: UnitId,
    /// Capacity the cargo consumes.
    pub cost: u32,
    /// Aboard or unloaded.
    pub kind: LinkKind,
}

/// The per-turn part of the ledger, captured before [`TransportLedger::end_turn`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnSnapshot {
    unloaded: BTreeMap<UnitId, BTreeMap<UnitId, u32>>,
    allied_loaded: BTreeSet<UnitId>,
}

/// Who carries whom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportLedger {
    manifests: BTreeMap<UnitId, BTreeMap<UnitId, u32>>,
    carried_by: BTreeMap<UnitId, UnitId>,
    unloaded: BTreeMap<UnitId, BTreeMap<UnitId, u32>>,
    allied_loaded: BTreeSet<UnitId>,
}

impl TransportLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity left on a transport: `capacity - cost(manifest) - cost(unloaded)`.
    #[must_use]
    pub fn available_capacity(&self, transport: UnitId, capacity: u32) -> u32 {
        capacity.saturating_sub(self.used_capacity(transport))
    }

    fn used_capacity(&self, transport: UnitId) -> u32 {
        let aboard: u32 = self
            .manifests
            .get(&transport)
            .map_or(0, |m| m.values().sum());
        let unloaded: u32 = self.unloaded.get(&transport).map_or(0, |m| m.values().sum());
        aboard + unloaded
    }

    /// Put `cargo` aboard `transport`.
    ///
    /// # Errors
    /// Fails if the cargo is already aboard something, is the transport
    /// itself, or does not fit.
    pub fn load(
        &mut self,
        transport: UnitId,
        capacity: u32,
        cargo: UnitId,
        cost: u32,
        allied: bool,
    ) -> Result<()> {
        if cargo == transport {
            return Err(GameError::Transport(format!("{cargo} cannot carry itself")));
        }
        if let Some(current) = self.carried_by.get(&cargo) {
            return Err(GameError::Transport(format!(
                "{cargo} is already carried by {current}"
            )));
        }
        let available = self.available_capacity(transport, capacity);
        if available < cost {
            return Err(GameError::Transport(format!(
                "{transport} has {available} capacity left, {cargo} needs {cost}"
            )));
        }
        self.manifests
            .entry(transport)
            .or_default()
            .insert(cargo, cost);
        self.carried_by.insert(cargo, transport);
        if allied {
            self.allied_loaded.insert(cargo);
        }
        tracing::debug!(%transport, %cargo, cost, allied, "Loaded cargo");
        Ok(())
    }

    /// Take `cargo` off its transport. Returns the transport.
    ///
    /// # Errors
    /// Fails if the cargo is not aboard anything or was loaded onto an
    /// allied transport this turn.
    pub fn unload(&mut self, cargo: UnitId) -> Result<UnitId> {
        let transport = *self
            .carried_by
            .get(&cargo)
            .ok_or_else(|| GameError::Transport(format!("{cargo} is not being transported")))?;
        if self.allied_loaded.contains(&cargo) {
            return Err(GameError::Transport(format!(
                "{cargo} was loaded onto an allied transport this turn"
            )));
        }
        let cost = self.take_from_manifest(transport, cargo)?;
        self.carried_by.remove(&cargo);
        self.unloaded
            .entry(transport)
            .or_default()
            .insert(cargo, cost);
        tracing::debug!(%transport, %cargo, "Unloaded cargo");
        Ok(transport)
    }

    /// Reverse a [`load`](Self::load). Returns the transport.
    ///
    /// # Errors
    /// Fails if the cargo is not aboard anything.
    pub fn undo_load(&mut self, cargo: UnitId) -> Result<UnitId> {
        let transport = self
            .carried_by
            .remove(&cargo)
            .ok_or_else(|| GameError::Transport(format!("{cargo} is not being transported")))?;
        self.take_from_manifest(transport, cargo)?;
        self.allied_loaded.remove(&cargo);
        Ok(transport)
    }

    /// Reverse an [`unload`](Self::unload).
    ///
    /// # Errors
    /// Fails if the cargo was not unloaded from `transport` this turn.
    pub fn undo_unload(&mut self, transport: UnitId, cargo: UnitId) -> Result<()> {
        let cost = self
            .unloaded
            .get_mut(&transport)
            .and_then(|m| m.remove(&cargo))
            .ok_or_else(|| {
                GameError::Transport(format!("{cargo} was not unloaded from {transport}"))
            })?;
        self.prune(transport);
        self.manifests
            .entry(transport)
            .or_default()
            .insert(cargo, cost);
        self.carried_by.insert(cargo, transport);
        Ok(())
    }

    fn take_from_manifest(&mut self, transport: UnitId, cargo: UnitId) -> Result<u32> {
        let cost = self
            .manifests
            .get_mut(&transport)
            .and_then(|m| m.remove(&cargo))
            .ok_or_else(|| {
                GameError::InvariantViolation(format!(
                    "{cargo} maps to {transport} but is missing from its manifest"
                ))
            })?;
        self.prune(transport);
        Ok(cost)
    }

    fn prune(&mut self, transport: UnitId) {
        if self.manifests.get(&transport).is_some_and(BTreeMap::is_empty) {
            self.manifests.remove(&transport);
        }
        if self.unloaded.get(&transport).is_some_and(BTreeMap::is_empty) {
            self.unloaded.remove(&transport);
        }
    }

    /// Check if cargo was loaded onto an allied transport this turn.
    #[must_use]
    pub fn is_loaded_by_ally_this_turn(&self, cargo: UnitId) -> bool {
        self.allied_loaded.contains(&cargo)
    }

    /// Transport currently carrying `cargo`.
    #[must_use]
    pub fn transported_by(&self, cargo: UnitId) -> Option<UnitId> {
        self.carried_by.get(&cargo).copied()
    }

    /// Cargo aboard a transport.
    #[must_use]
    pub fn cargo_of(&self, transport: UnitId) -> Vec<UnitId> {
        self.manifests
            .get(&transport)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Cargo unloaded from a transport this turn.
    #[must_use]
    pub fn unloaded_by(&self, transport: UnitId) -> Vec<UnitId> {
        self.unloaded
            .get(&transport)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Check if a transport has anything aboard.
    #[must_use]
    pub fn is_transporting(&self, transport: UnitId) -> bool {
        self.manifests.contains_key(&transport)
    }

    /// Check if a transport unloaded anything this turn.
    #[must_use]
    pub fn has_unloaded(&self, transport: UnitId) -> bool {
        self.unloaded.contains_key(&transport)
    }

    /// Copy of the per-turn sets.
    #[must_use]
    pub fn turn_snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            unloaded: self.unloaded.clone(),
            allied_loaded: self.allied_loaded.clone(),
        }
    }

    /// Clear the per-turn sets. Manifests are untouched.
    pub fn end_turn(&mut self) {
        self.unloaded.clear();
        self.allied_loaded.clear();
    }

    /// Restore per-turn sets captured by [`turn_snapshot`](Self::turn_snapshot).
    pub fn restore_turn(&mut self, snapshot: &TurnSnapshot) {
        self.unloaded = snapshot.unloaded.clone();
        self.allied_loaded = snapshot.allied_loaded.clone();
    }

    /// Every entry that mentions one of `units`, as transport or as cargo.
    #[must_use]
    pub fn links_of(&self, units: &[UnitId]) -> Vec<TransportLink> {
        let wanted: BTreeSet<UnitId> = units.iter().copied().collect();
        let mut links = Vec::new();

        for (transport, manifest) in &self.manifests {
            for (cargo, cost) in manifest {
                if wanted.contains(transport) || wanted.contains(cargo) {
                    links.push(TransportLink {
                        transport: *transport,
                        cargo: *cargo,
                        cost: *cost,
                        kind: LinkKind::Aboard {
                            allied: self.allied_loaded.contains(cargo),
                        },
                    });
                }
            }
        }
        for (transport, unloaded) in &self.unloaded {
            for (cargo, cost) in unloaded {
                if wanted.contains(transport) || wanted.contains(cargo) {
                    links.push(TransportLink {
                        transport: *transport,
                        cargo: *cargo,
                        cost: *cost,
                        kind: LinkKind::Unloaded,
                    });
                }
            }
        }
        links
    }

    /// Remove every entry that mentions one of `units`, returning what was
    /// removed so [`attach`](Self::attach) can put it back.
    pub fn detach(&mut self, units: &[UnitId]) -> Vec<TransportLink> {
        let links = self.links_of(units);
        for link in &links {
            match link.kind {
                LinkKind::Aboard { .. } => {
                    if let Some(m) = self.manifests.get_mut(&link.transport) {
                        m.remove(&link.cargo);
                    }
                    self.carried_by.remove(&link.cargo);
                    self.allied_loaded.remove(&link.cargo);
                }
                LinkKind::Unloaded => {
                    if let Some(m) = self.unloaded.get_mut(&link.transport) {
                        m.remove(&link.cargo);
                    }
                }
            }
            self.prune(link.transport);
        }
        links
    }

    /// Re-insert links captured by [`detach`](Self::detach).
    ///
    /// # Errors
    /// Fails if a cargo unit is already aboard something else.
    pub fn attach(&mut self, links: &[TransportLink]) -> Result<()> {
        for link in links {
            match link.kind {
                LinkKind::Aboard { allied } => {
                    if self.carried_by.contains_key(&link.cargo) {
                        return Err(GameError::Transport(format!(
                            "{} is already carried",
                            link.cargo
                        )));
                    }
                    self.manifests
                        .entry(link.transport)
                        .or_default()
                        .insert(link.cargo, link.cost);
                    self.carried_by.insert(link.cargo, link.transport);
                    if allied {
                        self.allied_loaded.insert(link.cargo);
                    }
                }
                LinkKind::Unloaded => {
                    self.unloaded
                        .entry(link.transport)
                        .or_default()
                        .insert(link.cargo, link.cost);
                }
            }
        }
        Ok(())
    }

    /// Check internal consistency: every cargo appears in exactly one
    /// manifest and maps back to it.
    ///
    /// # Errors
    /// Returns [`GameError::InvariantViolation`] on the first inconsistency.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for (transport, manifest) in &self.manifests {
            for cargo in manifest.keys() {
                if !seen.insert(*cargo) {
                    return Err(GameError::InvariantViolation(format!(
                        "{cargo} appears in more than one manifest"
                    )));
                }
                if self.carried_by.get(cargo) != Some(transport) {
                    return Err(GameError::InvariantViolation(format!(
                        "{cargo} is aboard {transport} without a back-reference"
                    )));
                }
            }
        }
        if seen.len() != self.carried_by.len() {
            return Err(GameError::InvariantViolation(
                "cargo back-references without manifest entries".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TRANSPORT: UnitId = UnitId(100);

    fn u(id: u32) -> UnitId {
        UnitId::new(id)
    }

    #[test]
    fn test_load_records_both_directions() {
        let mut ledger = TransportLedger::new();
        ledger.load(TRANSPORT, 5, u(1), 2, false).unwrap();

        assert_eq!(ledger.transported_by(u(1)), Some(TRANSPORT));
        assert_eq!(ledger.cargo_of(TRANSPORT), vec![u(1)]);
        assert_eq!(ledger.available_capacity(TRANSPORT, 5), 3);
        assert!(!ledger.is_loaded_by_ally_this_turn(u(1)));
    }

    #[test]
    fn test_already_carrying_is_rejected() {
        let mut ledger = TransportLedger::new();
        ledger.load(TRANSPORT, 5, u(1), 2, false).unwrap();
        assert!(matches!(
            ledger.load(u(101), 5, u(1), 2, false),
            Err(GameError::Transport(_))
        ));
    }

    #[test]
    fn test_over_capacity_is_rejected() {
        let mut ledger = TransportLedger::new();
        ledger.load(TRANSPORT, 5, u(1), 3, false).unwrap();
        assert!(ledger.load(TRANSPORT, 5, u(2), 3, false).is_err());
        assert_eq!(ledger.cargo_of(TRANSPORT), vec![u(1)]);
    }

    #[test]
    fn test_unloaded_cargo_still_consumes_capacity() {
        let mut ledger = TransportLedger::new();
        ledger.load(TRANSPORT, 5, u(1), 2, false).unwrap();
        ledger.load(TRANSPORT, 5, u(2), 3, false).unwrap();
        assert_eq!(ledger.unload(u(1)).unwrap(), TRANSPORT);

        assert_eq!(ledger.transported_by(u(1)), None);
        assert_eq!(ledger.unloaded_by(TRANSPORT), vec![u(1)]);
        assert_eq!(ledger.available_capacity(TRANSPORT, 5), 0);

        ledger.end_turn();
        assert_eq!(ledger.available_capacity(TRANSPORT, 5), 2);
        assert_eq!(ledger.cargo_of(TRANSPORT), vec![u(2)]);
    }

    #[test]
    fn test_allied_load_blocks_unload_until_end_of_turn() {
        let mut ledger = TransportLedger::new();
        ledger.load(TRANSPORT, 5, u(1), 2, true).unwrap();
        assert!(ledger.is_loaded_by_ally_this_turn(u(1)));
        assert!(ledger.unload(u(1)).is_err());
        assert_eq!(ledger.transported_by(u(1)), Some(TRANSPORT));

        ledger.end_turn();
        assert!(!ledger.is_loaded_by_ally_this_turn(u(1)));
        assert!(ledger.unload(u(1)).is_ok());
    }

    #[test]
    fn test_undo_load_and_unload() {
        let mut ledger = TransportLedger::new();
        ledger.load(TRANSPORT, 5, u(1), 2, true).unwrap();
        ledger.undo_load(u(1)).unwrap();
        assert_eq!(ledger, TransportLedger::new());

        ledger.load(TRANSPORT, 5, u(1), 2, false).unwrap();
        let before = ledger.clone();
        ledger.unload(u(1)).unwrap();
        ledger.undo_unload(TRANSPORT, u(1)).unwrap();
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_detach_and_attach_restore_exactly() {
        let mut ledger = TransportLedger::new();
        ledger.load(TRANSPORT, 5, u(1), 2, false).unwrap();
        ledger.load(TRANSPORT, 5, u(2), 3, true).unwrap();
        let before = ledger.clone();

        let links = ledger.detach(&[TRANSPORT]);
        assert_eq!(links.len(), 2);
        assert_eq!(ledger.transported_by(u(1)), None);
        assert!(!ledger.is_transporting(TRANSPORT));

        ledger.attach(&links).unwrap();
        assert_eq!(ledger, before);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_turn_snapshot_round_trip() {
        let mut ledger = TransportLedger::new();
        ledger.load(TRANSPORT, 5, u(1), 2, false).unwrap();
        ledger.unload(u(1)).unwrap();
        let snapshot = ledger.turn_snapshot();
        let before = ledger.clone();
        ledger.end_turn();
        ledger.restore_turn(&snapshot);
        assert_eq!(ledger, before);
    }

    proptest! {
        #[test]
        fn prop_capacity_formula_holds(
            capacity in 0u32..12,
            costs in proptest::collection::vec(1u32..4, 0..8),
            unload_mask in proptest::collection::vec(any::<bool>(), 8),
        ) {
            let mut ledger = TransportLedger::new();
            let mut aboard = 0u32;
            let mut loaded = Vec::new();
            for (i, cost) in costs.iter().enumerate() {
                let cargo = u(i as u32);
                if ledger.load(TRANSPORT, capacity, cargo, *cost, false).is_ok() {
                    aboard += cost;
                    loaded.push((cargo, *cost));
                }
            }
            let mut unloaded = 0u32;
            for ((cargo, cost), unload) in loaded.iter().zip(unload_mask) {
                if unload {
                    ledger.unload(*cargo).unwrap();
                    aboard -= cost;
                    unloaded += cost;
                }
            }
            prop_assert!(aboard + unloaded <= capacity);
            prop_assert_eq!(
                ledger.available_capacity(TRANSPORT, capacity),
                capacity - aboard - unloaded
            );
            prop_assert!(ledger.check_invariants().is_ok());
        }
    }
}
