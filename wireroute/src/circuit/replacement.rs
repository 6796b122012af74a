use std::collections::{BTreeMap, BTreeSet};

use super::wire::Wire;

/// Wire edits produced by a move, applied atomically by the circuit owner.
///
/// Every old wire maps to the set of wires that replace it; an empty set
/// means the wire is simply removed. Wires with no predecessor are pure
/// additions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementMap {
    replaced: BTreeMap<Wire, BTreeSet<Wire>>,
    added: BTreeSet<Wire>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, wire: Wire) {
        self.added.insert(wire);
    }

    pub fn remove(&mut self, wire: Wire) {
        self.replaced.insert(wire, BTreeSet::new());
    }

    pub fn replace(&mut self, old: Wire, new: Wire) {
        self.replaced.insert(old, BTreeSet::from([new]));
    }

    pub fn is_empty(&self) -> bool {
        self.replaced.is_empty() && self.added.is_empty()
    }

    /// Wires added without replacing anything
    pub fn additions(&self) -> impl Iterator<Item = &Wire> {
        self.added.iter()
    }

    /// Wires removed without a successor
    pub fn removals(&self) -> impl Iterator<Item = &Wire> {
        self.replaced
            .iter()
            .filter(|(_, new)| new.is_empty())
            .map(|(old, _)| old)
    }

    /// Old wire to successor wires, for wires that are not simply removed
    pub fn replacements(&self) -> impl Iterator<Item = (&Wire, &BTreeSet<Wire>)> {
        self.replaced.iter().filter(|(_, new)| !new.is_empty())
    }

    /// Every wire that leaves the circuit
    pub fn wires_to_remove(&self) -> BTreeSet<Wire> {
        self.replaced.keys().copied().collect()
    }

    /// Every wire that enters the circuit
    pub fn wires_to_add(&self) -> BTreeSet<Wire> {
        self.added
            .iter()
            .chain(self.replaced.values().flatten())
            .copied()
            .collect()
    }
}
