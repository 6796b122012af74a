//! Circuit Model
//!
//! The in-process view of the schematic that the engine reads: parts with
//! footprints and pins, orthogonal wires, and an index from grid points to
//! the elements that end there. The editor owns the circuit; the engine
//! only queries it and hands back a [`ReplacementMap`] to apply.

mod part;
mod replacement;
mod wire;

pub use part::{Part, Shape};
pub use replacement::ReplacementMap;
pub use wire::Wire;

use petgraph::unionfind::UnionFind;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::RouteError;
use crate::geom::GridPoint;

/// Stable identifier of an element within one circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u32);

/// A circuit element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Part(Part),
    Wire(Wire),
}

impl Element {
    /// Points where other elements can attach
    pub fn ends(&self) -> Vec<GridPoint> {
        match self {
            Element::Part(part) => part.pins.clone(),
            Element::Wire(wire) => vec![wire.end0(), wire.end1()],
        }
    }

    pub fn as_wire(&self) -> Option<&Wire> {
        match self {
            Element::Wire(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_part(&self) -> Option<&Part> {
        match self {
            Element::Part(p) => Some(p),
            _ => None,
        }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        match self {
            Element::Part(part) => Element::Part(part.translate(dx, dy)),
            Element::Wire(wire) => Element::Wire(wire.translate(dx, dy)),
        }
    }
}

/// The set of elements being dragged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    ids: BTreeSet<ElementId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ElementId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected elements that still exist in `circuit`
    pub fn elements<'a>(&'a self, circuit: &'a Circuit) -> impl Iterator<Item = &'a Element> + 'a {
        self.ids.iter().filter_map(move |id| circuit.get(*id))
    }

    /// Every end location of the selected elements, in ascending order
    pub fn ends(&self, circuit: &Circuit) -> BTreeSet<GridPoint> {
        self.elements(circuit).flat_map(|e| e.ends()).collect()
    }
}

impl FromIterator<ElementId> for Selection {
    fn from_iter<I: IntoIterator<Item = ElementId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Parts and wires indexed by id and by end location
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    elements: BTreeMap<ElementId, Element>,
    ends: FxHashMap<GridPoint, Vec<ElementId>>,
    wire_index: FxHashMap<Wire, ElementId>,
    next_id: u32,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: Part) -> ElementId {
        let id = self.allocate_id();
        self.insert(id, Element::Part(part));
        id
    }

    /// Add a wire; adding a wire that already exists returns its id.
    pub fn add_wire(&mut self, wire: Wire) -> ElementId {
        if let Some(&id) = self.wire_index.get(&wire) {
            return id;
        }
        let id = self.allocate_id();
        self.insert(id, Element::Wire(wire));
        id
    }

    pub fn remove(&mut self, id: ElementId) -> Option<Element> {
        let element = self.elements.remove(&id)?;
        for end in element.ends() {
            if let Some(ids) = self.ends.get_mut(&end) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.ends.remove(&end);
                }
            }
        }
        if let Element::Wire(wire) = &element {
            self.wire_index.remove(wire);
        }
        Some(element)
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements.iter().map(|(id, e)| (*id, e))
    }

    pub fn wires(&self) -> impl Iterator<Item = &Wire> {
        self.elements.values().filter_map(|e| e.as_wire())
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.elements.values().filter_map(|e| e.as_part())
    }

    /// Elements with an end (wire end or pin) at `p`
    pub fn elements_at(&self, p: GridPoint) -> &[ElementId] {
        self.ends.get(&p).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find_wire(&self, wire: &Wire) -> Option<ElementId> {
        self.wire_index.get(wire).copied()
    }

    /// Translate the selection by (dx, dy) and apply `replacements`.
    ///
    /// Nothing is modified if a selected element or a wire named by the
    /// replacement set is missing.
    pub fn apply_move(
        &mut self,
        selection: &Selection,
        dx: i32,
        dy: i32,
        replacements: &ReplacementMap,
    ) -> Result<(), RouteError> {
        if let Some(missing) = selection.iter().find(|id| !self.elements.contains_key(id)) {
            return Err(RouteError::UnknownElement(format!("#{}", missing.0)));
        }
        let doomed = replacements.wires_to_remove();
        let mut doomed_ids = Vec::with_capacity(doomed.len());
        for wire in &doomed {
            match self.find_wire(wire) {
                Some(id) => doomed_ids.push(id),
                None => {
                    return Err(RouteError::UnknownWire {
                        from: wire.end0(),
                        to: wire.end1(),
                    })
                }
            }
        }

        let moved: Vec<(ElementId, Element)> = selection
            .iter()
            .filter_map(|id| self.remove(id).map(|e| (id, e.translate(dx, dy))))
            .collect();
        for (id, element) in moved {
            self.insert(id, element);
        }
        for id in doomed_ids {
            self.remove(id);
        }
        for wire in replacements.wires_to_add() {
            self.add_wire(wire);
        }
        Ok(())
    }

    /// Whether two points are joined by wiring.
    ///
    /// Wires join at shared ends and where one wire ends on another wire's
    /// interior; two wires merely crossing stay separate.
    pub fn is_connected(&self, a: GridPoint, b: GridPoint) -> bool {
        if a == b {
            return true;
        }
        fn intern(p: GridPoint, index: &mut FxHashMap<GridPoint, usize>) -> usize {
            let next = index.len();
            *index.entry(p).or_insert(next)
        }

        let mut index: FxHashMap<GridPoint, usize> = FxHashMap::default();
        let wires: Vec<&Wire> = self.wires().collect();
        for wire in &wires {
            intern(wire.end0(), &mut index);
            intern(wire.end1(), &mut index);
        }
        let ia = intern(a, &mut index);
        let ib = intern(b, &mut index);

        let mut sets = UnionFind::<usize>::new(index.len());
        for wire in &wires {
            sets.union(index[&wire.end0()], index[&wire.end1()]);
        }
        for wire in &wires {
            let root = index[&wire.end0()];
            for (p, &i) in &index {
                if wire.contains(*p) {
                    sets.union(root, i);
                }
            }
        }
        sets.equiv(ia, ib)
    }

    fn allocate_id(&mut self) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, id: ElementId, element: Element) {
        for end in element.ends() {
            let ids = self.ends.entry(end).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if let Element::Wire(wire) = &element {
            self.wire_index.insert(*wire, id);
        }
        self.elements.insert(id, element);
    }
}
