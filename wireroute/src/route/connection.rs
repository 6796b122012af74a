//! Connection extraction
//!
//! Finds every selection end that touches something outside the selection,
//! together with the chain of unselected wires leading away from it. That
//! chain (the trail) may be cut short or rerouted when the selection moves.

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::circuit::{Circuit, Element, ElementId, Selection, Wire};
use crate::geom::{Direction, GridPoint};

/// One attachment between the selection and the fixed circuit.
///
/// `trail` runs outward from `anchor`: the first wire ends at the anchor,
/// consecutive wires share an end, and the last wire ends at `trail_start`.
/// With an empty trail, `trail_start` equals `anchor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionData {
    anchor: GridPoint,
    preferred_direction: Option<Direction>,
    trail: Vec<Wire>,
    trail_start: GridPoint,
}

impl ConnectionData {
    /// # Panics
    ///
    /// Panics if the trail is not a contiguous chain from `anchor` to
    /// `trail_start`.
    pub fn new(
        anchor: GridPoint,
        preferred_direction: Option<Direction>,
        trail: Vec<Wire>,
        trail_start: GridPoint,
    ) -> Self {
        check_trail(anchor, &trail, trail_start);
        Self {
            anchor,
            preferred_direction,
            trail,
            trail_start,
        }
    }

    /// Selection end before the move
    pub fn anchor(&self) -> GridPoint {
        self.anchor
    }

    /// Where the anchor lands after moving by (dx, dy)
    pub fn destination(&self, dx: i32, dy: i32) -> GridPoint {
        self.anchor.translate(dx, dy)
    }

    pub fn preferred_direction(&self) -> Option<Direction> {
        self.preferred_direction
    }

    pub fn trail(&self) -> &[Wire] {
        &self.trail
    }

    /// Fixed end of the trail, farthest from the anchor
    pub fn trail_start(&self) -> GridPoint {
        self.trail_start
    }

    pub fn trail_contains(&self, p: GridPoint) -> bool {
        self.trail.iter().any(|w| w.contains(p))
    }
}

fn check_trail(anchor: GridPoint, trail: &[Wire], trail_start: GridPoint) {
    let mut cur = anchor;
    for wire in trail {
        match wire.other_end(cur) {
            Some(next) => cur = next,
            None => panic!("malformed wire trail: {} does not end at {}", wire, cur),
        }
    }
    if cur != trail_start {
        panic!("malformed wire trail: ends at {} instead of {}", cur, trail_start);
    }
}

/// Every connection of `selection` to the rest of `circuit`, ordered by
/// anchor location.
pub fn compute_connections(circuit: &Circuit, selection: &Selection) -> Vec<ConnectionData> {
    let mut connections = Vec::new();
    for anchor in selection.ends(circuit) {
        let attached = circuit
            .elements_at(anchor)
            .iter()
            .any(|id| !selection.contains(*id));
        if !attached {
            continue;
        }

        let mut trail = Vec::new();
        let mut seen: FxHashSet<ElementId> = FxHashSet::default();
        let mut cur = anchor;
        let mut next = find_wire(circuit, anchor, selection, None);
        while let Some((id, wire)) = next {
            if !seen.insert(id) {
                break;
            }
            let Some(far) = wire.other_end(cur) else {
                break;
            };
            trail.push(wire);
            cur = far;
            if cur == anchor {
                break;
            }
            next = find_wire(circuit, cur, selection, Some(id));
        }

        // Keep extending the wire that already leaves the anchor
        let preferred = trail.first().and_then(|first| {
            let other = first.other_end(anchor)?;
            Some(Direction::dominant(anchor.x - other.x, anchor.y - other.y))
        });
        connections.push(ConnectionData::new(anchor, preferred, trail, cur));
    }
    connections
}

/// The single unselected wire continuing a trail at `loc`.
///
/// `None` when the trail stops there: at a junction of several elements,
/// at a part pin, or at a dead end.
fn find_wire(
    circuit: &Circuit,
    loc: GridPoint,
    selection: &Selection,
    ignore: Option<ElementId>,
) -> Option<(ElementId, Wire)> {
    let mut found = None;
    for &id in circuit.elements_at(loc) {
        if selection.contains(id) || Some(id) == ignore {
            continue;
        }
        match (found, circuit.get(id)) {
            (None, Some(Element::Wire(wire))) => found = Some((id, *wire)),
            _ => return None,
        }
    }
    found
}
