//! Avoidance map: which grid points new wiring may not use, or may only
//! cross in one orientation.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::circuit::{Element, Part, Wire};
use crate::geom::{snap_up, GridPoint, PITCH};

/// Restriction recorded for one grid point; an absent entry means free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Allowance {
    /// Nothing may pass
    Blocked,
    /// Only a vertical wire may cross (a horizontal wire lies here)
    AllowVertical,
    /// Only a horizontal wire may cross (a vertical wire lies here)
    AllowHorizontal,
}

/// Per-point restrictions for new wiring.
///
/// Marks live in a shared, frozen base plus a private overlay, so cloning a
/// frozen map for one speculative try only bumps a reference count.
#[derive(Debug, Clone, Default)]
pub struct AvoidanceMap {
    base: Arc<FxHashMap<GridPoint, Allowance>>,
    overlay: FxHashMap<GridPoint, Option<Allowance>>,
}

impl AvoidanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map of `elements` translated by (dx, dy), frozen for cheap cloning
    pub fn from_elements<'a>(elements: impl IntoIterator<Item = &'a Element>, dx: i32, dy: i32) -> Self {
        let mut map = Self::new();
        map.mark_all(elements, dx, dy);
        map.freeze()
    }

    pub fn get(&self, p: GridPoint) -> Option<Allowance> {
        match self.overlay.get(&p) {
            Some(entry) => *entry,
            None => self.base.get(&p).copied(),
        }
    }

    pub fn is_free(&self, p: GridPoint) -> bool {
        self.get(p).is_none()
    }

    /// Fold the overlay into a new shared base.
    pub fn freeze(self) -> Self {
        if self.overlay.is_empty() {
            return self;
        }
        let mut merged = Arc::unwrap_or_clone(self.base);
        for (p, entry) in self.overlay {
            match entry {
                Some(allowance) => {
                    merged.insert(p, allowance);
                }
                None => {
                    merged.remove(&p);
                }
            }
        }
        Self {
            base: Arc::new(merged),
            overlay: FxHashMap::default(),
        }
    }

    /// Every marked point, in ascending order
    pub fn snapshot(&self) -> BTreeMap<GridPoint, Allowance> {
        let mut out: BTreeMap<GridPoint, Allowance> =
            self.base.iter().map(|(p, a)| (*p, *a)).collect();
        for (p, entry) in &self.overlay {
            match entry {
                Some(allowance) => {
                    out.insert(*p, *allowance);
                }
                None => {
                    out.remove(p);
                }
            }
        }
        out
    }

    pub fn mark_all<'a>(&mut self, elements: impl IntoIterator<Item = &'a Element>, dx: i32, dy: i32) {
        for element in elements {
            match element {
                Element::Wire(wire) => self.mark_wire(wire, dx, dy),
                Element::Part(part) => self.mark_part(part, dx, dy),
            }
        }
    }

    /// Block every grid point covered by `part` translated by (dx, dy).
    pub fn mark_part(&mut self, part: &Part, dx: i32, dy: i32) {
        let translated = dx != 0 || dy != 0;
        let bounds = part.bounds.translate(dx, dy);
        let x0 = snap_up(bounds.x).max(0);
        let y0 = snap_up(bounds.y).max(0);
        let x1 = bounds.x + bounds.width;
        let y1 = bounds.y + bounds.height;
        for x in (x0..=x1).step_by(PITCH as usize) {
            for y in (y0..=y1).step_by(PITCH as usize) {
                let loc = GridPoint::new(x, y);
                // Most points of the box are inside the part; undo the mark
                // for the rare one that is not.
                let prev = self.put(loc, Allowance::Blocked);
                if prev == Some(Allowance::Blocked) {
                    continue;
                }
                let base_loc = if translated { loc.translate(-dx, -dy) } else { loc };
                if !part.contains(base_loc) {
                    match prev {
                        Some(allowance) => {
                            self.put(loc, allowance);
                        }
                        None => {
                            self.take(loc);
                        }
                    }
                }
            }
        }
    }

    /// Block the ends of `wire` translated by (dx, dy) and restrict its
    /// interior to crossings of the other orientation.
    pub fn mark_wire(&mut self, wire: &Wire, dx: i32, dy: i32) {
        let wire = if dx != 0 || dy != 0 {
            wire.translate(dx, dy)
        } else {
            *wire
        };
        self.put(wire.end0(), Allowance::Blocked);
        self.put(wire.end1(), Allowance::Blocked);
        let (own, conflicting) = crossing_marks(&wire);
        for loc in wire.points() {
            let prev = self.put(loc, own);
            if prev == Some(Allowance::Blocked) || prev == Some(conflicting) {
                self.put(loc, Allowance::Blocked);
            }
        }
    }

    /// Undo the marks of `wire` when its `deleted_end` side is removed.
    ///
    /// Only points in `unmarkable` are touched. The retained end stays as it
    /// is: it is shared with the wiring that survives. Interior points where
    /// another wire crosses get that wire's allowance back.
    pub fn unmark_wire(&mut self, wire: &Wire, deleted_end: GridPoint, unmarkable: &FxHashSet<GridPoint>) {
        let Some(kept_end) = wire.other_end(deleted_end) else {
            panic!("{} is not an end of wire {}", deleted_end, wire);
        };
        let (_, conflicting) = crossing_marks(wire);
        for loc in wire.points() {
            if loc == kept_end || !unmarkable.contains(&loc) {
                continue;
            }
            let prev = self.take(loc);
            if loc == deleted_end {
                continue;
            }
            if prev == Some(Allowance::Blocked) || prev == Some(conflicting) {
                self.put(loc, conflicting);
            }
        }
    }

    fn put(&mut self, p: GridPoint, allowance: Allowance) -> Option<Allowance> {
        let prev = self.get(p);
        self.overlay.insert(p, Some(allowance));
        prev
    }

    fn take(&mut self, p: GridPoint) -> Option<Allowance> {
        let prev = self.get(p);
        if prev.is_some() {
            self.overlay.insert(p, None);
        }
        prev
    }
}

/// (mark left by the wire itself, mark left by a wire crossing it)
fn crossing_marks(wire: &Wire) -> (Allowance, Allowance) {
    if wire.is_vertical() {
        (Allowance::AllowHorizontal, Allowance::AllowVertical)
    } else {
        (Allowance::AllowVertical, Allowance::AllowHorizontal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Bounds;

    fn p(x: i32, y: i32) -> GridPoint {
        GridPoint::new(x, y)
    }

    fn all_points(wire: &Wire) -> FxHashSet<GridPoint> {
        wire.points().collect()
    }

    #[test]
    fn test_mark_wire_restricts_interior() {
        let mut map = AvoidanceMap::new();
        map.mark_wire(&Wire::new(p(10, 10), p(10, 50)), 0, 0);
        assert_eq!(map.get(p(10, 10)), Some(Allowance::Blocked));
        assert_eq!(map.get(p(10, 50)), Some(Allowance::Blocked));
        assert_eq!(map.get(p(10, 30)), Some(Allowance::AllowHorizontal));
        assert!(map.is_free(p(20, 30)));
    }

    #[test]
    fn test_crossing_wires_block_the_crossing() {
        let mut map = AvoidanceMap::new();
        map.mark_wire(&Wire::new(p(30, 0), p(30, 60)), 0, 0);
        map.mark_wire(&Wire::new(p(0, 30), p(60, 30)), 0, 0);
        assert_eq!(map.get(p(30, 30)), Some(Allowance::Blocked));
        assert_eq!(map.get(p(30, 20)), Some(Allowance::AllowHorizontal));
        assert_eq!(map.get(p(20, 30)), Some(Allowance::AllowVertical));
    }

    #[test]
    fn test_parallel_overlap_keeps_orientation() {
        let mut map = AvoidanceMap::new();
        map.mark_wire(&Wire::new(p(0, 30), p(60, 30)), 0, 0);
        map.mark_wire(&Wire::new(p(20, 30), p(80, 30)), 0, 0);
        assert_eq!(map.get(p(40, 30)), Some(Allowance::AllowVertical));
        assert_eq!(map.get(p(20, 30)), Some(Allowance::Blocked));
    }

    #[test]
    fn test_mark_wire_translated() {
        let mut map = AvoidanceMap::new();
        map.mark_wire(&Wire::new(p(0, 0), p(40, 0)), 10, 20);
        assert_eq!(map.get(p(10, 20)), Some(Allowance::Blocked));
        assert_eq!(map.get(p(30, 20)), Some(Allowance::AllowVertical));
        assert!(map.is_free(p(20, 0)));
    }

    #[test]
    fn test_mark_part_uses_exact_shape() {
        let mut map = AvoidanceMap::new();
        let triangle = Part::polygon("B1", vec![p(0, 0), p(0, 40), p(40, 20)], vec![]);
        map.mark_part(&triangle, 0, 0);
        assert_eq!(map.get(p(10, 20)), Some(Allowance::Blocked));
        assert!(map.is_free(p(30, 0)));
        assert!(map.is_free(p(30, 30)));
        // Right and bottom edges of the box are outside
        assert!(map.is_free(p(40, 20)));
    }

    #[test]
    fn test_mark_part_restores_previous_mark_outside_shape() {
        let mut map = AvoidanceMap::new();
        map.mark_wire(&Wire::new(p(30, 0), p(30, 60)), 0, 0);
        let triangle = Part::polygon("B1", vec![p(0, 0), p(0, 40), p(40, 20)], vec![]);
        map.mark_part(&triangle, 0, 0);
        assert_eq!(map.get(p(30, 0)), Some(Allowance::Blocked));
        assert_eq!(map.get(p(30, 10)), Some(Allowance::AllowHorizontal));
        assert_eq!(map.get(p(30, 20)), Some(Allowance::Blocked));
    }

    #[test]
    fn test_mark_part_translated_and_clamped() {
        let mut map = AvoidanceMap::new();
        let part = Part::rect("U1", Bounds::new(10, 10, 20, 20), vec![]);
        map.mark_part(&part, -20, 0);
        assert_eq!(map.get(p(0, 10)), Some(Allowance::Blocked));
        assert_eq!(map.get(p(0, 20)), Some(Allowance::Blocked));
        assert!(map.is_free(p(10, 10)));
        assert!(map.snapshot().keys().all(|k| k.x >= 0));
    }

    #[test]
    fn test_mark_then_unmark_restores_map() {
        let mut map = AvoidanceMap::new();
        map.mark_wire(&Wire::new(p(0, 0), p(0, 50)), 0, 0);
        let before = map.snapshot();

        // Attached at (0, 50), the shared end
        let branch = Wire::new(p(0, 50), p(50, 50));
        map.mark_wire(&branch, 0, 0);
        map.unmark_wire(&branch, p(50, 50), &all_points(&branch));

        assert_eq!(map.snapshot(), before);
    }

    #[test]
    fn test_unmark_restores_crossing_wire() {
        let vertical = Wire::new(p(30, 0), p(30, 60));
        let horizontal = Wire::new(p(0, 30), p(60, 30));
        let mut map = AvoidanceMap::new();
        map.mark_wire(&vertical, 0, 0);
        map.mark_wire(&Wire::new(p(0, 0), p(0, 30)), 0, 0);
        let before = map.snapshot();

        map.mark_wire(&horizontal, 0, 0);
        map.unmark_wire(&horizontal, p(60, 30), &all_points(&horizontal));

        assert_eq!(map.get(p(30, 30)), Some(Allowance::AllowHorizontal));
        assert_eq!(map.snapshot(), before);
    }

    #[test]
    fn test_unmark_only_touches_unmarkable_points() {
        let wire = Wire::new(p(0, 10), p(50, 10));
        let mut map = AvoidanceMap::new();
        map.mark_wire(&wire, 0, 0);
        let unmarkable: FxHashSet<GridPoint> = [p(40, 10), p(50, 10)].into_iter().collect();
        map.unmark_wire(&wire, p(50, 10), &unmarkable);
        assert!(map.is_free(p(50, 10)));
        assert!(map.is_free(p(40, 10)));
        assert_eq!(map.get(p(30, 10)), Some(Allowance::AllowVertical));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut fixed = AvoidanceMap::new();
        fixed.mark_wire(&Wire::new(p(0, 0), p(0, 50)), 0, 0);
        let fixed = fixed.freeze();

        let mut scratch = fixed.clone();
        scratch.mark_wire(&Wire::new(p(10, 20), p(60, 20)), 0, 0);
        scratch.take(p(0, 0));

        assert_eq!(fixed.get(p(0, 0)), Some(Allowance::Blocked));
        assert!(fixed.is_free(p(30, 20)));
        assert!(scratch.is_free(p(0, 0)));
        assert_eq!(scratch.get(p(30, 20)), Some(Allowance::AllowVertical));
    }

    #[test]
    fn test_freeze_keeps_contents() {
        let mut map = AvoidanceMap::new();
        map.mark_wire(&Wire::new(p(0, 0), p(30, 0)), 0, 0);
        map.take(p(10, 0));
        let snapshot = map.snapshot();
        let frozen = map.freeze();
        assert_eq!(frozen.snapshot(), snapshot);
        assert!(frozen.is_free(p(10, 0)));
    }
}
