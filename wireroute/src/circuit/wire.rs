use serde::Serialize;
use std::fmt;

use crate::core::RouteError;
use crate::geom::{GridPoint, PITCH};

/// An orthogonal wire segment, normalized so that `end0 <= end1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Wire {
    end0: GridPoint,
    end1: GridPoint,
}

impl Wire {
    /// Create a wire between two points.
    ///
    /// # Panics
    ///
    /// Panics if the points are not on a common row or column. A diagonal
    /// wire means the circuit model is corrupt; use [`Wire::try_new`] for
    /// untrusted input.
    pub fn new(a: GridPoint, b: GridPoint) -> Self {
        match Self::try_new(a, b) {
            Ok(wire) => wire,
            Err(_) => panic!("diagonal wires not supported: {} -> {}", a, b),
        }
    }

    pub fn try_new(a: GridPoint, b: GridPoint) -> Result<Self, RouteError> {
        if a.x != b.x && a.y != b.y {
            return Err(RouteError::DiagonalWire { from: a, to: b });
        }
        let (end0, end1) = if a <= b { (a, b) } else { (b, a) };
        Ok(Self { end0, end1 })
    }

    pub fn end0(&self) -> GridPoint {
        self.end0
    }

    pub fn end1(&self) -> GridPoint {
        self.end1
    }

    pub fn is_vertical(&self) -> bool {
        self.end0.x == self.end1.x
    }

    pub fn is_horizontal(&self) -> bool {
        self.end0.y == self.end1.y
    }

    pub fn length(&self) -> i32 {
        self.end0.manhattan_distance(&self.end1)
    }

    pub fn ends_at(&self, p: GridPoint) -> bool {
        self.end0 == p || self.end1 == p
    }

    /// The end opposite `p`, or `None` when `p` is not an end of this wire
    pub fn other_end(&self, p: GridPoint) -> Option<GridPoint> {
        if p == self.end0 {
            Some(self.end1)
        } else if p == self.end1 {
            Some(self.end0)
        } else {
            None
        }
    }

    /// Whether `p` lies on the segment, ends included
    pub fn contains(&self, p: GridPoint) -> bool {
        if self.is_vertical() {
            p.x == self.end0.x && p.y >= self.end0.y && p.y <= self.end1.y
        } else {
            p.y == self.end0.y && p.x >= self.end0.x && p.x <= self.end1.x
        }
    }

    /// Grid points from `end0` to `end1` at pitch spacing, ends included
    pub fn points(&self) -> impl Iterator<Item = GridPoint> {
        let start = self.end0;
        let (ux, uy) = if self.is_vertical() { (0, 1) } else { (1, 0) };
        let count = self.length() / PITCH;
        (0..=count).map(move |i| start.translate(ux * i * PITCH, uy * i * PITCH))
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            end0: self.end0.translate(dx, dy),
            end1: self.end1.translate(dx, dy),
        }
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.end0, self.end1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> GridPoint {
        GridPoint::new(x, y)
    }

    #[test]
    fn test_wire_is_normalized() {
        let w = Wire::new(p(40, 10), p(10, 10));
        assert_eq!(w.end0(), p(10, 10));
        assert_eq!(w.end1(), p(40, 10));
        assert_eq!(w, Wire::new(p(10, 10), p(40, 10)));
        assert!(w.is_horizontal());
        assert!(!w.is_vertical());
    }

    #[test]
    fn test_points_step_by_pitch() {
        let w = Wire::new(p(20, 10), p(20, 40));
        let pts: Vec<_> = w.points().collect();
        assert_eq!(pts, vec![p(20, 10), p(20, 20), p(20, 30), p(20, 40)]);
    }

    #[test]
    fn test_contains_and_other_end() {
        let w = Wire::new(p(0, 50), p(30, 50));
        assert!(w.contains(p(20, 50)));
        assert!(w.contains(p(0, 50)));
        assert!(!w.contains(p(40, 50)));
        assert!(!w.contains(p(20, 60)));
        assert_eq!(w.other_end(p(0, 50)), Some(p(30, 50)));
        assert_eq!(w.other_end(p(10, 50)), None);
    }

    #[test]
    fn test_try_new_rejects_diagonal() {
        let err = Wire::try_new(p(0, 0), p(10, 10)).unwrap_err();
        assert!(matches!(err, RouteError::DiagonalWire { .. }));
    }

    #[test]
    #[should_panic(expected = "diagonal wires not supported")]
    fn test_new_panics_on_diagonal() {
        let _ = Wire::new(p(0, 0), p(10, 20));
    }
}
