use serde::{Deserialize, Serialize};

use crate::geom::{Bounds, GridPoint};

/// Exact outline of a part inside its bounding box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// The bounding box itself
    Rect,
    /// A closed polygon; points on its edges count as inside
    Polygon(Vec<GridPoint>),
}

/// A non-wire circuit element: a footprint plus the pins it exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    pub bounds: Bounds,
    pub shape: Shape,
    pub pins: Vec<GridPoint>,
}

impl Part {
    pub fn rect(name: impl Into<String>, bounds: Bounds, pins: Vec<GridPoint>) -> Self {
        Self {
            name: name.into(),
            bounds,
            shape: Shape::Rect,
            pins,
        }
    }

    /// A part outlined by `vertices`; the bounds are the enclosing box.
    pub fn polygon(name: impl Into<String>, vertices: Vec<GridPoint>, pins: Vec<GridPoint>) -> Self {
        let bounds = Bounds::enclosing(&vertices).unwrap_or(Bounds::new(0, 0, 0, 0));
        Self {
            name: name.into(),
            bounds,
            shape: Shape::Polygon(vertices),
            pins,
        }
    }

    /// Exact containment: the box check first, then the outline.
    pub fn contains(&self, p: GridPoint) -> bool {
        if !self.bounds.contains(p) {
            return false;
        }
        match &self.shape {
            Shape::Rect => true,
            Shape::Polygon(vertices) => polygon_contains(vertices, p),
        }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        let shape = match &self.shape {
            Shape::Rect => Shape::Rect,
            Shape::Polygon(vertices) => {
                Shape::Polygon(vertices.iter().map(|v| v.translate(dx, dy)).collect())
            }
        };
        Self {
            name: self.name.clone(),
            bounds: self.bounds.translate(dx, dy),
            shape,
            pins: self.pins.iter().map(|p| p.translate(dx, dy)).collect(),
        }
    }
}

fn on_segment(a: GridPoint, b: GridPoint, p: GridPoint) -> bool {
    let cross = (b.x - a.x) as i64 * (p.y - a.y) as i64 - (b.y - a.y) as i64 * (p.x - a.x) as i64;
    cross == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Even-odd test with edges counted as inside
fn polygon_contains(vertices: &[GridPoint], p: GridPoint) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (vertices[i], vertices[j]);
        if on_segment(a, b, p) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let lhs = (p.x - a.x) as i64 * (b.y - a.y) as i64;
            let rhs = (b.x - a.x) as i64 * (p.y - a.y) as i64;
            let crosses = if b.y > a.y { lhs < rhs } else { lhs > rhs };
            if crosses {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
