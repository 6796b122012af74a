//! Best-first path search on the routing grid.
//!
//! The search state is a location plus the direction of arrival, so turns
//! can be priced. Nodes live in an arena and point back at their parent by
//! index; the open list is a binary heap ordered by estimated total cost,
//! with ties broken by insertion order.

use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::trace;

use super::avoidance::{Allowance, AvoidanceMap};
use super::cancel::CancelToken;
use super::connection::ConnectionData;
use crate::core::RouterConfig;
use crate::geom::{Direction, GridPoint, PITCH};

/// Cost of one grid step
const STEP_COST: i32 = PITCH;
/// Cost of one grid step that keeps extending the wire leaving the anchor
const EXTEND_STEP_COST: i32 = PITCH - 1;

/// A node the search may begin from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartNode {
    pub location: GridPoint,
    pub direction: Option<Direction>,
}

/// Where a connection's search may start, and which trail points it may
/// pass through freely on its first step.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub starts: Vec<StartNode>,
    pub trail_points: FxHashSet<GridPoint>,
}

impl SearchPlan {
    /// Start from the anchor (if the moved selection leaves it free) and
    /// from every trail point the moved selection does not cover.
    pub fn new(conn: &ConnectionData, dx: i32, dy: i32, selection_avoid: &AvoidanceMap) -> Self {
        let anchor = conn.anchor();
        let destination = conn.destination(dx, dy);
        let mut starts = Vec::new();
        let mut trail_points = FxHashSet::default();

        if selection_avoid.is_free(anchor) {
            let direction = conn
                .preferred_direction()
                .unwrap_or_else(|| Direction::dominant(dx, dy));
            trail_points.insert(anchor);
            starts.push(StartNode {
                location: anchor,
                direction: Some(direction),
            });
        }

        for wire in conn.trail().iter().rev() {
            for loc in wire.points() {
                if !selection_avoid.is_free(loc) && loc != destination {
                    continue;
                }
                if !trail_points.insert(loc) {
                    continue;
                }
                // At a wire end, leave heading away from the wire
                let direction = wire.other_end(loc).map(|other| {
                    if wire.is_vertical() {
                        if loc.y < other.y {
                            Direction::North
                        } else {
                            Direction::South
                        }
                    } else if loc.x < other.x {
                        Direction::West
                    } else {
                        Direction::East
                    }
                });
                starts.push(StartNode {
                    location: loc,
                    direction,
                });
            }
        }

        Self {
            starts,
            trail_points,
        }
    }
}

/// A found path: waypoints at the start, every turn, and the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: Vec<GridPoint>,
    pub cost: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(Route),
    NotFound,
    Aborted,
}

#[derive(Debug, Clone, Copy)]
struct SearchNode {
    location: GridPoint,
    direction: Option<Direction>,
    distance: i32,
    estimate: i32,
    extends_wire: bool,
    previous: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    estimate: i32,
    node: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on estimate; earlier nodes first on ties
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One search for one connection's destination
pub struct PathSearch<'a> {
    connection: &'a ConnectionData,
    destination: GridPoint,
    trail_points: &'a FxHashSet<GridPoint>,
    config: &'a RouterConfig,
    cancel: &'a CancelToken,
    arena: Vec<SearchNode>,
}

impl<'a> PathSearch<'a> {
    pub fn new(
        connection: &'a ConnectionData,
        destination: GridPoint,
        trail_points: &'a FxHashSet<GridPoint>,
        config: &'a RouterConfig,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            connection,
            destination,
            trail_points,
            config,
            cancel,
            arena: Vec::new(),
        }
    }

    pub fn run(&mut self, starts: &[StartNode], avoid: &AvoidanceMap) -> SearchOutcome {
        self.arena.clear();
        let mut open = BinaryHeap::new();
        for start in starts {
            let extends_wire = start.direction.is_some();
            let node = SearchNode {
                location: start.location,
                direction: start.direction,
                distance: 0,
                estimate: self.heuristic(start.location, start.direction, extends_wire),
                extends_wire,
                previous: None,
            };
            open.push(self.push_node(node));
        }

        let mut visited: FxHashSet<(GridPoint, Option<Direction>)> = FxHashSet::default();
        let poll = self.config.abort_poll_interval.max(1);
        let mut iterations = 0usize;

        while let Some(entry) = open.pop() {
            if iterations >= self.config.max_search_iterations {
                trace!(
                    "Search for {} gave up after {} iterations",
                    self.destination,
                    iterations
                );
                return SearchOutcome::NotFound;
            }
            iterations += 1;
            if iterations % poll == 0 && self.cancel.is_cancelled() {
                return SearchOutcome::Aborted;
            }

            let index = entry.node;
            let node = self.arena[index];
            if node.location == self.destination {
                return SearchOutcome::Found(Route {
                    path: self.backtrace(index),
                    cost: node.distance,
                });
            }
            if !visited.insert((node.location, node.direction)) {
                continue;
            }

            let allowed = if node.previous.is_none() && self.trail_points.contains(&node.location) {
                None
            } else {
                avoid.get(node.location)
            };
            let (dir, count) = match (allowed, node.direction) {
                (Some(Allowance::Blocked), _) => (Direction::North, 0),
                (Some(Allowance::AllowVertical), None) => (Direction::North, 2),
                (Some(Allowance::AllowVertical), Some(d)) => (d, usize::from(d.is_vertical())),
                (Some(Allowance::AllowHorizontal), None) => (Direction::East, 2),
                (Some(Allowance::AllowHorizontal), Some(d)) => (d, usize::from(d.is_horizontal())),
                (None, None) => (Direction::North, 4),
                (None, Some(d)) => (d, 3),
            };
            let crossing = allowed.is_some();
            for i in 0..count {
                let move_dir = match i {
                    0 => dir,
                    1 if count == 2 => dir.reverse(),
                    1 => dir.left(),
                    2 => dir.right(),
                    _ => dir.reverse(),
                };
                if let Some(next) = self.successor(index, move_dir, crossing) {
                    if !visited.contains(&(next.location, next.direction)) {
                        open.push(self.push_node(next));
                    }
                }
            }
        }
        SearchOutcome::NotFound
    }

    fn push_node(&mut self, node: SearchNode) -> OpenEntry {
        self.arena.push(node);
        OpenEntry {
            estimate: node.estimate,
            node: self.arena.len() - 1,
        }
    }

    fn successor(&self, parent: usize, move_dir: Direction, crossing: bool) -> Option<SearchNode> {
        let from = self.arena[parent];
        let location = from.location.step(move_dir, PITCH);
        if !location.is_on_canvas() {
            return None;
        }
        let extends_wire =
            from.extends_wire && Some(move_dir) == self.connection.preferred_direction();
        let mut distance = from.distance + if extends_wire { EXTEND_STEP_COST } else { STEP_COST };
        if crossing {
            distance += self.config.crossing_penalty;
        }
        if from.direction != Some(move_dir) {
            distance += self.config.turn_penalty;
        }
        Some(SearchNode {
            location,
            direction: Some(move_dir),
            distance,
            estimate: distance + self.heuristic(location, Some(move_dir), extends_wire),
            extends_wire,
            previous: Some(parent),
        })
    }

    /// Lower bound on the remaining cost from `loc` arriving in `dir`
    fn heuristic(&self, loc: GridPoint, dir: Option<Direction>, extends_wire: bool) -> i32 {
        let dx = self.destination.x - loc.x;
        let dy = self.destination.y - loc.y;
        let turn = self.config.turn_penalty;

        let extended = if extends_wire {
            match dir {
                Some(Direction::East) if dx > 0 => Some(dx / PITCH * EXTEND_STEP_COST + dy.abs()),
                Some(Direction::West) if dx < 0 => Some(-dx / PITCH * EXTEND_STEP_COST + dy.abs()),
                Some(Direction::South) if dy > 0 => Some(dx.abs() + dy / PITCH * EXTEND_STEP_COST),
                Some(Direction::North) if dy < 0 => Some(dx.abs() - dy / PITCH * EXTEND_STEP_COST),
                _ => None,
            }
        } else {
            None
        };
        let mut estimate = extended.unwrap_or(dx.abs() + dy.abs());

        let behind = match dir {
            Some(Direction::East) => dx < 0,
            Some(Direction::West) => dx > 0,
            Some(Direction::South) => dy < 0,
            Some(Direction::North) => dy > 0,
            None => {
                if dx != 0 || dy != 0 {
                    estimate += turn;
                }
                false
            }
        };
        if behind {
            estimate += 2 * turn;
        } else if dx != 0 && dy != 0 {
            estimate += turn;
        }
        estimate
    }

    /// Waypoints from the start node to `last`, keeping only turn points.
    fn backtrace(&self, last: usize) -> Vec<GridPoint> {
        let mut next = self.arena[last];
        let mut path = vec![next.location];
        while let Some(index) = next.previous {
            let prev = self.arena[index];
            if prev.direction != next.direction {
                path.push(prev.location);
            }
            next = prev;
        }
        if path.last() != Some(&next.location) {
            path.push(next.location);
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Wire;

    fn p(x: i32, y: i32) -> GridPoint {
        GridPoint::new(x, y)
    }

    fn search(
        conn: &ConnectionData,
        destination: GridPoint,
        starts: &[StartNode],
        avoid: &AvoidanceMap,
    ) -> SearchOutcome {
        let config = RouterConfig::default();
        let cancel = CancelToken::new();
        let trail_points: FxHashSet<GridPoint> = starts.iter().map(|s| s.location).collect();
        PathSearch::new(conn, destination, &trail_points, &config, &cancel).run(starts, avoid)
    }

    fn start(x: i32, y: i32, direction: Option<Direction>) -> StartNode {
        StartNode {
            location: p(x, y),
            direction,
        }
    }

    #[test]
    fn test_straight_extension_costs_less() {
        let conn = ConnectionData::new(p(100, 100), Some(Direction::East), vec![Wire::new(p(50, 100), p(100, 100))], p(50, 100));
        let outcome = search(&conn, p(120, 100), &[start(100, 100, Some(Direction::East))], &AvoidanceMap::new());
        assert_eq!(
            outcome,
            SearchOutcome::Found(Route {
                path: vec![p(100, 100), p(120, 100)],
                cost: 2 * EXTEND_STEP_COST,
            })
        );
    }

    #[test]
    fn test_straight_move_without_preference() {
        let conn = ConnectionData::new(p(100, 100), None, vec![], p(100, 100));
        let outcome = search(&conn, p(120, 100), &[start(100, 100, Some(Direction::East))], &AvoidanceMap::new());
        match outcome {
            SearchOutcome::Found(route) => {
                assert_eq!(route.path, vec![p(100, 100), p(120, 100)]);
                assert_eq!(route.cost, 20);
            }
            other => panic!("expected a route, got {:?}", other),
        }
    }

    #[test]
    fn test_turn_is_charged_once() {
        let conn = ConnectionData::new(p(0, 0), None, vec![], p(0, 0));
        let outcome = search(&conn, p(30, 20), &[start(0, 0, Some(Direction::East))], &AvoidanceMap::new());
        match outcome {
            SearchOutcome::Found(route) => {
                assert_eq!(route.path.len(), 3);
                assert_eq!(route.path[0], p(0, 0));
                assert_eq!(route.path[2], p(30, 20));
                assert_eq!(route.cost, 50 + RouterConfig::default().turn_penalty);
            }
            other => panic!("expected a route, got {:?}", other),
        }
    }

    #[test]
    fn test_detours_around_blocked_point() {
        let conn = ConnectionData::new(p(0, 20), None, vec![], p(0, 20));
        let mut avoid = AvoidanceMap::new();
        avoid.mark_wire(&Wire::new(p(20, 0), p(20, 40)), 0, 0);
        avoid.mark_wire(&Wire::new(p(10, 20), p(10, 20)), 0, 0);
        let outcome = search(&conn, p(40, 20), &[start(0, 20, Some(Direction::East))], &avoid);
        match outcome {
            SearchOutcome::Found(route) => {
                assert!(!route.path.contains(&p(10, 20)));
                assert_eq!(*route.path.last().unwrap(), p(40, 20));
            }
            other => panic!("expected a route, got {:?}", other),
        }
    }

    #[test]
    fn test_crossing_a_wire_is_penalized() {
        let conn = ConnectionData::new(p(0, 20), None, vec![], p(0, 20));
        let mut avoid = AvoidanceMap::new();
        avoid.mark_wire(&Wire::new(p(20, 0), p(20, 100)), 0, 0);
        let outcome = search(&conn, p(40, 20), &[start(0, 20, Some(Direction::East))], &avoid);
        match outcome {
            SearchOutcome::Found(route) => {
                assert_eq!(route.path, vec![p(0, 20), p(40, 20)]);
                assert_eq!(route.cost, 40 + RouterConfig::default().crossing_penalty);
            }
            other => panic!("expected a route, got {:?}", other),
        }
    }

    #[test]
    fn test_enclosed_destination_is_not_found() {
        let conn = ConnectionData::new(p(0, 0), None, vec![], p(0, 0));
        let mut avoid = AvoidanceMap::new();
        for (x, y) in [(40, 30), (60, 30), (50, 20), (50, 40)] {
            avoid.mark_wire(&Wire::new(p(x, y), p(x, y)), 0, 0);
        }
        let outcome = search(&conn, p(50, 30), &[start(0, 0, Some(Direction::East))], &avoid);
        assert_eq!(outcome, SearchOutcome::NotFound);
    }

    #[test]
    fn test_cancelled_search_aborts() {
        let conn = ConnectionData::new(p(0, 0), None, vec![], p(0, 0));
        let mut avoid = AvoidanceMap::new();
        for (x, y) in [(490, 500), (510, 500), (500, 490), (500, 510)] {
            avoid.mark_wire(&Wire::new(p(x, y), p(x, y)), 0, 0);
        }
        let config = RouterConfig::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let trail_points = FxHashSet::default();
        let outcome = PathSearch::new(&conn, p(500, 500), &trail_points, &config, &cancel)
            .run(&[start(0, 0, None)], &avoid);
        assert_eq!(outcome, SearchOutcome::Aborted);
    }

    #[test]
    fn test_start_on_own_trail_ignores_its_marks() {
        let trail = Wire::new(p(0, 20), p(40, 20));
        let conn = ConnectionData::new(p(40, 20), Some(Direction::East), vec![trail], p(0, 20));
        let mut avoid = AvoidanceMap::new();
        avoid.mark_wire(&trail, 0, 0);
        // (20, 20) is a start on the trail, so its crossing restriction and
        // crossing penalty do not apply to the first step.
        let outcome = search(&conn, p(20, 50), &[start(20, 20, None)], &avoid);
        match outcome {
            SearchOutcome::Found(route) => {
                assert_eq!(route.path, vec![p(20, 20), p(20, 50)]);
                assert_eq!(route.cost, 30 + RouterConfig::default().turn_penalty);
            }
            other => panic!("expected a route, got {:?}", other),
        }
    }

    #[test]
    fn test_search_plan_skips_points_under_selection() {
        let trail = Wire::new(p(100, 100), p(60, 100));
        let conn = ConnectionData::new(p(100, 100), Some(Direction::East), vec![trail], p(60, 100));
        let mut selection_avoid = AvoidanceMap::new();
        selection_avoid.mark_wire(&Wire::new(p(70, 100), p(80, 100)), 0, 0);

        let plan = SearchPlan::new(&conn, -40, 0, &selection_avoid);
        let locations: Vec<GridPoint> = plan.starts.iter().map(|s| s.location).collect();
        assert_eq!(locations, vec![p(100, 100), p(60, 100), p(90, 100)]);
        assert_eq!(plan.starts[0].direction, Some(Direction::East));
        // Fixed end leaves heading west, away from the wire
        assert_eq!(plan.starts[1].direction, Some(Direction::West));
        assert_eq!(plan.starts[2].direction, None);
    }

    #[test]
    fn test_search_plan_keeps_destination_under_selection() {
        let trail = Wire::new(p(100, 100), p(60, 100));
        let conn = ConnectionData::new(p(100, 100), Some(Direction::East), vec![trail], p(60, 100));
        let mut selection_avoid = AvoidanceMap::new();
        selection_avoid.mark_wire(&Wire::new(p(70, 100), p(80, 100)), 0, 0);

        let plan = SearchPlan::new(&conn, -20, 0, &selection_avoid);
        assert!(plan.trail_points.contains(&p(80, 100)));
        assert!(!plan.trail_points.contains(&p(70, 100)));
    }
}
