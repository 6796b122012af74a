//! Routing orchestrator: reconnects every connection of a moved selection,
//! trying several connection orderings and keeping the best outcome.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::avoidance::AvoidanceMap;
use super::cancel::CancelToken;
use super::connection::ConnectionData;
use super::search::{PathSearch, SearchOutcome, SearchPlan};
use crate::circuit::{Circuit, ReplacementMap, Selection, Wire};
use crate::core::RouterConfig;
use crate::geom::GridPoint;
use crate::result::{Completion, MoveRequest, MoveResult};

/// Outcome of routing all candidates in one ordering
#[derive(Debug)]
struct TryOutcome {
    replacements: ReplacementMap,
    unsatisfied: Vec<usize>,
    cost: i32,
}

impl TryOutcome {
    /// Fewer unsatisfied connections first, then lower cost
    fn is_better_than(&self, other: &TryOutcome) -> bool {
        (self.unsatisfied.len(), self.cost) < (other.unsatisfied.len(), other.cost)
    }
}

/// Computes the [`MoveResult`] of one move request.
pub struct Connector<'a> {
    circuit: &'a Circuit,
    selection: &'a Selection,
    connections: &'a [ConnectionData],
    fixed: &'a AvoidanceMap,
    config: &'a RouterConfig,
    cancel: &'a CancelToken,
}

impl<'a> Connector<'a> {
    /// `fixed` is the avoidance map of every unselected element.
    pub fn new(
        circuit: &'a Circuit,
        selection: &'a Selection,
        connections: &'a [ConnectionData],
        fixed: &'a AvoidanceMap,
        config: &'a RouterConfig,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            circuit,
            selection,
            connections,
            fixed,
            config,
            cancel,
        }
    }

    pub fn compute(&self, request: MoveRequest) -> MoveResult {
        let MoveRequest { dx, dy, .. } = request;
        let started = Instant::now();
        let deadline = started + self.config.time_budget();

        let (candidates, impossible) = self.prune(dx, dy);
        if !impossible.is_empty() {
            debug!(
                "{} connection(s) cannot reach their destination for move ({}, {})",
                impossible.len(),
                dx,
                dy
            );
        }

        let plans = self.plans(&candidates, dx, dy);

        let tries = self.try_count(plans.len());
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut best: Option<TryOutcome> = None;
        let mut cancelled = false;
        for attempt in 0..tries {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Time budget exhausted after {} of {} tries for move ({}, {})",
                    attempt, tries, dx, dy
                );
                break;
            }

            let mut order: Vec<usize> = (0..plans.len()).collect();
            match attempt {
                0 => self.sort_by_projection(&mut order, &plans, dx, dy),
                1 => {
                    self.sort_by_projection(&mut order, &plans, dx, dy);
                    order.reverse();
                }
                _ => order.shuffle(&mut rng),
            }

            let Some(outcome) = self.try_order(&order, &plans, dx, dy, deadline) else {
                cancelled = true;
                break;
            };
            debug!(
                "Try {} for move ({}, {}): {} unsatisfied, cost {}",
                attempt,
                dx,
                dy,
                outcome.unsatisfied.len(),
                outcome.cost
            );
            if best.as_ref().map_or(true, |b| outcome.is_better_than(b)) {
                best = Some(outcome);
            }
        }

        let completion = if cancelled {
            Completion::Cancelled
        } else {
            Completion::Complete
        };
        let (replacements, mut unsatisfied, cost) = match best {
            Some(outcome) => (outcome.replacements, outcome.unsatisfied, outcome.cost),
            None => (ReplacementMap::new(), candidates, 0),
        };
        unsatisfied.extend(impossible);
        unsatisfied.sort_unstable();

        info!(
            "Move ({}, {}) routed in {:?}: {} connection(s), {} unsatisfied, cost {}{}",
            dx,
            dy,
            started.elapsed(),
            self.connections.len(),
            unsatisfied.len(),
            cost,
            if cancelled { " (cancelled)" } else { "" }
        );
        let unsatisfied = unsatisfied
            .into_iter()
            .map(|i| self.connections[i].clone())
            .collect();
        MoveResult::new(request, replacements, unsatisfied, cost, completion)
    }

    /// Split connections into candidates and those whose destination is
    /// already marked by a fixed element other than their own trail.
    fn prune(&self, dx: i32, dy: i32) -> (Vec<usize>, Vec<usize>) {
        let mut candidates = Vec::new();
        let mut impossible = Vec::new();
        for (i, conn) in self.connections.iter().enumerate() {
            let dest = conn.destination(dx, dy);
            if !self.fixed.is_free(dest) && !conn.trail_contains(dest) {
                impossible.push(i);
            } else {
                candidates.push(i);
            }
        }
        (candidates, impossible)
    }

    fn plans(&self, candidates: &[usize], dx: i32, dy: i32) -> Vec<(usize, SearchPlan)> {
        let selection_avoid = AvoidanceMap::from_elements(self.selection.elements(self.circuit), dx, dy);
        candidates
            .iter()
            .map(|&i| (i, SearchPlan::new(&self.connections[i], dx, dy, &selection_avoid)))
            .collect()
    }

    fn try_count(&self, candidates: usize) -> usize {
        match candidates {
            0 => 0,
            1 => 1,
            2 => 2,
            3 => 8,
            _ => self.config.max_ordering_tries,
        }
    }

    /// Order by anchor position projected onto the move vector
    fn sort_by_projection(&self, order: &mut [usize], plans: &[(usize, SearchPlan)], dx: i32, dy: i32) {
        order.sort_by_key(|&slot| {
            let anchor = self.connections[plans[slot].0].anchor();
            anchor.x as i64 * dx as i64 + anchor.y as i64 * dy as i64
        });
    }

    /// Route candidates in `order`; `None` when cancelled mid-try.
    ///
    /// Once `deadline` passes, the remaining candidates are left unsatisfied
    /// without being searched.
    fn try_order(
        &self,
        order: &[usize],
        plans: &[(usize, SearchPlan)],
        dx: i32,
        dy: i32,
        deadline: Instant,
    ) -> Option<TryOutcome> {
        let mut avoid = self.fixed.clone();
        avoid.mark_all(self.selection.elements(self.circuit), dx, dy);

        let mut replacements = ReplacementMap::new();
        let mut unsatisfied = Vec::new();
        let mut cost = 0;
        let mut skipped = 0;
        for &slot in order {
            if self.cancel.is_cancelled() {
                return None;
            }
            let (index, plan) = &plans[slot];
            if Instant::now() >= deadline {
                unsatisfied.push(*index);
                skipped += 1;
                continue;
            }
            let conn = &self.connections[*index];
            let mut search = PathSearch::new(
                conn,
                conn.destination(dx, dy),
                &plan.trail_points,
                self.config,
                self.cancel,
            );
            match search.run(&plan.starts, &avoid) {
                SearchOutcome::Found(route) => {
                    cost += route.cost;
                    apply_route(&route.path, conn, plan, &mut avoid, &mut replacements);
                }
                SearchOutcome::NotFound => unsatisfied.push(*index),
                SearchOutcome::Aborted => return None,
            }
        }
        if skipped > 0 {
            warn!(
                "Time budget exhausted mid-try for move ({}, {}): {} connection(s) not searched",
                dx, dy, skipped
            );
        }
        Some(TryOutcome {
            replacements,
            unsatisfied,
            cost,
        })
    }
}

/// Turn a found path into wire edits and record them in `avoid`.
///
/// A path starting on the trail cuts the trail there: wires between the cut
/// and the anchor are removed and the wire holding the cut is shortened.
fn apply_route(
    path: &[GridPoint],
    conn: &ConnectionData,
    plan: &SearchPlan,
    avoid: &mut AvoidanceMap,
    replacements: &mut ReplacementMap,
) {
    let Some(&loc0) = path.first() else {
        return;
    };
    if loc0 != conn.anchor() {
        let mut found = loc0 == conn.trail_start();
        let mut path_loc = conn.trail_start();
        for wire in conn.trail().iter().rev() {
            let Some(next_loc) = wire.other_end(path_loc) else {
                panic!("malformed wire trail: {} does not end at {}", wire, path_loc);
            };
            if found {
                avoid.unmark_wire(wire, next_loc, &plan.trail_points);
                replacements.remove(*wire);
            } else if wire.contains(loc0) {
                found = true;
                if loc0 != next_loc {
                    avoid.unmark_wire(wire, next_loc, &plan.trail_points);
                    let shortened = Wire::new(path_loc, loc0);
                    replacements.replace(*wire, shortened);
                    avoid.mark_wire(&shortened, 0, 0);
                }
            }
            path_loc = next_loc;
        }
    }

    for pair in path.windows(2) {
        let wire = Wire::new(pair[0], pair[1]);
        replacements.add(wire);
        avoid.mark_wire(&wire, 0, 0);
    }
}
