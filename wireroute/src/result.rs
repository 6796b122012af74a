//! Move requests and the results the connector publishes for them.

use serde::Serialize;
use uuid::Uuid;

use crate::circuit::{ReplacementMap, Wire};
use crate::geom::GridPoint;
use crate::route::ConnectionData;

/// One candidate offset of one gesture; the key of the result cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MoveRequest {
    pub gesture_id: Uuid,
    pub dx: i32,
    pub dy: i32,
}

impl MoveRequest {
    pub fn new(gesture_id: Uuid, dx: i32, dy: i32) -> Self {
        Self { gesture_id, dx, dy }
    }
}

/// How a result came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    /// Every ordering try ran, or the time budget ended the search
    Complete,
    /// Stopped early by cancellation; the best result found so far
    Cancelled,
    /// The computation failed; every connection is left unsatisfied
    Degraded,
}

/// Outcome of routing the connections of one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveResult {
    request: MoveRequest,
    replacements: ReplacementMap,
    unsatisfied: Vec<ConnectionData>,
    total_cost: i32,
    completion: Completion,
}

impl MoveResult {
    pub fn new(
        request: MoveRequest,
        replacements: ReplacementMap,
        unsatisfied: Vec<ConnectionData>,
        total_cost: i32,
        completion: Completion,
    ) -> Self {
        Self {
            request,
            replacements,
            unsatisfied,
            total_cost,
            completion,
        }
    }

    /// Stand-in published when a computation fails
    pub fn degraded(request: MoveRequest, connections: &[ConnectionData]) -> Self {
        Self::new(
            request,
            ReplacementMap::new(),
            connections.to_vec(),
            0,
            Completion::Degraded,
        )
    }

    pub fn request(&self) -> MoveRequest {
        self.request
    }

    pub fn replacements(&self) -> &ReplacementMap {
        &self.replacements
    }

    pub fn unsatisfied_connections(&self) -> &[ConnectionData] {
        &self.unsatisfied
    }

    /// Anchors of the connections left unrouted
    pub fn unconnected_locations(&self) -> Vec<GridPoint> {
        self.unsatisfied.iter().map(|c| c.anchor()).collect()
    }

    /// Where the unrouted anchors end up after the move
    pub fn unconnected_destinations(&self) -> Vec<GridPoint> {
        let MoveRequest { dx, dy, .. } = self.request;
        self.unsatisfied.iter().map(|c| c.destination(dx, dy)).collect()
    }

    pub fn total_cost(&self) -> i32 {
        self.total_cost
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    /// Whether the result may still be replaced by a later computation
    pub fn is_final(&self) -> bool {
        self.completion != Completion::Cancelled
    }

    pub fn is_fully_connected(&self) -> bool {
        self.unsatisfied.is_empty()
    }

    pub fn report(&self) -> MoveReport {
        MoveReport {
            dx: self.request.dx,
            dy: self.request.dy,
            completion: self.completion,
            total_cost: self.total_cost,
            added: self.replacements.additions().copied().collect(),
            removed: self.replacements.removals().copied().collect(),
            replaced: self
                .replacements
                .replacements()
                .map(|(old, new)| WireReplacement {
                    old: *old,
                    new: new.iter().copied().collect(),
                })
                .collect(),
            unconnected: self.unconnected_destinations(),
        }
    }
}

/// Serializable summary of a [`MoveResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    pub dx: i32,
    pub dy: i32,
    pub completion: Completion,
    pub total_cost: i32,
    pub added: Vec<Wire>,
    pub removed: Vec<Wire>,
    pub replaced: Vec<WireReplacement>,
    pub unconnected: Vec<GridPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireReplacement {
    pub old: Wire,
    pub new: Vec<Wire>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> GridPoint {
        GridPoint::new(x, y)
    }

    #[test]
    fn test_degraded_result_lists_every_connection() {
        let request = MoveRequest::new(Uuid::new_v4(), 20, 10);
        let conns = vec![
            ConnectionData::new(p(0, 0), None, vec![], p(0, 0)),
            ConnectionData::new(p(50, 0), None, vec![], p(50, 0)),
        ];
        let result = MoveResult::degraded(request, &conns);
        assert!(result.is_final());
        assert!(!result.is_fully_connected());
        assert_eq!(result.unconnected_locations(), vec![p(0, 0), p(50, 0)]);
        assert_eq!(result.unconnected_destinations(), vec![p(20, 10), p(70, 10)]);
        assert!(result.replacements().is_empty());
    }

    #[test]
    fn test_cancelled_result_is_not_final() {
        let request = MoveRequest::new(Uuid::new_v4(), 0, 10);
        let result = MoveResult::new(request, ReplacementMap::new(), vec![], 0, Completion::Cancelled);
        assert!(!result.is_final());
    }

    #[test]
    fn test_report_serializes() {
        let request = MoveRequest::new(Uuid::new_v4(), 20, 0);
        let mut repl = ReplacementMap::new();
        repl.add(Wire::new(p(100, 100), p(120, 100)));
        let result = MoveResult::new(request, repl, vec![], 20, Completion::Complete);

        let json = serde_json::to_value(result.report()).unwrap();
        assert_eq!(json["completion"], "complete");
        assert_eq!(json["total_cost"], 20);
        assert_eq!(json["added"][0]["end1"]["x"], 120);
        assert!(json["unconnected"].as_array().unwrap().is_empty());
    }
}
