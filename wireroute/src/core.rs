//! Error type and tuning options shared by the engine, the scenario loader
//! and the CLI.

use serde::{Deserialize, Serialize};

use crate::geom::GridPoint;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Diagonal wire from {from} to {to}")]
    DiagonalWire { from: GridPoint, to: GridPoint },
    #[error("Wire from {from} to {to} is not part of the circuit")]
    UnknownWire { from: GridPoint, to: GridPoint },
    #[error("Unknown element: {0}")]
    UnknownElement(String),
    #[error("Connector worker has stopped")]
    WorkerStopped,
    #[error("Scenario error: {0}")]
    Scenario(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Budgets and cost weights for the routing engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Wall-clock budget for one move computation
    pub max_seconds: u64,
    /// Upper bound on orderings tried when there are four or more connections
    pub max_ordering_tries: usize,
    /// Expansion ceiling for a single path search
    pub max_search_iterations: usize,
    /// Number of expansions between two checks of the cancel token
    pub abort_poll_interval: usize,
    /// Added to a step that changes direction
    pub turn_penalty: i32,
    /// Added to a step that leaves a cell restricted by another wire
    pub crossing_penalty: i32,
    /// Seed for the shuffled orderings; entropy is used when absent
    pub seed: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_seconds: 10,
            max_ordering_tries: 10,
            max_search_iterations: 20_000,
            abort_poll_interval: 64,
            turn_penalty: 50,
            crossing_penalty: 20,
            seed: None,
        }
    }
}

impl RouterConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_seconds(mut self, max_seconds: u64) -> Self {
        self.max_seconds = max_seconds;
        self
    }

    pub(crate) fn time_budget(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_seconds)
    }
}
