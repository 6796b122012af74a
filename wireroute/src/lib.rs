//! WireRoute - wire reconnection engine for schematic editors
//!
//! When the user drags a selection of parts and wires, every wire that tied
//! the selection to the rest of the circuit has to follow. This library
//! finds those connections, searches new orthogonal paths for them around
//! parts and existing wiring, and hands back the wire edits to apply.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wireroute::prelude::*;
//!
//! let mut circuit = Circuit::new();
//! let gate = circuit.add_part(Part::rect(
//!     "U1",
//!     Bounds::new(100, 90, 30, 20),
//!     vec![GridPoint::new(100, 100)],
//! ));
//! circuit.add_wire(Wire::new(GridPoint::new(50, 100), GridPoint::new(100, 100)));
//!
//! let worker = ConnectorWorker::new(RouterConfig::default()).unwrap();
//! let selection: Selection = [gate].into_iter().collect();
//! let gesture = MoveGesture::new(&worker, Arc::new(circuit), selection);
//!
//! // While dragging: speculative, newest offset wins
//! gesture.enqueue(10, 0);
//! // On drop: wait for the answer
//! let result = gesture.force_request(20, 0).unwrap();
//! for point in result.unconnected_locations() {
//!     println!("unconnected at {}", point);
//! }
//! ```
//!
//! # Features
//!
//! - **Connection extraction**: attachments of the selection and the wire
//!   trails leading away from them
//! - **Avoidance map**: exact part outlines and wire crossing rules
//! - **Path search**: best-first search pricing steps, turns and crossings
//! - **Background worker**: cancellable, prioritized, results cached per
//!   gesture

pub mod circuit;
pub mod core;
pub mod geom;
pub mod gesture;
pub mod result;
pub mod route;
pub mod scenario;
pub mod worker;

// Re-export main types
pub use circuit::{Circuit, Element, ElementId, Part, ReplacementMap, Selection, Shape, Wire};
pub use crate::core::{RouteError, RouterConfig};
pub use geom::{Bounds, Direction, GridPoint, PITCH};
pub use gesture::MoveGesture;
pub use result::{Completion, MoveReport, MoveRequest, MoveResult, WireReplacement};
pub use route::{
    compute_connections, Allowance, AvoidanceMap, CancelToken, ConnectionData, Connector,
};
pub use scenario::{LoadedScenario, Scenario};
pub use worker::{ConnectorWorker, WorkerEvent};

/// Route one move synchronously, without a worker or cache.
pub fn route_move(
    circuit: &Circuit,
    selection: &Selection,
    dx: i32,
    dy: i32,
    config: &RouterConfig,
) -> MoveResult {
    let connections = compute_connections(circuit, selection);
    let fixed = AvoidanceMap::from_elements(
        circuit
            .elements()
            .filter(|(id, _)| !selection.contains(*id))
            .map(|(_, element)| element),
        0,
        0,
    );
    let cancel = CancelToken::new();
    let request = MoveRequest::new(uuid::Uuid::new_v4(), dx, dy);
    Connector::new(circuit, selection, &connections, &fixed, config, &cancel).compute(request)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Bounds, Circuit, Completion, ConnectorWorker, GridPoint, MoveGesture, MoveResult, Part,
        RouteError, RouterConfig, Selection, Wire,
    };
}
