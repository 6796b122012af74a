//! Reconnection engine
//!
//! Given a selection and a move offset, reroute every connection between
//! the selection and the fixed circuit:
//!
//! 1. [`compute_connections`] finds the attachments and their wire trails.
//! 2. [`AvoidanceMap`] records which grid points new wires must avoid.
//! 3. [`PathSearch`] finds a cheap orthogonal path for one connection.
//! 4. [`Connector`] runs the searches over several connection orderings and
//!    keeps the best set of wire edits.

mod avoidance;
mod cancel;
mod connection;
mod connector;
mod search;

pub use avoidance::{Allowance, AvoidanceMap};
pub use cancel::CancelToken;
pub use connection::{compute_connections, ConnectionData};
pub use connector::Connector;
pub use search::{PathSearch, Route, SearchOutcome, SearchPlan, StartNode};
