//! Move gesture
//!
//! A gesture is one drag of one selection. It owns the connections of the
//! selection, the avoidance map of everything that stays put, and a cache
//! of results keyed by move offset. Results are computed by the
//! [`ConnectorWorker`] and shared as `Arc<MoveResult>`.

use rustc_hash::FxHashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::circuit::{Circuit, Selection};
use crate::core::{RouteError, RouterConfig};
use crate::result::{MoveRequest, MoveResult};
use crate::route::{compute_connections, AvoidanceMap, CancelToken, ConnectionData, Connector};
use crate::worker::{ConnectorWorker, Job, Priority, WorkerHandle};

/// How often a blocked [`MoveGesture::force_request`] rechecks the worker
const WAIT_POLL: Duration = Duration::from_millis(100);

/// State shared between a gesture and the worker computing for it
pub(crate) struct GestureShared {
    id: Uuid,
    circuit: Arc<Circuit>,
    selection: Selection,
    config: RouterConfig,
    connections: OnceLock<Vec<ConnectionData>>,
    fixed_avoid: OnceLock<AvoidanceMap>,
    cache: Mutex<FxHashMap<MoveRequest, Arc<MoveResult>>>,
    published: Condvar,
}

impl GestureShared {
    pub(crate) fn new(circuit: Arc<Circuit>, selection: Selection, config: RouterConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            circuit,
            selection,
            config,
            connections: OnceLock::new(),
            fixed_avoid: OnceLock::new(),
            cache: Mutex::new(FxHashMap::default()),
            published: Condvar::new(),
        }
    }

    pub(crate) fn request(&self, dx: i32, dy: i32) -> MoveRequest {
        MoveRequest::new(self.id, dx, dy)
    }

    pub(crate) fn connections(&self) -> &[ConnectionData] {
        self.connections
            .get_or_init(|| compute_connections(&self.circuit, &self.selection))
    }

    pub(crate) fn fixed_avoidance_map(&self) -> &AvoidanceMap {
        self.fixed_avoid.get_or_init(|| {
            let fixed = self
                .circuit
                .elements()
                .filter(|(id, _)| !self.selection.contains(*id))
                .map(|(_, element)| element);
            AvoidanceMap::from_elements(fixed, 0, 0)
        })
    }

    pub(crate) fn compute(&self, request: MoveRequest, cancel: &CancelToken) -> MoveResult {
        Connector::new(
            &self.circuit,
            &self.selection,
            self.connections(),
            self.fixed_avoidance_map(),
            &self.config,
            cancel,
        )
        .compute(request)
    }

    /// Fallback result listing every connection as unsatisfied.
    ///
    /// Extraction may itself be the fault being handled, so a panic while
    /// computing the connections yields a fallback with none listed.
    pub(crate) fn degraded(&self, request: MoveRequest) -> MoveResult {
        let connections = match self.connections.get() {
            Some(connections) => connections.as_slice(),
            None => panic::catch_unwind(AssertUnwindSafe(|| self.connections())).unwrap_or(&[]),
        };
        MoveResult::degraded(request, connections)
    }

    /// Store `result` unless a final result is already cached, and return
    /// whatever the cache now holds for its request.
    pub(crate) fn publish(&self, result: MoveResult) -> Arc<MoveResult> {
        let request = result.request();
        let mut cache = self.lock_cache();
        let existing = cache.get(&request).filter(|r| r.is_final()).cloned();
        let stored = match existing {
            Some(existing) => existing,
            None => {
                let result = Arc::new(result);
                cache.insert(request, result.clone());
                result
            }
        };
        drop(cache);
        self.published.notify_all();
        stored
    }

    pub(crate) fn cached(&self, request: MoveRequest) -> Option<Arc<MoveResult>> {
        self.lock_cache().get(&request).cloned()
    }

    pub(crate) fn final_result(&self, request: MoveRequest) -> Option<Arc<MoveResult>> {
        self.cached(request).filter(|result| result.is_final())
    }

    /// Block until a final result for `request` is cached.
    pub(crate) fn wait_for_final(
        &self,
        request: MoveRequest,
        worker: &WorkerHandle,
    ) -> Result<Arc<MoveResult>, RouteError> {
        loop {
            {
                let cache = self.lock_cache();
                if let Some(result) = cache.get(&request).filter(|r| r.is_final()) {
                    return Ok(result.clone());
                }
                let (cache, _) = self
                    .published
                    .wait_timeout(cache, WAIT_POLL)
                    .expect("gesture cache lock poisoned");
                if let Some(result) = cache.get(&request).filter(|r| r.is_final()) {
                    return Ok(result.clone());
                }
            }
            if worker.has_exited() {
                return self.final_result(request).ok_or(RouteError::WorkerStopped);
            }
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, FxHashMap<MoveRequest, Arc<MoveResult>>> {
        self.cache.lock().expect("gesture cache lock poisoned")
    }
}

/// One drag of a selection, with its result cache.
pub struct MoveGesture {
    shared: Arc<GestureShared>,
    worker: WorkerHandle,
}

impl MoveGesture {
    /// Start a gesture whose results are computed by `worker`.
    pub fn new(worker: &ConnectorWorker, circuit: Arc<Circuit>, selection: Selection) -> Self {
        Self {
            shared: Arc::new(GestureShared::new(circuit, selection, worker.config().clone())),
            worker: worker.handle(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn circuit(&self) -> &Circuit {
        &self.shared.circuit
    }

    pub fn selection(&self) -> &Selection {
        &self.shared.selection
    }

    /// The request key for offset (dx, dy) in this gesture
    pub fn request(&self, dx: i32, dy: i32) -> MoveRequest {
        self.shared.request(dx, dy)
    }

    /// Connections of the selection, computed on first use
    pub fn connections(&self) -> &[ConnectionData] {
        self.shared.connections()
    }

    /// Avoidance map of every unselected element, computed on first use
    pub fn fixed_avoidance_map(&self) -> &AvoidanceMap {
        self.shared.fixed_avoidance_map()
    }

    /// Ask for (dx, dy) to be computed in the background.
    ///
    /// Returns `false` when a final result is already cached or the worker
    /// has stopped.
    pub fn enqueue(&self, dx: i32, dy: i32) -> bool {
        let request = self.request(dx, dy);
        if self.shared.final_result(request).is_some() {
            return false;
        }
        match self.submit(request, Priority::Normal) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not enqueue move ({}, {}): {}", dx, dy, e);
                false
            }
        }
    }

    /// Get the final result for (dx, dy), computing it now if needed.
    ///
    /// Blocks until the worker publishes it. Fails only when the worker has
    /// stopped before a result was available.
    pub fn force_request(&self, dx: i32, dy: i32) -> Result<Arc<MoveResult>, RouteError> {
        let request = self.request(dx, dy);
        if let Some(result) = self.shared.final_result(request) {
            return Ok(result);
        }
        self.submit(request, Priority::Forced)?;
        self.shared.wait_for_final(request, &self.worker)
    }

    /// Cached result for (dx, dy), final or not
    pub fn find_result(&self, dx: i32, dy: i32) -> Option<Arc<MoveResult>> {
        self.shared.cached(self.request(dx, dy))
    }

    fn submit(&self, request: MoveRequest, priority: Priority) -> Result<(), RouteError> {
        self.worker.submit(Job {
            request,
            gesture: self.shared.clone(),
            priority,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Part, ReplacementMap, Wire};
    use crate::geom::{Bounds, GridPoint};
    use crate::result::Completion;

    fn p(x: i32, y: i32) -> GridPoint {
        GridPoint::new(x, y)
    }

    fn create_shared() -> GestureShared {
        let mut circuit = Circuit::new();
        let gate = circuit.add_part(Part::rect("U1", Bounds::new(100, 90, 30, 20), vec![p(100, 100)]));
        circuit.add_wire(Wire::new(p(50, 100), p(100, 100)));
        let selection: Selection = [gate].into_iter().collect();
        GestureShared::new(Arc::new(circuit), selection, RouterConfig::default())
    }

    #[test]
    fn test_fixed_map_excludes_selection() {
        let shared = create_shared();
        let fixed = shared.fixed_avoidance_map();
        assert!(!fixed.is_free(p(70, 100)));
        // Inside the selected gate
        assert!(fixed.is_free(p(110, 100)));
        assert!(std::ptr::eq(fixed, shared.fixed_avoidance_map()));
    }

    #[test]
    fn test_degraded_result_lists_every_connection() {
        let shared = create_shared();
        let result = shared.degraded(shared.request(20, 0));
        assert_eq!(result.completion(), Completion::Degraded);
        assert_eq!(result.unconnected_locations(), vec![p(100, 100)]);
        assert_eq!(result.total_cost(), 0);
    }

    #[test]
    fn test_final_result_is_never_replaced() {
        let shared = create_shared();
        let request = shared.request(20, 0);
        let first = shared.publish(MoveResult::new(request, ReplacementMap::new(), vec![], 18, Completion::Complete));
        let second = shared.publish(MoveResult::new(request, ReplacementMap::new(), vec![], 99, Completion::Complete));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(shared.cached(request).unwrap().total_cost(), 18);
    }

    #[test]
    fn test_cancelled_result_can_be_superseded() {
        let shared = create_shared();
        let request = shared.request(20, 0);
        shared.publish(MoveResult::new(request, ReplacementMap::new(), vec![], 0, Completion::Cancelled));
        assert!(shared.final_result(request).is_none());
        assert!(shared.cached(request).is_some());

        shared.publish(MoveResult::new(request, ReplacementMap::new(), vec![], 18, Completion::Complete));
        assert_eq!(shared.final_result(request).unwrap().total_cost(), 18);
    }
}
