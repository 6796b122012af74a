//! Background connector worker
//!
//! One thread computes move results for every gesture. Normal requests
//! collapse to the newest one; forced requests queue up, are never dropped,
//! and cancel a normal computation that is already running.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::core::{RouteError, RouterConfig};
use crate::gesture::GestureShared;
use crate::result::{Completion, MoveRequest, MoveResult};
use crate::route::CancelToken;

const EVENT_CAPACITY: usize = 64;

/// Urgency of a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Priority {
    /// Speculative; replaced by any newer request
    Normal,
    /// Someone is waiting for the result
    Forced,
}

/// Notifications sent to [`ConnectorWorker::subscribe`] receivers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A result was stored in the gesture's cache
    ResultPublished {
        request: MoveRequest,
        completion: Completion,
        unsatisfied: usize,
    },
    /// A normal request failed; nothing was stored
    RequestFailed { request: MoveRequest, message: String },
}

pub(crate) struct Job {
    pub(crate) request: MoveRequest,
    pub(crate) gesture: Arc<GestureShared>,
    pub(crate) priority: Priority,
}

struct InFlight {
    request: MoveRequest,
    priority: Priority,
    cancel: CancelToken,
}

#[derive(Default)]
struct WorkerState {
    pending: Option<Job>,
    forced: VecDeque<Job>,
    in_flight: Option<InFlight>,
    stopped: bool,
    exited: bool,
}

struct WorkerInner {
    state: Mutex<WorkerState>,
    cv: Condvar,
    events: broadcast::Sender<WorkerEvent>,
}

impl WorkerInner {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(WorkerState::default()),
            cv: Condvar::new(),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().expect("connector worker lock poisoned")
    }

    fn emit(&self, event: WorkerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Submission side of the worker, held by each gesture
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    inner: Arc<WorkerInner>,
}

impl WorkerHandle {
    pub(crate) fn submit(&self, job: Job) -> Result<(), RouteError> {
        let mut state = self.inner.lock();
        if state.stopped {
            return Err(RouteError::WorkerStopped);
        }

        if let Some(flight) = state.in_flight.as_mut() {
            if flight.request == job.request && !flight.cancel.is_cancelled() {
                if job.priority == Priority::Forced {
                    flight.priority = Priority::Forced;
                }
                return Ok(());
            }
        }

        match job.priority {
            Priority::Normal => {
                if state.forced.iter().any(|queued| queued.request == job.request) {
                    return Ok(());
                }
                debug!("Queued move ({}, {})", job.request.dx, job.request.dy);
                state.pending = Some(job);
            }
            Priority::Forced => {
                debug!("Forced move ({}, {})", job.request.dx, job.request.dy);
                state.pending = None;
                if !state.forced.iter().any(|queued| queued.request == job.request) {
                    state.forced.push_back(job);
                }
                if let Some(flight) = &state.in_flight {
                    if flight.priority == Priority::Normal {
                        flight.cancel.cancel();
                    }
                }
            }
        }
        drop(state);
        self.inner.cv.notify_all();
        Ok(())
    }

    /// Whether the worker thread has finished
    pub(crate) fn has_exited(&self) -> bool {
        self.inner.lock().exited
    }
}

/// Owner of the background thread; stops and joins it on drop.
pub struct ConnectorWorker {
    handle: WorkerHandle,
    config: RouterConfig,
    thread: Option<JoinHandle<()>>,
}

impl ConnectorWorker {
    pub fn new(config: RouterConfig) -> Result<Self, RouteError> {
        let inner = Arc::new(WorkerInner::new());
        let thread = thread::Builder::new()
            .name("wireroute-connector".to_owned())
            .spawn({
                let inner = inner.clone();
                move || run(inner)
            })?;
        info!("Connector worker started");
        Ok(Self {
            handle: WorkerHandle { inner },
            config,
            thread: Some(thread),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.handle.inner.events.subscribe()
    }

    /// Nothing queued and nothing running
    pub fn is_idle(&self) -> bool {
        let state = self.handle.inner.lock();
        state.in_flight.is_none() && state.pending.is_none() && state.forced.is_empty()
    }

    /// Stop the worker and wait for its thread.
    ///
    /// The running computation is cancelled. Forced requests still queued
    /// get a degraded result so no caller waits forever.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.handle.inner.lock();
            state.stopped = true;
            if let Some(flight) = &state.in_flight {
                flight.cancel.cancel();
            }
        }
        self.handle.inner.cv.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Connector worker thread panicked");
            } else {
                info!("Connector worker stopped");
            }
        }
    }

    pub(crate) fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }
}

impl Drop for ConnectorWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ExitGuard(Arc<WorkerInner>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.state.lock() {
            state.exited = true;
        }
        self.0.cv.notify_all();
    }
}

fn run(inner: Arc<WorkerInner>) {
    let _guard = ExitGuard(inner.clone());
    loop {
        let (job, cancel) = {
            let mut state = inner.lock();
            loop {
                if state.stopped {
                    state.pending = None;
                    let abandoned: Vec<Job> = state.forced.drain(..).collect();
                    drop(state);
                    for job in abandoned {
                        publish_fallback(&inner, &job);
                    }
                    return;
                }
                let next = match state.forced.pop_front() {
                    Some(job) => Some(job),
                    None => state.pending.take(),
                };
                if let Some(job) = next {
                    let cancel = CancelToken::new();
                    state.in_flight = Some(InFlight {
                        request: job.request,
                        priority: job.priority,
                        cancel: cancel.clone(),
                    });
                    break (job, cancel);
                }
                state = inner.cv.wait(state).expect("connector worker lock poisoned");
            }
        };

        let outcome = match job.gesture.final_result(job.request) {
            Some(_) => None,
            None => Some(panic::catch_unwind(AssertUnwindSafe(|| {
                job.gesture.compute(job.request, &cancel)
            }))),
        };

        let priority = inner
            .lock()
            .in_flight
            .take()
            .map_or(job.priority, |flight| flight.priority);
        if let Some(outcome) = outcome {
            finish(&inner, &job, priority, outcome);
        }
        inner.cv.notify_all();
    }
}

/// Publish the outcome of one computation.
fn finish(inner: &WorkerInner, job: &Job, priority: Priority, outcome: thread::Result<MoveResult>) {
    match outcome {
        Ok(result) => {
            // A forced caller needs a final answer even if shutdown cut the
            // computation short
            let result = if priority == Priority::Forced && !result.is_final() {
                job.gesture.degraded(job.request)
            } else {
                result
            };
            let published = job.gesture.publish(result);
            inner.emit(WorkerEvent::ResultPublished {
                request: job.request,
                completion: published.completion(),
                unsatisfied: published.unsatisfied_connections().len(),
            });
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                "Connector failed for move ({}, {}): {}",
                job.request.dx, job.request.dy, message
            );
            match priority {
                Priority::Forced => publish_fallback(inner, job),
                Priority::Normal => inner.emit(WorkerEvent::RequestFailed {
                    request: job.request,
                    message,
                }),
            }
        }
    }
}

fn publish_fallback(inner: &WorkerInner, job: &Job) {
    let published = job.gesture.publish(job.gesture.degraded(job.request));
    inner.emit(WorkerEvent::ResultPublished {
        request: job.request,
        completion: published.completion(),
        unsatisfied: published.unsatisfied_connections().len(),
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Circuit, Part, Selection, Wire};
    use crate::geom::{Bounds, GridPoint};

    fn p(x: i32, y: i32) -> GridPoint {
        GridPoint::new(x, y)
    }

    fn create_gesture() -> Arc<GestureShared> {
        let mut circuit = Circuit::new();
        let gate = circuit.add_part(Part::rect("U1", Bounds::new(100, 90, 30, 20), vec![p(100, 100)]));
        circuit.add_wire(Wire::new(p(50, 100), p(100, 100)));
        let selection: Selection = [gate].into_iter().collect();
        Arc::new(GestureShared::new(
            Arc::new(circuit),
            selection,
            RouterConfig::default().with_seed(1),
        ))
    }

    fn idle_handle() -> WorkerHandle {
        WorkerHandle {
            inner: Arc::new(WorkerInner::new()),
        }
    }

    fn job(gesture: &Arc<GestureShared>, dx: i32, priority: Priority) -> Job {
        Job {
            request: gesture.request(dx, 0),
            gesture: gesture.clone(),
            priority,
        }
    }

    #[test]
    fn test_newest_normal_request_wins() {
        let handle = idle_handle();
        let gesture = create_gesture();
        handle.submit(job(&gesture, 10, Priority::Normal)).unwrap();
        handle.submit(job(&gesture, 20, Priority::Normal)).unwrap();
        let state = handle.inner.lock();
        assert_eq!(state.pending.as_ref().map(|j| j.request.dx), Some(20));
    }

    #[test]
    fn test_forced_request_cancels_normal_in_flight() {
        let handle = idle_handle();
        let gesture = create_gesture();
        let running = CancelToken::new();
        handle.inner.lock().in_flight = Some(InFlight {
            request: gesture.request(10, 0),
            priority: Priority::Normal,
            cancel: running.clone(),
        });
        handle.submit(job(&gesture, 30, Priority::Normal)).unwrap();

        handle.submit(job(&gesture, 20, Priority::Forced)).unwrap();

        assert!(running.is_cancelled());
        let state = handle.inner.lock();
        assert!(state.pending.is_none());
        assert_eq!(state.forced.len(), 1);
    }

    #[test]
    fn test_forced_requests_are_not_displaced() {
        let handle = idle_handle();
        let gesture = create_gesture();
        let running = CancelToken::new();
        handle.inner.lock().in_flight = Some(InFlight {
            request: gesture.request(10, 0),
            priority: Priority::Forced,
            cancel: running.clone(),
        });
        handle.submit(job(&gesture, 20, Priority::Forced)).unwrap();
        handle.submit(job(&gesture, 30, Priority::Forced)).unwrap();
        handle.submit(job(&gesture, 20, Priority::Forced)).unwrap();

        assert!(!running.is_cancelled());
        let queued: Vec<i32> = handle.inner.lock().forced.iter().map(|j| j.request.dx).collect();
        assert_eq!(queued, vec![20, 30]);
    }

    #[test]
    fn test_request_in_flight_is_not_queued_again() {
        let handle = idle_handle();
        let gesture = create_gesture();
        handle.inner.lock().in_flight = Some(InFlight {
            request: gesture.request(10, 0),
            priority: Priority::Normal,
            cancel: CancelToken::new(),
        });
        handle.submit(job(&gesture, 10, Priority::Forced)).unwrap();

        let state = handle.inner.lock();
        assert!(state.forced.is_empty());
        assert_eq!(state.in_flight.as_ref().map(|f| f.priority), Some(Priority::Forced));
    }

    #[test]
    fn test_submit_after_stop_fails() {
        let handle = idle_handle();
        let gesture = create_gesture();
        handle.inner.lock().stopped = true;
        let err = handle.submit(job(&gesture, 10, Priority::Normal)).unwrap_err();
        assert!(matches!(err, RouteError::WorkerStopped));
    }

    #[test]
    fn test_stopped_worker_degrades_forced_jobs() {
        let handle = idle_handle();
        let gesture = create_gesture();
        handle.submit(job(&gesture, 20, Priority::Forced)).unwrap();
        handle.submit(job(&gesture, 40, Priority::Normal)).unwrap();
        handle.inner.lock().stopped = true;

        run(handle.inner.clone());

        let forced = gesture.final_result(gesture.request(20, 0)).unwrap();
        assert_eq!(forced.completion(), Completion::Degraded);
        assert_eq!(forced.unsatisfied_connections().len(), 1);
        assert!(gesture.final_result(gesture.request(40, 0)).is_none());
        assert!(handle.has_exited());
    }

    #[test]
    fn test_panic_publishes_fallback_only_for_forced() {
        let inner = WorkerInner::new();
        let mut events = inner.events.subscribe();
        let gesture = create_gesture();

        let normal = job(&gesture, 10, Priority::Normal);
        finish(&inner, &normal, Priority::Normal, Err(Box::new("search exploded") as Box<dyn Any + Send>));
        assert!(gesture.final_result(normal.request).is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            WorkerEvent::RequestFailed {
                request: normal.request,
                message: "search exploded".to_owned(),
            }
        );

        let forced = job(&gesture, 20, Priority::Forced);
        finish(&inner, &forced, Priority::Forced, Err(Box::new("search exploded".to_owned()) as Box<dyn Any + Send>));
        let result = gesture.final_result(forced.request).unwrap();
        assert_eq!(result.completion(), Completion::Degraded);
        assert!(matches!(
            events.try_recv().unwrap(),
            WorkerEvent::ResultPublished {
                completion: Completion::Degraded,
                ..
            }
        ));
    }

    #[test]
    fn test_worker_computes_forced_request() {
        let mut worker = ConnectorWorker::new(RouterConfig::default()).unwrap();
        let gesture = create_gesture();
        worker
            .handle()
            .submit(job(&gesture, 20, Priority::Forced))
            .unwrap();
        let request = gesture.request(20, 0);
        let result = gesture.wait_for_final(request, &worker.handle()).unwrap();
        assert_eq!(result.completion(), Completion::Complete);
        assert!(result.is_fully_connected());
        worker.shutdown();
        assert!(worker.handle().has_exited());
    }
}
