//! Observer pattern for monitoring trajectory optimization.
//!
//! Observers are registered on a solver and receive an owned, read-only
//! [`TrajectorySnapshot`] after every accepted iteration. They never see the
//! solver's working buffers, so a viewer on another thread can keep the snapshot
//! as long as it likes.
//!
//! ```text
//! ┌─────────────────┐
//! │    Optimizer    │
//! │ (Ddp/PDdp/GDocp)│
//! └────────┬────────┘
//!          │ observers.notify(snapshot, iteration)
//!          ├──────────────┬──────────────┐
//!          ▼              ▼              ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │ Recorder │  │  Viewer  │  │  Custom  │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use manifold_ddp::observers::{SnapshotRecorder, TrajectoryObserver, TrajectorySnapshot};
//! use nalgebra::DVector;
//!
//! let recorder = SnapshotRecorder::<DVector<f64>>::new();
//! let handle = recorder.clone();
//! let snapshot = TrajectorySnapshot {
//!     ts: vec![0.0, 1.0],
//!     xs: vec![DVector::zeros(2), DVector::zeros(2)],
//!     us: vec![DVector::zeros(1)],
//!     p: DVector::zeros(0),
//! };
//! recorder.on_step(&snapshot, 1);
//! assert_eq!(handle.len(), 1);
//! ```

use nalgebra::DVector;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Owned copy of `(ts, xs, us, p)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySnapshot<P> {
    pub ts: Vec<f64>,
    pub xs: Vec<P>,
    pub us: Vec<DVector<f64>>,
    pub p: DVector<f64>,
}

/// Observer notified after each accepted iteration.
///
/// Observers must be `Send` so solvers can be moved across threads. Use interior
/// mutability if the observer needs to record anything.
pub trait TrajectoryObserver<P>: Send {
    /// Called with the committed trajectory.
    ///
    /// # Arguments
    /// * `snapshot` - Trajectory and parameters after the iteration
    /// * `iteration` - 1-based iteration counter of the solver
    fn on_step(&self, snapshot: &TrajectorySnapshot<P>, iteration: usize);

    /// Called before `on_step` with scalar metrics of the iteration.
    ///
    /// # Arguments
    /// * `cost` - Total trajectory cost after the iteration
    /// * `mu` - Regularization after the schedule update
    /// * `step_size` - Accepted line-search factor α
    fn set_iteration_metrics(&self, _cost: f64, _mu: f64, _step_size: f64) {}
}

/// Collection of observers owned by a solver.
pub struct ObserverVec<P> {
    observers: Vec<Box<dyn TrajectoryObserver<P>>>,
}

impl<P> Default for ObserverVec<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ObserverVec<P> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Add an observer; observers are called in insertion order.
    pub fn add(&mut self, observer: impl TrajectoryObserver<P> + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn set_iteration_metrics(&self, cost: f64, mu: f64, step_size: f64) {
        for observer in &self.observers {
            observer.set_iteration_metrics(cost, mu, step_size);
        }
    }

    pub fn notify(&self, snapshot: &TrajectorySnapshot<P>, iteration: usize) {
        for observer in &self.observers {
            observer.on_step(snapshot, iteration);
        }
    }
}

/// Observer that keeps every snapshot it receives, together with the reported cost.
///
/// Clones share the same storage, so one clone can be handed to a solver and
/// the other kept for inspection.
#[derive(Debug)]
pub struct SnapshotRecorder<P> {
    records: Arc<Mutex<Vec<(usize, f64, TrajectorySnapshot<P>)>>>,
    pending_cost: Arc<Mutex<f64>>,
}

impl<P> Clone for SnapshotRecorder<P> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            pending_cost: Arc::clone(&self.pending_cost),
        }
    }
}

impl<P> Default for SnapshotRecorder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> SnapshotRecorder<P> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            pending_cost: Arc::new(Mutex::new(f64::NAN)),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Costs reported with each recorded snapshot, in order.
    pub fn costs(&self) -> Vec<f64> {
        self.records
            .lock()
            .map(|records| records.iter().map(|(_, cost, _)| *cost).collect())
            .unwrap_or_default()
    }
}

impl<P: Clone> SnapshotRecorder<P> {
    /// Most recent snapshot, if any.
    pub fn last(&self) -> Option<TrajectorySnapshot<P>> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.last().map(|(_, _, snapshot)| snapshot.clone()))
    }
}

impl<P: Clone + Send> TrajectoryObserver<P> for SnapshotRecorder<P> {
    fn on_step(&self, snapshot: &TrajectorySnapshot<P>, iteration: usize) {
        let cost = self.pending_cost.lock().map_or(f64::NAN, |cost| *cost);
        match self.records.lock() {
            Ok(mut records) => records.push((iteration, cost, snapshot.clone())),
            Err(e) => warn!("Snapshot recorder lock poisoned: {}", e),
        }
    }

    fn set_iteration_metrics(&self, cost: f64, _mu: f64, _step_size: f64) {
        if let Ok(mut pending) = self.pending_cost.lock() {
            *pending = cost;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(value: f64) -> TrajectorySnapshot<f64> {
        TrajectorySnapshot {
            ts: vec![0.0, 1.0],
            xs: vec![value, value],
            us: vec![DVector::zeros(1)],
            p: DVector::zeros(0),
        }
    }

    #[test]
    fn test_observer_vec_notifies_in_order() {
        let first = SnapshotRecorder::<f64>::new();
        let second = SnapshotRecorder::<f64>::new();
        let mut observers = ObserverVec::new();
        observers.add(first.clone());
        observers.add(second.clone());
        assert_eq!(observers.len(), 2);

        observers.set_iteration_metrics(3.5, 0.0, 1.0);
        observers.notify(&snapshot(1.0), 1);
        observers.set_iteration_metrics(2.5, 0.0, 0.5);
        observers.notify(&snapshot(2.0), 2);

        assert_eq!(first.costs(), vec![3.5, 2.5]);
        assert_eq!(second.len(), 2);
        assert_eq!(first.last().map(|s| s.xs[0]), Some(2.0));
    }

    #[test]
    fn test_empty_observer_vec_is_noop() {
        let observers = ObserverVec::<f64>::new();
        assert!(observers.is_empty());
        observers.notify(&snapshot(0.0), 1);
    }
}
