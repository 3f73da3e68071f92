//! # Manifold DDP
//!
//! Differential dynamic programming for trajectories whose states live on smooth
//! manifolds (Euclidean spaces, SE(2), SO(3)). The library solves optimal control
//! and estimation problems over a discrete time grid and ships a receding-horizon
//! harness that uses the estimator for online localization and mapping.
//!
//! ## Optimizers
//!
//! - **Ddp**: unconstrained iLQR/DDP with Levenberg-style regularization and a
//!   backtracking line search
//! - **PDdp**: DDP with a time-invariant parameter vector solved jointly with the
//!   trajectory (biases, disturbances, landmark positions)
//! - **GDocp**: quadratic-penalty outer loop around `Ddp` for path constraints
//!
//! ## Problem Definition
//!
//! A problem is a [`System`](core::System) (discrete dynamics plus Jacobians on a
//! [`Manifold`](manifold::Manifold)), a [`Cost`](core::Cost) with Gauss-Newton
//! expansions, and an initial [`Trajectory`](core::Trajectory). Ready-made systems
//! live in [`systems`], costs in [`costs`] and constraints in [`constraints`].
//!
//! ## Track Harness
//!
//! [`track::TrackHarness`] drives a car around a circular track, records noisy
//! odometry and landmark observations, and re-estimates a sliding window of the
//! trajectory with `PDdp` at every tick.

pub mod constraints;
pub mod core;
pub mod costs;
pub mod error;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;
pub mod observers;
pub mod optimizer;
pub mod systems;
pub mod track;

// Re-export core types
pub use crate::core::{Constraint, Cost, CostExpansion, System, Trajectory};
pub use error::{ManifoldDdpError, ManifoldDdpResult};

pub use linalg::DenseCholeskySolver;
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::{Euclidean, LieGroupManifold, Manifold};
pub use observers::{SnapshotRecorder, TrajectoryObserver, TrajectorySnapshot};
pub use optimizer::{
    Ddp, DdpConfig, DdpSummary, GDocp, GDocpConfig, GDocpSummary, PDdp, SolverStatus,
};
pub use track::{TrackConfig, TrackHarness};
