//! Stage/terminal cost implementations.
//!
//! Every cost writes its derivatives in tangent coordinates at the evaluated
//! state, so the optimizers can combine them without knowing the state space:
//!
//! ```text
//! J = Σₖ L(k, tₖ, xₖ, uₖ, hₖ, p) + Φ(N, t_N, x_N, p)
//! ```
//!
//! # Cost Types
//!
//! - [`LqCost`]: quadratic tracking of a goal (and optional per-step references)
//! - [`MultiCost`]: sum of independent sub-costs
//! - [`ConstraintCost`]: exterior quadratic penalty on inequality constraints
//! - [`TrackCost`]: odometry and landmark observation residuals for pose/landmark estimation

pub mod constraint_cost;
pub mod lq_cost;
pub mod multi_cost;
pub mod track_cost;

pub use constraint_cost::ConstraintCost;
pub use lq_cost::LqCost;
pub use multi_cost::MultiCost;
pub use track_cost::{LandmarkObservation, TrackCost, TrackWeights};
