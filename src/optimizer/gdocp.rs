//! Exterior-penalty constrained DDP.
//!
//! Each outer iteration solves the unconstrained problem
//!
//! ```text
//! min  J(x, u) + Σₖ hₖ b/2 Σᵢ max(gᵢ(tₖ, xₖ, uₖ, p), 0)²  +  b/2 Σᵢ max(gᵢ(t_N, x_N, p), 0)²
//! ```
//!
//! with [`Ddp`] warm-started from the previous outer solution, measures the
//! largest per-step violation and multiplies `b` by `weight_growth` until the
//! violation drops below `tolerance`.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use tracing::{debug, info, warn};
use web_time::{Duration, Instant};

use crate::{
    core::{Constraint, Cost, Point, System, Trajectory, max_violation},
    costs::{ConstraintCost, MultiCost},
    manifold::Manifold,
    optimizer::{
        DdpConfig, DdpSummary, OptimizerError, OptimizerResult, SolverStatus,
        ddp::{Ddp, trajectory_cost},
    },
};

/// Configuration of the outer penalty loop.
///
/// ```
/// use manifold_ddp::optimizer::{DdpConfig, GDocpConfig};
///
/// let config = GDocpConfig::new()
///     .with_initial_weight(10.0)
///     .with_weight_growth(5.0)
///     .with_tolerance(1e-3)
///     .with_ddp(DdpConfig::new().with_max_iterations(200));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GDocpConfig {
    /// Penalty weight of the first outer iteration
    pub initial_weight: f64,
    /// Factor applied to the weight after each infeasible outer iteration
    pub weight_growth: f64,
    /// Largest acceptable constraint value
    pub tolerance: f64,
    pub max_outer_iterations: usize,
    /// Settings of every inner unconstrained solve
    pub ddp: DdpConfig,
}

impl Default for GDocpConfig {
    fn default() -> Self {
        Self {
            initial_weight: 1.0,
            weight_growth: 10.0,
            tolerance: 1e-2,
            max_outer_iterations: 10,
            ddp: DdpConfig::default().with_max_iterations(100),
        }
    }
}

impl GDocpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_weight(mut self, weight: f64) -> Self {
        self.initial_weight = weight;
        self
    }

    pub fn with_weight_growth(mut self, growth: f64) -> Self {
        self.weight_growth = growth;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_outer_iterations(mut self, max_outer_iterations: usize) -> Self {
        self.max_outer_iterations = max_outer_iterations;
        self
    }

    pub fn with_ddp(mut self, ddp: DdpConfig) -> Self {
        self.ddp = ddp;
        self
    }

    pub fn validate(&self) -> OptimizerResult<()> {
        if !(self.initial_weight > 0.0 && self.initial_weight.is_finite()) {
            return Err(OptimizerError::InvalidParameters(format!(
                "initial penalty weight must be positive, got {}",
                self.initial_weight
            ))
            .log());
        }
        if !(self.weight_growth > 1.0 && self.weight_growth.is_finite()) {
            return Err(OptimizerError::InvalidParameters(format!(
                "penalty growth must be greater than 1, got {}",
                self.weight_growth
            ))
            .log());
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(OptimizerError::InvalidParameters(format!(
                "constraint tolerance must be non-negative, got {}",
                self.tolerance
            ))
            .log());
        }
        if self.max_outer_iterations == 0 {
            return Err(OptimizerError::InvalidParameters(
                "max_outer_iterations must be at least 1".into(),
            )
            .log());
        }
        self.ddp.validate()
    }

    pub fn print_configuration(&self) {
        debug!(
            "Constrained DDP configuration:\n  Initial weight:       {:.2e}\n  Weight growth:        {}\n  Tolerance:            {:.2e}\n  Max outer iterations: {}",
            self.initial_weight, self.weight_growth, self.tolerance, self.max_outer_iterations
        );
        self.ddp.print_configuration();
    }
}

/// Result of one outer iteration.
#[derive(Debug, Clone)]
pub struct OuterIteration {
    pub weight: f64,
    /// Largest constraint value after the inner solve
    pub violation: f64,
    /// Cost without the penalty term
    pub cost: f64,
    pub inner: DdpSummary,
}

/// Summary of a constrained solve.
#[derive(Debug, Clone)]
pub struct GDocpSummary {
    pub status: SolverStatus,
    pub initial_cost: f64,
    /// Cost of the retained trajectory without the penalty term
    pub final_cost: f64,
    pub initial_violation: f64,
    pub final_violation: f64,
    pub final_weight: f64,
    pub outer_iterations: Vec<OuterIteration>,
    pub total_time: Duration,
}

impl GDocpSummary {
    pub fn converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }

    /// Maximum violation after each outer iteration.
    pub fn violation_history(&self) -> Vec<f64> {
        self.outer_iterations.iter().map(|o| o.violation).collect()
    }
}

impl Display for GDocpSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Constrained DDP Final Result")?;

        if self.status == SolverStatus::Converged {
            writeln!(f, "CONVERGED ({:?})", self.status)?;
        } else {
            writeln!(f, "DIVERGED ({:?})", self.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Cost:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_cost)?;
        writeln!(f, "  Final:     {:.6e}", self.final_cost)?;
        writeln!(f)?;
        writeln!(f, "Constraints:")?;
        writeln!(f, "  Initial violation: {:.3e}", self.initial_violation)?;
        writeln!(f, "  Final violation:   {:.3e}", self.final_violation)?;
        writeln!(f, "  Final weight:      {:.2e}", self.final_weight)?;
        writeln!(f)?;
        writeln!(f, "Outer iterations: {}", self.outer_iterations.len())?;
        for (i, outer) in self.outer_iterations.iter().enumerate() {
            writeln!(
                f,
                "  {:>3}  weight {:>9.2e}  violation {:>10.3e}  cost {:>13.6e}  inner {:>4} ({})",
                i + 1,
                outer.weight,
                outer.violation,
                outer.cost,
                outer.inner.iterations,
                outer.inner.status
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Total time: {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}

/// Largest constraint value over every step of a trajectory, terminal included.
pub fn trajectory_violation<M: Manifold>(
    constraints: &[Box<dyn Constraint<M>>],
    trajectory: &Trajectory<M::Point>,
    p: &DVector<f64>,
) -> f64 {
    let horizon = trajectory.horizon();
    let mut worst: f64 = 0.0;
    for constraint in constraints {
        for k in 0..=horizon {
            let u = trajectory.us.get(k);
            let g = constraint.evaluate(trajectory.ts[k], &trajectory.xs[k], u, p, None);
            worst = worst.max(max_violation(&g));
        }
    }
    worst
}

/// Penalty-constrained DDP.
///
/// # Example
///
/// ```no_run
/// use manifold_ddp::{
///     constraints::DiskConstraint,
///     core::{Constraint, Trajectory, uniform_times},
///     costs::LqCost,
///     manifold::Euclidean,
///     optimizer::{GDocp, GDocpConfig},
///     systems::Particle2d,
/// };
/// use nalgebra::{DMatrix, DVector};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cost = LqCost::new(
///     Euclidean::new(4),
///     DMatrix::identity(4, 4) * 0.01,
///     DMatrix::identity(2, 2) * 0.1,
///     DMatrix::identity(4, 4) * 10.0,
///     DVector::zeros(4),
/// )?;
/// let obstacle: Box<dyn Constraint<Euclidean>> =
///     Box::new(DiskConstraint::new(0, [-2.5, -2.5], 2.0)?);
/// let x0 = DVector::from_vec(vec![-5.0, -5.0, 0.1, 0.0]);
/// let trajectory = Trajectory::new(
///     uniform_times(0.0, 10.0, 32),
///     vec![x0; 33],
///     vec![DVector::zeros(2); 32],
/// )?;
///
/// let mut solver = GDocp::new(
///     Particle2d::new(),
///     cost,
///     vec![obstacle],
///     trajectory,
///     DVector::zeros(0),
///     GDocpConfig::new(),
/// )?;
/// let summary = solver.solve()?;
/// println!("{}", summary);
/// # Ok(())
/// # }
/// ```
pub struct GDocp<S: System, C: Cost<S::Manifold>> {
    system: S,
    cost: C,
    constraints: Vec<Box<dyn Constraint<S::Manifold>>>,
    config: GDocpConfig,
    trajectory: Trajectory<Point<S>>,
    p: DVector<f64>,
    weight: f64,
}

impl<S: System, C: Cost<S::Manifold>> GDocp<S, C> {
    /// The initial trajectory is validated and rolled out the same way as in
    /// [`Ddp::new`].
    pub fn new(
        system: S,
        cost: C,
        constraints: Vec<Box<dyn Constraint<S::Manifold>>>,
        trajectory: Trajectory<Point<S>>,
        p: DVector<f64>,
        config: GDocpConfig,
    ) -> OptimizerResult<Self> {
        config.validate()?;
        // Validate and roll out once with the bare cost
        let (trajectory, p) =
            Ddp::new(&system, &cost, trajectory, p, config.ddp.clone())?.into_parts();
        let weight = config.initial_weight;

        Ok(Self {
            system,
            cost,
            constraints,
            config,
            trajectory,
            p,
            weight,
        })
    }

    pub fn trajectory(&self) -> &Trajectory<Point<S>> {
        &self.trajectory
    }

    pub fn parameters(&self) -> &DVector<f64> {
        &self.p
    }

    /// Penalty weight the next outer iteration will use.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn config(&self) -> &GDocpConfig {
        &self.config
    }

    pub fn constraints(&self) -> &[Box<dyn Constraint<S::Manifold>>] {
        &self.constraints
    }

    /// Largest constraint value of the current trajectory.
    pub fn violation(&self) -> f64 {
        trajectory_violation(&self.constraints, &self.trajectory, &self.p)
    }

    /// Cost of the current trajectory without the penalty term.
    pub fn cost(&self) -> f64 {
        trajectory_cost::<S::Manifold, C>(
            &self.cost,
            &self.trajectory.ts,
            &self.trajectory.xs,
            &self.trajectory.us,
            &self.p,
        )
    }

    pub fn into_parts(self) -> (Trajectory<Point<S>>, DVector<f64>) {
        (self.trajectory, self.p)
    }

    /// One inner solve at the current weight, warm-started from the current trajectory.
    fn solve_penalized(
        &self,
    ) -> OptimizerResult<(Trajectory<Point<S>>, DVector<f64>, DdpSummary)> {
        let penalized = MultiCost::new()
            .with_cost(&self.cost)
            .with_cost(ConstraintCost::new(&self.constraints, self.weight));
        let mut inner = Ddp::new(
            &self.system,
            penalized,
            self.trajectory.clone(),
            self.p.clone(),
            self.config.ddp.clone(),
        )?;
        let summary = inner.solve();
        let (trajectory, p) = inner.into_parts();
        Ok((trajectory, p, summary))
    }

    /// Run the outer loop until the violation is within tolerance or the outer
    /// budget is spent.
    ///
    /// When the budget runs out the status is `Diverged` and the trajectory with
    /// the lowest violation seen is kept.
    ///
    /// # Errors
    /// Propagates construction failures of the inner solver, which only occur
    /// if a penalized rollout evaluates to a non-finite cost.
    pub fn solve(&mut self) -> OptimizerResult<GDocpSummary> {
        let start_time = Instant::now();
        let initial_cost = self.cost();
        let initial_violation = self.violation();
        let mut outer_iterations = Vec::with_capacity(self.config.max_outer_iterations);
        let mut best: Option<(f64, Trajectory<Point<S>>, DVector<f64>)> = None;
        let mut status = SolverStatus::Diverged;

        if tracing::enabled!(tracing::Level::DEBUG) {
            self.config.print_configuration();
        }

        for outer in 1..=self.config.max_outer_iterations {
            let (trajectory, p, inner) = self.solve_penalized()?;
            self.trajectory = trajectory;
            self.p = p;

            let violation = self.violation();
            let cost = self.cost();
            debug!(
                "Outer iteration {}: weight {:.2e}, violation {:.3e}, cost {:.6e}, inner {}",
                outer, self.weight, violation, cost, inner.status
            );
            let inner_diverged = inner.status == SolverStatus::Diverged;
            outer_iterations.push(OuterIteration {
                weight: self.weight,
                violation,
                cost,
                inner,
            });

            if best.as_ref().is_none_or(|(v, _, _)| violation < *v) {
                best = Some((violation, self.trajectory.clone(), self.p.clone()));
            }

            if violation <= self.config.tolerance {
                status = SolverStatus::Converged;
                break;
            }
            if inner_diverged {
                warn!(
                    "Inner solve diverged at weight {:.2e}; stopping the penalty loop",
                    self.weight
                );
                break;
            }
            self.weight *= self.config.weight_growth;
        }

        if status != SolverStatus::Converged
            && let Some((violation, trajectory, p)) = best
        {
            warn!(
                "Constraint violation {:.3e} still above tolerance {:.3e}; keeping the best trajectory",
                violation, self.config.tolerance
            );
            self.trajectory = trajectory;
            self.p = p;
        }

        let summary = GDocpSummary {
            status,
            initial_cost,
            final_cost: self.cost(),
            initial_violation,
            final_violation: self.violation(),
            final_weight: self.weight,
            outer_iterations,
            total_time: start_time.elapsed(),
        };
        info!(
            "Constrained DDP finished: {} after {} outer iterations, violation {:.3e} -> {:.3e}",
            summary.status,
            summary.outer_iterations.len(),
            summary.initial_violation,
            summary.final_violation
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("{}", summary);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constraints::{ControlBounds, DiskConstraint},
        core::uniform_times,
        costs::LqCost,
        manifold::Euclidean,
        systems::Particle2d,
    };
    use nalgebra::DMatrix;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn particle_cost() -> Result<LqCost<Euclidean>, Box<dyn std::error::Error>> {
        Ok(LqCost::new(
            Euclidean::new(4),
            DMatrix::identity(4, 4) * 0.01,
            DMatrix::identity(2, 2) * 0.1,
            DMatrix::identity(4, 4) * 10.0,
            DVector::zeros(4),
        )?)
    }

    fn particle_trajectory(
        x0: Vec<f64>,
        n: usize,
    ) -> Result<Trajectory<DVector<f64>>, Box<dyn std::error::Error>> {
        let x0 = DVector::from_vec(x0);
        Ok(Trajectory::new(
            uniform_times(0.0, 5.0, n),
            vec![x0; n + 1],
            vec![DVector::zeros(2); n],
        )?)
    }

    #[test]
    fn test_gdocp_config_validation() {
        assert!(GDocpConfig::new().validate().is_ok());
        assert!(GDocpConfig::new().with_weight_growth(1.0).validate().is_err());
        assert!(GDocpConfig::new().with_initial_weight(0.0).validate().is_err());
        assert!(GDocpConfig::new().with_max_outer_iterations(0).validate().is_err());
        assert!(
            GDocpConfig::new()
                .with_ddp(DdpConfig::new().with_max_iterations(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_gdocp_without_active_constraints_matches_ddp() -> TestResult {
        // The obstacle is far from any reasonable path
        let obstacle: Box<dyn Constraint<Euclidean>> =
            Box::new(DiskConstraint::new(0, [50.0, 50.0], 1.0)?);
        let mut solver = GDocp::new(
            Particle2d::new(),
            particle_cost()?,
            vec![obstacle],
            particle_trajectory(vec![2.0, -1.0, 0.0, 0.0], 20)?,
            DVector::zeros(0),
            GDocpConfig::new(),
        )?;
        let summary = solver.solve()?;
        assert!(summary.converged());
        assert_eq!(summary.outer_iterations.len(), 1);

        let mut ddp = Ddp::new(
            Particle2d::new(),
            particle_cost()?,
            particle_trajectory(vec![2.0, -1.0, 0.0, 0.0], 20)?,
            DVector::zeros(0),
            GDocpConfig::new().ddp,
        )?;
        ddp.solve();
        assert!((summary.final_cost - ddp.current_cost()).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_gdocp_enforces_control_bounds() -> TestResult {
        let limit = 0.3;
        let bounds: Box<dyn Constraint<Euclidean>> =
            Box::new(ControlBounds::symmetric(DVector::from_element(2, limit))?);
        let config = GDocpConfig::new().with_tolerance(2e-3).with_max_outer_iterations(8);
        let mut solver = GDocp::new(
            Particle2d::new(),
            particle_cost()?,
            vec![bounds],
            particle_trajectory(vec![3.0, 3.0, 0.0, 0.0], 20)?,
            DVector::zeros(0),
            config,
        )?;
        let summary = solver.solve()?;

        assert!(summary.initial_violation == 0.0);
        let peak = solver
            .trajectory()
            .us
            .iter()
            .flat_map(|u| u.iter().copied())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        assert!(peak <= limit + 2e-3, "peak control {}", peak);
        assert_eq!(summary.status, SolverStatus::Converged);
        Ok(())
    }

    #[test]
    fn test_gdocp_exhaustion_keeps_best_trajectory() -> TestResult {
        let cost = LqCost::new(
            Euclidean::new(4),
            DMatrix::identity(4, 4) * 0.01,
            DMatrix::identity(2, 2) * 0.1,
            DMatrix::identity(4, 4) * 1000.0,
            DVector::zeros(4),
        )?;
        let x0 = DVector::from_vec(vec![-5.0, -5.0, 0.1, 0.0]);
        let trajectory = Trajectory::new(
            uniform_times(0.0, 10.0, 32),
            vec![x0; 33],
            vec![DVector::zeros(2); 32],
        )?;
        let obstacle: Box<dyn Constraint<Euclidean>> =
            Box::new(DiskConstraint::new(0, [-2.5, -2.5], 2.0)?);
        // Two small weights cannot push the path clear of the disk
        let config = GDocpConfig::new()
            .with_tolerance(1e-4)
            .with_max_outer_iterations(2);
        let mut solver = GDocp::new(
            Particle2d::new(),
            cost,
            vec![obstacle],
            trajectory,
            DVector::zeros(0),
            config,
        )?;
        let summary = solver.solve()?;

        assert_eq!(summary.status, SolverStatus::Diverged);
        assert!(!summary.converged());
        let history = summary.violation_history();
        assert_eq!(history.len(), 2);
        let best = history.iter().copied().fold(f64::INFINITY, f64::min);
        assert!(best > 1e-4);
        assert_eq!(summary.final_violation, best);
        assert_eq!(solver.violation(), best);
        Ok(())
    }
}
