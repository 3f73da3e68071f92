//! Manifold DDP (differential dynamic programming).
//!
//! Each iteration linearizes the dynamics and expands the cost around the
//! nominal trajectory, runs a backward Riccati-like recursion in tangent
//! coordinates and rolls a new trajectory forward with a backtracking line
//! search.
//!
//! # Backward pass
//!
//! With `Vx, Vxx` the value derivatives of step `k + 1`:
//!
//! ```text
//! Qx  = Lx  + Aᵀ Vx          Qxx = Lxx + Aᵀ Vxx A
//! Qu  = Lu  + Bᵀ Vx          Quu = Luu + Bᵀ Vxx B
//! Qux = Lxuᵀ + Bᵀ Vxx A
//! k   = -(Quu + μI)⁻¹ Qu     K   = -(Quu + μI)⁻¹ Qux
//! ```
//!
//! If `Quu + μI` is not positive definite, `μ` grows and the whole pass restarts.
//!
//! # Forward pass
//!
//! With `x'₀ = x₀` fixed:
//!
//! ```text
//! u'ₖ = uₖ + α kₖ + Kₖ · Difference(xₖ, x'ₖ)
//! ```
//!
//! `α` starts at one and is scaled by `line_search_factor` until the realized
//! decrease is at least `armijo_ratio` times the predicted one,
//! `-(α dV₁ + α² dV₂)` with `dV₁ = Σ kᵀQu`, `dV₂ = ½ Σ kᵀQuu k`.
//! A rollout that turns non-finite is retried once with a shorter step; a
//! second one ends the iteration and grows `μ`.
//!
//! # Convergence
//!
//! The iteration reports convergence without a forward pass once the predicted
//! full-step decrease drops below `tolerance · (1 + |J|)`.

use nalgebra::{DMatrix, DVector};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use web_time::{Duration, Instant};

use crate::{
    core::{Cost, CostExpansion, Point, StepJacobians, System, Trajectory, rollout},
    linalg::DenseCholeskySolver,
    manifold::Manifold,
    observers::{ObserverVec, TrajectoryObserver, TrajectorySnapshot},
    optimizer::{
        DdpSummary, IterationOutcome, IterationReport, OptimizerError, OptimizerResult,
        SolverStatus,
        pddp::{ParameterSensitivity, StageQuadratic, solve_parameter_step},
        regularization::Regularization,
    },
};

/// Configuration parameters for the DDP solvers.
///
/// # Builder Pattern
///
/// ```
/// use manifold_ddp::optimizer::DdpConfig;
///
/// let config = DdpConfig::new()
///     .with_max_iterations(100)
///     .with_tolerance(1e-8)
///     .with_mu_bounds(1e-8, 1e8)
///     .with_line_search(0.5, 10);
/// assert!(config.validate().is_ok());
/// ```
///
/// # Regularization
///
/// - **Initial value** (`mu`): 0 by default, so well-posed problems take pure Newton steps
/// - **Bounds** (`mu_min`, `mu_max`): smallest non-zero value and the divergence threshold
/// - **Growth** (`dmu0`): base factor of the quadratic schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdpConfig {
    /// Maximum number of forward passes per `solve()`
    pub max_iterations: usize,
    /// Relative threshold on the predicted decrease
    pub tolerance: f64,
    /// Initial regularization
    pub mu: f64,
    pub mu_min: f64,
    pub mu_max: f64,
    pub dmu0: f64,
    /// Multiplier applied to α after a rejected trial
    pub line_search_factor: f64,
    pub max_line_search_steps: usize,
    /// Minimum ratio of actual to predicted decrease
    pub armijo_ratio: f64,
}

impl Default for DdpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-9,
            mu: 0.0,
            mu_min: 1e-6,
            mu_max: 1e10,
            dmu0: 2.0,
            line_search_factor: 0.5,
            max_line_search_steps: 12,
            armijo_ratio: 1e-4,
        }
    }
}

impl DdpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_mu(mut self, mu: f64) -> Self {
        self.mu = mu;
        self
    }

    pub fn with_mu_bounds(mut self, min: f64, max: f64) -> Self {
        self.mu_min = min;
        self.mu_max = max;
        self
    }

    pub fn with_mu_factor(mut self, dmu0: f64) -> Self {
        self.dmu0 = dmu0;
        self
    }

    pub fn with_line_search(mut self, factor: f64, max_steps: usize) -> Self {
        self.line_search_factor = factor;
        self.max_line_search_steps = max_steps;
        self
    }

    pub fn with_armijo_ratio(mut self, armijo_ratio: f64) -> Self {
        self.armijo_ratio = armijo_ratio;
        self
    }

    /// Check that every field is in its valid range.
    ///
    /// # Errors
    /// `OptimizerError::InvalidParameters` naming the first offending field.
    pub fn validate(&self) -> OptimizerResult<()> {
        let problem = if self.max_iterations == 0 {
            Some("max_iterations must be at least 1".to_string())
        } else if !(self.tolerance >= 0.0) {
            Some(format!("tolerance must be non-negative, got {}", self.tolerance))
        } else if !(self.mu >= 0.0) || !self.mu.is_finite() {
            Some(format!("mu must be finite and non-negative, got {}", self.mu))
        } else if !(self.mu_min > 0.0) || !(self.mu_max > self.mu_min) {
            Some(format!(
                "mu bounds must satisfy 0 < mu_min < mu_max, got [{}, {}]",
                self.mu_min, self.mu_max
            ))
        } else if !(self.dmu0 > 1.0) {
            Some(format!("dmu0 must be greater than 1, got {}", self.dmu0))
        } else if !(self.line_search_factor > 0.0 && self.line_search_factor < 1.0) {
            Some(format!(
                "line_search_factor must lie in (0, 1), got {}",
                self.line_search_factor
            ))
        } else if self.max_line_search_steps == 0 {
            Some("max_line_search_steps must be at least 1".to_string())
        } else if !(self.armijo_ratio >= 0.0 && self.armijo_ratio < 1.0) {
            Some(format!(
                "armijo_ratio must lie in [0, 1), got {}",
                self.armijo_ratio
            ))
        } else {
            None
        };

        match problem {
            Some(message) => Err(OptimizerError::InvalidParameters(message).log()),
            None => Ok(()),
        }
    }

    /// Print configuration parameters (debug level only)
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:              DDP\n  Convergence Criteria:\n  Max iterations:      {}\n  Tolerance:           {:.2e}\n  Regularization:\n  Initial mu:          {:.2e}\n  Mu range:            [{:.2e}, {:.2e}]\n  Growth factor:       {:.2}\n  Line Search:\n  Step factor:         {:.2}\n  Max steps:           {}\n  Armijo ratio:        {:.2e}",
            self.max_iterations,
            self.tolerance,
            self.mu,
            self.mu_min,
            self.mu_max,
            self.dmu0,
            self.line_search_factor,
            self.max_line_search_steps,
            self.armijo_ratio
        );
    }
}

/// Linearization of one step of the nominal trajectory.
pub(crate) struct StepModel {
    pub dynamics: StepJacobians,
    pub cost: CostExpansion,
}

fn linearize_step<S: System, C: Cost<S::Manifold>>(
    system: &S,
    cost: &C,
    trajectory: &Trajectory<Point<S>>,
    p: &DVector<f64>,
    k: usize,
) -> StepModel {
    let state_dim = system.manifold().dim();
    let control_dim = trajectory.us[k].len();
    let t = trajectory.ts[k];
    let h = trajectory.step_size(k);
    let x = &trajectory.xs[k];
    let u = &trajectory.us[k];

    let mut dynamics = StepJacobians::zeros(state_dim, control_dim, p.len());
    system.step(t, x, u, h, p, Some(&mut dynamics));
    let mut expansion = CostExpansion::zeros(state_dim, control_dim, p.len());
    cost.stage(k, t, x, u, h, p, Some(&mut expansion));

    StepModel {
        dynamics,
        cost: expansion,
    }
}

/// Linearize every step (in parallel with the `parallel` feature) and expand
/// the terminal cost.
pub(crate) fn linearize<S: System, C: Cost<S::Manifold>>(
    system: &S,
    cost: &C,
    trajectory: &Trajectory<Point<S>>,
    p: &DVector<f64>,
) -> (Vec<StepModel>, CostExpansion) {
    let horizon = trajectory.horizon();

    #[cfg(feature = "parallel")]
    let steps: Vec<StepModel> = (0..horizon)
        .into_par_iter()
        .map(|k| linearize_step(system, cost, trajectory, p, k))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let steps: Vec<StepModel> = (0..horizon)
        .map(|k| linearize_step(system, cost, trajectory, p, k))
        .collect();

    let mut terminal = CostExpansion::terminal(system.manifold().dim(), p.len());
    cost.terminal(
        horizon,
        trajectory.final_time(),
        &trajectory.xs[horizon],
        p,
        Some(&mut terminal),
    );
    (steps, terminal)
}

/// Total stage plus terminal cost of a trajectory.
pub fn trajectory_cost<M: Manifold, C: Cost<M>>(
    cost: &C,
    ts: &[f64],
    xs: &[M::Point],
    us: &[DVector<f64>],
    p: &DVector<f64>,
) -> f64 {
    let horizon = us.len();
    let stages: f64 = us
        .iter()
        .enumerate()
        .map(|(k, u)| cost.stage(k, ts[k], &xs[k], u, ts[k + 1] - ts[k], p, None))
        .sum();
    stages + cost.terminal(horizon, ts[horizon], &xs[horizon], p, None)
}

/// Local control policy produced by a backward pass.
struct Policy {
    feedforward: Vec<DVector<f64>>,
    gains: Vec<DMatrix<f64>>,
    /// Empty unless parameters are estimated
    parameter_gains: Vec<DMatrix<f64>>,
    dv1: f64,
    dv2: f64,
    root_sensitivity: Option<ParameterSensitivity>,
}

enum Rollout<P> {
    Finite {
        xs: Vec<P>,
        us: Vec<DVector<f64>>,
        p: DVector<f64>,
        cost: f64,
    },
    NonFinite,
}

/// Parameter estimation settings, present only for [`PDdp`](crate::optimizer::PDdp).
#[derive(Debug, Clone)]
pub(crate) struct ParameterEstimation {
    active: Vec<usize>,
    solver: DenseCholeskySolver,
}

/// Unconstrained manifold DDP solver.
///
/// The solver owns the nominal trajectory and parameter vector; `iterate()`
/// replaces them only when a forward pass is accepted, so a failed iteration
/// always leaves the last good trajectory in place.
///
/// # Example
///
/// ```
/// use manifold_ddp::{
///     core::{Trajectory, uniform_times},
///     costs::LqCost,
///     manifold::Euclidean,
///     optimizer::{Ddp, DdpConfig},
///     systems::Particle2d,
/// };
/// use nalgebra::{DMatrix, DVector};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cost = LqCost::new(
///     Euclidean::new(4),
///     DMatrix::identity(4, 4) * 0.01,
///     DMatrix::identity(2, 2) * 0.1,
///     DMatrix::identity(4, 4),
///     DVector::zeros(4),
/// )?;
/// let x0 = DVector::from_vec(vec![-1.0, 2.0, 0.0, 0.0]);
/// let trajectory = Trajectory::new(
///     uniform_times(0.0, 5.0, 20),
///     vec![x0; 21],
///     vec![DVector::zeros(2); 20],
/// )?;
/// let mut ddp = Ddp::new(Particle2d::new(), cost, trajectory, DVector::zeros(0), DdpConfig::new())?;
/// let summary = ddp.solve();
/// assert!(summary.converged());
/// # Ok(())
/// # }
/// ```
pub struct Ddp<S: System, C: Cost<S::Manifold>> {
    system: S,
    cost: C,
    config: DdpConfig,
    trajectory: Trajectory<Point<S>>,
    p: DVector<f64>,
    regularization: Regularization,
    current_cost: f64,
    iteration: usize,
    estimation: Option<ParameterEstimation>,
    observers: ObserverVec<Point<S>>,
}

impl<S: System, C: Cost<S::Manifold>> Ddp<S, C> {
    /// Build the solver and roll the initial controls out from `trajectory.xs[0]`.
    ///
    /// The states stored in `trajectory` beyond the first are replaced by the
    /// rollout, so the nominal trajectory is dynamically consistent from the start.
    ///
    /// # Errors
    /// - `OptimizerError::InvalidParameters` for an invalid config, a control
    ///   dimension that does not match the system, or a short / non-finite `p`
    /// - `OptimizerError::Core` for inconsistent trajectory containers
    /// - `OptimizerError::NonFiniteState` / `NonFiniteCost` if the initial
    ///   rollout is unusable
    pub fn new(
        system: S,
        cost: C,
        trajectory: Trajectory<Point<S>>,
        p: DVector<f64>,
        config: DdpConfig,
    ) -> OptimizerResult<Self> {
        config.validate()?;
        let Trajectory { ts, xs, us } = trajectory;
        let trajectory = Trajectory::new(ts, xs, us)?;

        if trajectory.control_dim() != system.control_dim() {
            return Err(OptimizerError::InvalidParameters(format!(
                "controls have length {}, system expects {}",
                trajectory.control_dim(),
                system.control_dim()
            ))
            .log());
        }
        if p.len() < system.parameter_dim() {
            return Err(OptimizerError::InvalidParameters(format!(
                "parameter vector has length {}, system reads {}",
                p.len(),
                system.parameter_dim()
            ))
            .log());
        }
        if p.iter().any(|v| !v.is_finite()) {
            return Err(
                OptimizerError::InvalidParameters("parameter vector is not finite".into()).log(),
            );
        }
        if !system.manifold().is_finite(&trajectory.xs[0]) {
            return Err(OptimizerError::NonFiniteState.log());
        }

        let xs = rollout(&system, &trajectory.ts, &trajectory.xs[0], &trajectory.us, &p);
        let trajectory = Trajectory {
            ts: trajectory.ts,
            xs,
            us: trajectory.us,
        };
        let current_cost = trajectory_cost::<S::Manifold, C>(
            &cost,
            &trajectory.ts,
            &trajectory.xs,
            &trajectory.us,
            &p,
        );
        if !current_cost.is_finite() {
            return Err(OptimizerError::NonFiniteCost(current_cost).log());
        }

        let regularization =
            Regularization::new(config.mu, config.mu_min, config.mu_max, config.dmu0);

        Ok(Self {
            system,
            cost,
            config,
            trajectory,
            p,
            regularization,
            current_cost,
            iteration: 0,
            estimation: None,
            observers: ObserverVec::new(),
        })
    }

    pub(crate) fn enable_parameter_estimation(&mut self, active: Vec<usize>) {
        self.estimation = Some(ParameterEstimation {
            active,
            solver: DenseCholeskySolver::new(),
        });
    }

    pub(crate) fn active_parameters(&self) -> &[usize] {
        self.estimation
            .as_ref()
            .map(|estimation| estimation.active.as_slice())
            .unwrap_or(&[])
    }

    /// Add an observer notified after every accepted iteration.
    pub fn add_observer(&mut self, observer: impl TrajectoryObserver<Point<S>> + 'static) {
        self.observers.add(observer);
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn cost_function(&self) -> &C {
        &self.cost
    }

    pub fn config(&self) -> &DdpConfig {
        &self.config
    }

    pub fn trajectory(&self) -> &Trajectory<Point<S>> {
        &self.trajectory
    }

    pub fn parameters(&self) -> &DVector<f64> {
        &self.p
    }

    /// Cost of the nominal trajectory.
    pub fn current_cost(&self) -> f64 {
        self.current_cost
    }

    /// Current regularization.
    pub fn mu(&self) -> f64 {
        self.regularization.mu()
    }

    /// Number of `iterate()` calls so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Owned copy of `(ts, xs, us, p)`.
    pub fn snapshot(&self) -> TrajectorySnapshot<Point<S>> {
        TrajectorySnapshot {
            ts: self.trajectory.ts.clone(),
            xs: self.trajectory.xs.clone(),
            us: self.trajectory.us.clone(),
            p: self.p.clone(),
        }
    }

    pub fn into_trajectory(self) -> Trajectory<Point<S>> {
        self.trajectory
    }

    pub fn into_parts(self) -> (Trajectory<Point<S>>, DVector<f64>) {
        (self.trajectory, self.p)
    }

    /// Backward recursion with regularization `mu`.
    ///
    /// Returns `None` as soon as a regularized control Hessian is not positive definite.
    fn backward_pass(
        &self,
        steps: &[StepModel],
        terminal: &CostExpansion,
        mu: f64,
    ) -> Option<Policy> {
        let horizon = steps.len();
        let mut vx = terminal.lx.clone();
        let mut vxx = terminal.lxx.clone();
        let mut sensitivity = self
            .estimation
            .as_ref()
            .map(|_| ParameterSensitivity::terminal(terminal));

        let mut feedforward = vec![DVector::zeros(0); horizon];
        let mut gains = vec![DMatrix::zeros(0, 0); horizon];
        let mut parameter_gains = if sensitivity.is_some() {
            vec![DMatrix::zeros(0, 0); horizon]
        } else {
            Vec::new()
        };
        let mut dv1 = 0.0;
        let mut dv2 = 0.0;

        for k in (0..horizon).rev() {
            let StepModel { dynamics, cost } = &steps[k];
            let a = &dynamics.a;
            let b = &dynamics.b;
            let at = a.transpose();
            let bt = b.transpose();

            let vxx_a = &vxx * a;
            let vxx_b = &vxx * b;
            let qx = &cost.lx + &at * &vx;
            let qu = &cost.lu + &bt * &vx;
            let qxx = &cost.lxx + &at * &vxx_a;
            let quu = &cost.luu + &bt * &vxx_b;
            let qux = cost.lxu.transpose() + &bt * &vxx_a;

            let control_dim = qu.len();
            let quu_reg = &quu + DMatrix::identity(control_dim, control_dim) * mu;
            let quu_reg = (&quu_reg + quu_reg.transpose()) * 0.5;
            let factor = quu_reg.cholesky()?;

            let kff = -factor.solve(&qu);
            let gain = -factor.solve(&qux);

            if let Some(sensitivity) = sensitivity.as_mut() {
                let stage = StageQuadratic {
                    a,
                    b,
                    c: &dynamics.c,
                    expansion: cost,
                    vx: &vx,
                    vxx: &vxx,
                    qu: &qu,
                    quu: &quu,
                    qux: &qux,
                    feedforward: &kff,
                    gain: &gain,
                };
                parameter_gains[k] = sensitivity.step_back(&stage, &factor);
            }

            let gain_t = gain.transpose();
            let qux_t = qux.transpose();
            let quu_kff = &quu * &kff;
            vx = &qx + &gain_t * &quu_kff + &gain_t * &qu + &qux_t * &kff;
            let next_vxx = &qxx + &gain_t * &quu * &gain + &gain_t * &qux + &qux_t * &gain;
            vxx = (&next_vxx + next_vxx.transpose()) * 0.5;

            dv1 += kff.dot(&qu);
            dv2 += 0.5 * kff.dot(&quu_kff);

            feedforward[k] = kff;
            gains[k] = gain;
        }

        Some(Policy {
            feedforward,
            gains,
            parameter_gains,
            dv1,
            dv2,
            root_sensitivity: sensitivity,
        })
    }

    /// Roll out the policy with step factor `alpha`.
    fn forward_pass(
        &self,
        policy: &Policy,
        alpha: f64,
        parameter_step: Option<&DVector<f64>>,
    ) -> Rollout<Point<S>> {
        let manifold = self.system.manifold();
        let nominal = &self.trajectory;
        let horizon = nominal.horizon();

        let dp = parameter_step.map(|dp| dp * alpha);
        let p = match &dp {
            Some(dp) => &self.p + dp,
            None => self.p.clone(),
        };
        if p.iter().any(|v| !v.is_finite()) {
            return Rollout::NonFinite;
        }

        let mut xs = Vec::with_capacity(horizon + 1);
        let mut us = Vec::with_capacity(horizon);
        xs.push(nominal.xs[0].clone());

        for k in 0..horizon {
            let dx = manifold.difference(&nominal.xs[k], &xs[k]);
            let mut u = &nominal.us[k] + &policy.feedforward[k] * alpha + &policy.gains[k] * dx;
            if let Some(dp) = &dp
                && let Some(parameter_gain) = policy.parameter_gains.get(k)
            {
                u += parameter_gain * dp;
            }
            if u.iter().any(|v| !v.is_finite()) {
                return Rollout::NonFinite;
            }

            let next = self
                .system
                .step(nominal.ts[k], &xs[k], &u, nominal.step_size(k), &p, None);
            if !manifold.is_finite(&next) {
                return Rollout::NonFinite;
            }
            xs.push(next);
            us.push(u);
        }

        let cost = trajectory_cost::<S::Manifold, C>(&self.cost, &nominal.ts, &xs, &us, &p);
        if !cost.is_finite() {
            return Rollout::NonFinite;
        }
        Rollout::Finite { xs, us, p, cost }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_report(
        &self,
        iter_start: Instant,
        outcome: IterationOutcome,
        cost_before: f64,
        predicted_decrease: f64,
        step_size: f64,
        line_search_steps: usize,
        parameters_frozen: bool,
        parameter_step_norm: f64,
    ) -> IterationReport {
        IterationReport {
            iteration: self.iteration,
            outcome,
            cost_before,
            cost_after: self.current_cost,
            predicted_decrease,
            actual_decrease: cost_before - self.current_cost,
            step_size,
            mu: self.regularization.mu(),
            line_search_steps,
            parameters_frozen,
            parameter_step_norm,
            iter_time_ms: iter_start.elapsed().as_secs_f64() * 1000.0,
        }
    }

    /// One backward pass, convergence check and line-searched forward pass.
    ///
    /// The nominal trajectory (and `p` for [`PDdp`](crate::optimizer::PDdp)) is
    /// replaced only when the outcome is accepted.
    pub fn iterate(&mut self) -> IterationReport {
        let iter_start = Instant::now();
        self.iteration += 1;
        let cost_before = self.current_cost;

        let (steps, terminal) = linearize(&self.system, &self.cost, &self.trajectory, &self.p);

        // Regularize until every control Hessian is positive definite
        let policy = loop {
            if let Some(policy) = self.backward_pass(&steps, &terminal, self.regularization.mu()) {
                break policy;
            }
            if !self.regularization.increase() {
                warn!(
                    "Regularization exceeded its bound ({:.2e} > {:.2e}) in the backward pass",
                    self.regularization.mu(),
                    self.regularization.mu_max()
                );
                return self.create_report(
                    iter_start,
                    IterationOutcome::Diverged,
                    cost_before,
                    0.0,
                    0.0,
                    0,
                    false,
                    0.0,
                );
            }
        };

        let mut dv1 = policy.dv1;
        let mut dv2 = policy.dv2;
        let mut parameters_frozen = false;
        let parameter_step = match (&policy.root_sensitivity, &self.estimation) {
            (Some(sensitivity), Some(estimation)) => {
                match solve_parameter_step(
                    sensitivity,
                    self.regularization.mu(),
                    &estimation.active,
                    &estimation.solver,
                ) {
                    Some(dp) => {
                        dv1 += sensitivity.vp.dot(&dp);
                        dv2 += 0.5 * dp.dot(&(&sensitivity.vpp * &dp));
                        Some(dp)
                    }
                    None => {
                        parameters_frozen = true;
                        None
                    }
                }
            }
            _ => None,
        };
        let parameter_step_norm = parameter_step.as_ref().map_or(0.0, |dp| dp.norm());

        // CRITERION: predicted full-step decrease below tolerance
        let predicted = -(dv1 + dv2);
        if predicted <= self.config.tolerance * (1.0 + cost_before.abs()) {
            return self.create_report(
                iter_start,
                IterationOutcome::Converged,
                cost_before,
                predicted,
                0.0,
                0,
                parameters_frozen,
                0.0,
            );
        }

        let mut alpha = 1.0;
        let mut shrunk_after_non_finite = false;
        for attempt in 1..=self.config.max_line_search_steps {
            let expected = -(alpha * dv1 + alpha * alpha * dv2);
            match self.forward_pass(&policy, alpha, parameter_step.as_ref()) {
                // One shorter step before giving up on the iteration
                Rollout::NonFinite
                    if !shrunk_after_non_finite && attempt < self.config.max_line_search_steps =>
                {
                    debug!(
                        "Non-finite rollout at alpha = {:.3e}; retrying with a shorter step",
                        alpha
                    );
                    shrunk_after_non_finite = true;
                }
                Rollout::NonFinite => {
                    warn!(
                        "Non-finite rollout at alpha = {:.3e}; keeping the previous trajectory",
                        alpha
                    );
                    let outcome = if self.regularization.increase() {
                        IterationOutcome::NonFinite
                    } else {
                        IterationOutcome::Diverged
                    };
                    return self.create_report(
                        iter_start,
                        outcome,
                        cost_before,
                        expected,
                        alpha,
                        attempt,
                        parameters_frozen,
                        0.0,
                    );
                }
                Rollout::Finite { xs, us, p, cost } => {
                    let actual = cost_before - cost;
                    let accepted = if expected > 0.0 {
                        actual / expected >= self.config.armijo_ratio
                    } else {
                        cost < cost_before
                    };

                    if accepted {
                        self.trajectory.xs = xs;
                        self.trajectory.us = us;
                        self.p = p;
                        self.current_cost = cost;
                        self.regularization.decrease();

                        if !self.observers.is_empty() {
                            self.observers
                                .set_iteration_metrics(cost, self.regularization.mu(), alpha);
                            self.observers.notify(&self.snapshot(), self.iteration);
                        }

                        let outcome = if parameters_frozen {
                            IterationOutcome::ParametersFrozen
                        } else {
                            IterationOutcome::Accepted
                        };
                        return self.create_report(
                            iter_start,
                            outcome,
                            cost_before,
                            expected,
                            alpha,
                            attempt,
                            parameters_frozen,
                            alpha * parameter_step_norm,
                        );
                    }
                }
            }
            alpha *= self.config.line_search_factor;
        }

        let last_alpha = alpha / self.config.line_search_factor;
        let outcome = if self.regularization.increase() {
            IterationOutcome::Rejected
        } else {
            warn!(
                "Regularization exceeded its bound ({:.2e} > {:.2e}) after a failed line search",
                self.regularization.mu(),
                self.regularization.mu_max()
            );
            IterationOutcome::Diverged
        };
        self.create_report(
            iter_start,
            outcome,
            cost_before,
            -(last_alpha * dv1 + last_alpha * last_alpha * dv2),
            last_alpha,
            self.config.max_line_search_steps,
            parameters_frozen,
            0.0,
        )
    }

    /// Iterate until convergence, divergence or `max_iterations` forward passes.
    pub fn solve(&mut self) -> DdpSummary {
        let start_time = Instant::now();
        let initial_cost = self.current_cost;
        let mut successful_steps = 0;
        let mut unsuccessful_steps = 0;
        let mut frozen_parameter_steps = 0;
        let mut iteration_history = Vec::new();
        let mut status = SolverStatus::MaxIterationsReached;

        if tracing::enabled!(tracing::Level::DEBUG) {
            self.config.print_configuration();
            IterationReport::print_header();
        }

        while successful_steps + unsuccessful_steps < self.config.max_iterations {
            let report = self.iterate();
            if tracing::enabled!(tracing::Level::DEBUG) {
                report.print_line();
            }

            let outcome = report.outcome;
            iteration_history.push(report);
            match outcome {
                IterationOutcome::Converged => {
                    status = SolverStatus::Converged;
                    break;
                }
                IterationOutcome::Diverged => {
                    unsuccessful_steps += 1;
                    status = SolverStatus::Diverged;
                    break;
                }
                IterationOutcome::Accepted => successful_steps += 1,
                IterationOutcome::ParametersFrozen => {
                    successful_steps += 1;
                    frozen_parameter_steps += 1;
                }
                IterationOutcome::Rejected | IterationOutcome::NonFinite => {
                    unsuccessful_steps += 1
                }
            }
        }

        let iterations = successful_steps + unsuccessful_steps;
        let total_time = start_time.elapsed();
        let summary = DdpSummary {
            status,
            initial_cost,
            final_cost: self.current_cost,
            iterations,
            successful_steps,
            unsuccessful_steps,
            frozen_parameter_steps,
            final_mu: self.regularization.mu(),
            total_time,
            average_time_per_iteration: if iterations > 0 {
                total_time / iterations as u32
            } else {
                Duration::from_secs(0)
            },
            iteration_history,
        };

        info!(
            "DDP finished: {} after {} iterations, cost {:.6e} -> {:.6e}",
            summary.status, summary.iterations, summary.initial_cost, summary.final_cost
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("{}", summary);
        }
        summary
    }
}
