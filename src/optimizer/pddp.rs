//! Parameter-augmented DDP.
//!
//! The backward pass carries the sensitivity of the cost-to-go to a static
//! parameter vector `p` shared by the whole horizon:
//!
//! ```text
//! Qp  = Lp  + Vp' + Cᵀ Vx'
//! Qpx = Lpx + Cᵀ Vxx' A + Vpx' A
//! Qpu =       Cᵀ Vxx' B + Vpx' B
//! Qpp = Lpp + Vpp' + Cᵀ Vxx' C + Cᵀ Vpx'ᵀ + Vpx' C
//! E   = -(Quu + μI)⁻¹ Qup
//! ```
//!
//! Eliminating the controls step by step leaves `(Vp₀, Vpp₀)` at the fixed
//! initial state, which is the Schur complement of the joint (control,
//! parameter) system. Solving `(Vpp₀ + μI) dp = -Vp₀` gives the parameter step,
//! which the forward pass applies together with the control update
//! `u' = u + α k + K δx + E α dp`.
//!
//! When `Vpp₀` restricted to the active parameters is not positive definite the
//! iteration proceeds with `p` frozen and reports
//! [`IterationOutcome::ParametersFrozen`](crate::optimizer::IterationOutcome::ParametersFrozen).

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use tracing::warn;

use crate::{
    core::{Cost, CostExpansion, Point, System, Trajectory},
    linalg::{DenseCholeskySolver, DenseLinearSolver},
    observers::{TrajectoryObserver, TrajectorySnapshot},
    optimizer::{
        DdpConfig, DdpSummary, IterationReport, OptimizerError, OptimizerResult, ddp::Ddp,
    },
};

/// Value-function derivatives with respect to `p` at one time step.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParameterSensitivity {
    pub vp: DVector<f64>,
    pub vpp: DMatrix<f64>,
    /// ∂²V/∂p∂x (parameter dim × state dim)
    pub vpx: DMatrix<f64>,
}

/// Quantities of one backward step the parameter recursion needs.
pub(crate) struct StageQuadratic<'a> {
    pub a: &'a DMatrix<f64>,
    pub b: &'a DMatrix<f64>,
    pub c: &'a DMatrix<f64>,
    pub expansion: &'a CostExpansion,
    /// Value gradient and Hessian of the next step
    pub vx: &'a DVector<f64>,
    pub vxx: &'a DMatrix<f64>,
    pub qu: &'a DVector<f64>,
    pub quu: &'a DMatrix<f64>,
    pub qux: &'a DMatrix<f64>,
    pub feedforward: &'a DVector<f64>,
    pub gain: &'a DMatrix<f64>,
}

impl ParameterSensitivity {
    pub(crate) fn terminal(expansion: &CostExpansion) -> Self {
        Self {
            vp: expansion.lp.clone(),
            vpp: expansion.lpp.clone(),
            vpx: expansion.lpx.clone(),
        }
    }

    /// Move the sensitivity one step back in time and return the parameter gain `E`.
    pub(crate) fn step_back(
        &mut self,
        stage: &StageQuadratic<'_>,
        quu_reg: &Cholesky<f64, Dyn>,
    ) -> DMatrix<f64> {
        let ct = stage.c.transpose();
        let ct_vxx = &ct * stage.vxx;

        let qp = &stage.expansion.lp + &self.vp + &ct * stage.vx;
        let qpx = &stage.expansion.lpx + &ct_vxx * stage.a + &self.vpx * stage.a;
        let qpu = &ct_vxx * stage.b + &self.vpx * stage.b;
        let qpp = &stage.expansion.lpp
            + &self.vpp
            + &ct_vxx * stage.c
            + &ct * self.vpx.transpose()
            + &self.vpx * stage.c;

        let qup = qpu.transpose();
        let e = -quu_reg.solve(&qup);
        let et = e.transpose();
        let et_quu = &et * stage.quu;

        self.vp = qp + &et_quu * stage.feedforward + &et * stage.qu + &qpu * stage.feedforward;
        self.vpx = qpx + &et_quu * stage.gain + &et * stage.qux + &qpu * stage.gain;
        let vpp = qpp + &et_quu * &e + &et * &qup + &qpu * &e;
        self.vpp = (&vpp + vpp.transpose()) * 0.5;

        e
    }
}

/// Solve `(Vpp₀ + μI) dp = -Vp₀` over the `active` parameter indices.
///
/// Returns `None` when the reduced system is not positive definite.
pub(crate) fn solve_parameter_step(
    sensitivity: &ParameterSensitivity,
    mu: f64,
    active: &[usize],
    solver: &DenseCholeskySolver,
) -> Option<DVector<f64>> {
    let mut dp = DVector::zeros(sensitivity.vp.len());
    if active.is_empty() {
        return Some(dp);
    }

    let m = active.len();
    let vpp = DMatrix::from_fn(m, m, |i, j| sensitivity.vpp[(active[i], active[j])]);
    let rhs = DVector::from_fn(m, |i, _| -sensitivity.vp[active[i]]);

    match solver.solve_damped(&vpp, &rhs, mu) {
        Ok(step) => {
            for (i, &index) in active.iter().enumerate() {
                dp[index] = step[i];
            }
            Some(dp)
        }
        Err(e) => {
            warn!("Parameter Hessian is singular, freezing parameters: {}", e);
            None
        }
    }
}

/// DDP that jointly optimizes the trajectory and a static parameter vector.
///
/// All parameters are active by default. The receding-horizon harness restricts
/// the active set to the entries that actually influence the current window,
/// leaving the rest untouched.
pub struct PDdp<S: System, C: Cost<S::Manifold>> {
    inner: Ddp<S, C>,
}

impl<S: System, C: Cost<S::Manifold>> PDdp<S, C> {
    /// Build the solver and roll the initial controls out from `trajectory.xs[0]`.
    ///
    /// # Errors
    /// Same as [`Ddp::new`].
    pub fn new(
        system: S,
        cost: C,
        trajectory: Trajectory<Point<S>>,
        p: DVector<f64>,
        config: DdpConfig,
    ) -> OptimizerResult<Self> {
        let mut inner = Ddp::new(system, cost, trajectory, p, config)?;
        let all = (0..inner.parameters().len()).collect();
        inner.enable_parameter_estimation(all);
        Ok(Self { inner })
    }

    /// Restrict estimation to the given parameter indices.
    ///
    /// # Errors
    /// `OptimizerError::InvalidParameters` if an index is out of range.
    pub fn set_active_parameters(&mut self, mut indices: Vec<usize>) -> OptimizerResult<()> {
        let np = self.inner.parameters().len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= np) {
            return Err(OptimizerError::InvalidParameters(format!(
                "active parameter index {} out of range for {} parameters",
                bad, np
            ))
            .log());
        }
        indices.sort_unstable();
        indices.dedup();
        self.inner.enable_parameter_estimation(indices);
        Ok(())
    }

    pub fn active_parameters(&self) -> &[usize] {
        self.inner.active_parameters()
    }

    /// One joint backward/forward pass; see [`Ddp::iterate`].
    pub fn iterate(&mut self) -> IterationReport {
        self.inner.iterate()
    }

    /// Iterate until convergence, divergence or the iteration budget.
    pub fn solve(&mut self) -> DdpSummary {
        self.inner.solve()
    }

    pub fn add_observer(&mut self, observer: impl TrajectoryObserver<Point<S>> + 'static) {
        self.inner.add_observer(observer);
    }

    pub fn trajectory(&self) -> &Trajectory<Point<S>> {
        self.inner.trajectory()
    }

    pub fn parameters(&self) -> &DVector<f64> {
        self.inner.parameters()
    }

    pub fn current_cost(&self) -> f64 {
        self.inner.current_cost()
    }

    pub fn mu(&self) -> f64 {
        self.inner.mu()
    }

    pub fn config(&self) -> &DdpConfig {
        self.inner.config()
    }

    pub fn snapshot(&self) -> TrajectorySnapshot<Point<S>> {
        self.inner.snapshot()
    }

    /// Optimized trajectory and parameters.
    pub fn into_parts(self) -> (Trajectory<Point<S>>, DVector<f64>) {
        self.inner.into_parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::uniform_times,
        costs::LqCost,
        manifold::{Euclidean, LieGroup, LieGroupManifold, SO3},
        optimizer::IterationOutcome,
        systems::{Attitude3d, Particle2d},
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_solve_parameter_step_scatters_active_entries() -> TestResult {
        let sensitivity = ParameterSensitivity {
            vp: DVector::from_vec(vec![2.0, 7.0, -4.0]),
            vpp: DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 0.0, 4.0])),
            vpx: DMatrix::zeros(3, 1),
        };
        let solver = DenseCholeskySolver::new();
        let dp = solve_parameter_step(&sensitivity, 0.0, &[0, 2], &solver)
            .ok_or("expected a parameter step")?;
        assert!((dp[0] + 1.0).abs() < 1e-12);
        assert_eq!(dp[1], 0.0);
        assert!((dp[2] - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_solve_parameter_step_reports_singular_system() {
        let sensitivity = ParameterSensitivity {
            vp: DVector::from_vec(vec![1.0, 1.0]),
            vpp: DMatrix::zeros(2, 2),
            vpx: DMatrix::zeros(2, 1),
        };
        let solver = DenseCholeskySolver::new();
        assert!(solve_parameter_step(&sensitivity, 0.0, &[0, 1], &solver).is_none());
    }

    /// Parameters that neither the dynamics nor the cost read leave `Vpp₀` at zero.
    #[test]
    fn test_pddp_freezes_unobservable_parameters() -> TestResult {
        let system = Particle2d::new();
        let cost = LqCost::new(
            Euclidean::new(4),
            DMatrix::identity(4, 4) * 0.01,
            DMatrix::identity(2, 2) * 0.1,
            DMatrix::identity(4, 4),
            DVector::zeros(4),
        )?;
        let n = 8;
        let trajectory = Trajectory::new(
            uniform_times(0.0, 4.0, n),
            vec![DVector::from_vec(vec![1.0, -1.0, 0.0, 0.0]); n + 1],
            vec![DVector::zeros(2); n],
        )?;
        let mut pddp = PDdp::new(system, cost, trajectory, DVector::zeros(2), DdpConfig::new())?;
        let report = pddp.iterate();
        assert!(report.parameters_frozen);
        assert_eq!(report.outcome, IterationOutcome::ParametersFrozen);
        assert_eq!(pddp.parameters(), &DVector::zeros(2));
        assert!(report.cost_after < report.cost_before);
        Ok(())
    }

    #[test]
    fn test_pddp_rejects_out_of_range_active_index() -> TestResult {
        let system = Attitude3d::new();
        let cost = LqCost::new(
            LieGroupManifold::<SO3>::new(),
            DMatrix::identity(3, 3),
            DMatrix::identity(3, 3),
            DMatrix::identity(3, 3),
            SO3::identity(),
        )?;
        let trajectory = Trajectory::new(
            uniform_times(0.0, 1.0, 4),
            vec![SO3::identity(); 5],
            vec![DVector::zeros(3); 4],
        )?;
        let mut pddp = PDdp::new(system, cost, trajectory, DVector::zeros(3), DdpConfig::new())?;
        assert!(pddp.set_active_parameters(vec![0, 3]).is_err());
        pddp.set_active_parameters(vec![2, 0, 2])?;
        assert_eq!(pddp.active_parameters(), &[0, 2]);
        Ok(())
    }
}
