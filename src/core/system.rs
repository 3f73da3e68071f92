use nalgebra::{DMatrix, DVector};

use crate::manifold::Manifold;

/// Point type of a system's state manifold.
pub type Point<S> = <<S as System>::Manifold as Manifold>::Point;

/// Linearization of one dynamics step in tangent coordinates.
///
/// - `a = ∂x'/∂x` (state dim × state dim)
/// - `b = ∂x'/∂u` (state dim × control dim)
/// - `c = ∂x'/∂p` (state dim × parameter vector length)
///
/// The caller sizes and zeroes the matrices. Systems that only depend on a leading
/// block of `p` fill the matching columns of `c` and leave the rest at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StepJacobians {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
}

impl StepJacobians {
    pub fn zeros(state_dim: usize, control_dim: usize, parameter_dim: usize) -> Self {
        Self {
            a: DMatrix::zeros(state_dim, state_dim),
            b: DMatrix::zeros(state_dim, control_dim),
            c: DMatrix::zeros(state_dim, parameter_dim),
        }
    }
}

/// Discrete-time dynamics `x' = Step(t, x, u, h, p)`.
///
/// Implementations are pure functions of their arguments. They do not signal
/// failure; a blow-up shows up as non-finite states, which the optimizers detect.
pub trait System: Send + Sync {
    /// State space
    type Manifold: Manifold;

    fn manifold(&self) -> &Self::Manifold;

    /// Length of the control vector.
    fn control_dim(&self) -> usize;

    /// Number of leading entries of `p` the dynamics read.
    fn parameter_dim(&self) -> usize {
        0
    }

    /// Advance `x` by `h` seconds under control `u`, starting at time `t`.
    ///
    /// # Arguments
    /// * `jacobians` - Optional pre-sized output for `A`, `B`, `C`
    fn step(
        &self,
        t: f64,
        x: &<Self::Manifold as Manifold>::Point,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        jacobians: Option<&mut StepJacobians>,
    ) -> <Self::Manifold as Manifold>::Point;
}

impl<S: System + ?Sized> System for &S {
    type Manifold = S::Manifold;

    fn manifold(&self) -> &Self::Manifold {
        (**self).manifold()
    }

    fn control_dim(&self) -> usize {
        (**self).control_dim()
    }

    fn parameter_dim(&self) -> usize {
        (**self).parameter_dim()
    }

    fn step(
        &self,
        t: f64,
        x: &<S::Manifold as Manifold>::Point,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        jacobians: Option<&mut StepJacobians>,
    ) -> <S::Manifold as Manifold>::Point {
        (**self).step(t, x, u, h, p, jacobians)
    }
}

/// Integrate the controls from `x0` through `ts`, returning all `ts.len()` states.
pub fn rollout<S: System>(
    system: &S,
    ts: &[f64],
    x0: &Point<S>,
    us: &[DVector<f64>],
    p: &DVector<f64>,
) -> Vec<Point<S>> {
    let mut xs = Vec::with_capacity(us.len() + 1);
    xs.push(x0.clone());
    for (k, u) in us.iter().enumerate() {
        let next = system.step(ts[k], &xs[k], u, ts[k + 1] - ts[k], p, None);
        xs.push(next);
    }
    xs
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Compare analytic step Jacobians against central differences.
    ///
    /// Returns the largest absolute deviation over `A`, `B` and `C`.
    pub fn max_jacobian_error<S: System>(
        system: &S,
        t: f64,
        x: &Point<S>,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
    ) -> f64 {
        let manifold = system.manifold();
        let n = manifold.dim();
        let c = u.len();
        let np = p.len();
        let mut jac = StepJacobians::zeros(n, c, np);
        let nominal = system.step(t, x, u, h, p, Some(&mut jac));
        let eps = 1e-6;
        let mut worst: f64 = 0.0;

        for j in 0..n {
            let mut delta = DVector::zeros(n);
            delta[j] = eps;
            let plus = system.step(t, &manifold.retract(x, &delta), u, h, p, None);
            let minus = system.step(t, &manifold.retract(x, &(-&delta)), u, h, p, None);
            let column =
                (manifold.difference(&nominal, &plus) - manifold.difference(&nominal, &minus))
                    / (2.0 * eps);
            worst = worst.max((column - jac.a.column(j)).amax());
        }
        for j in 0..c {
            let mut du = DVector::zeros(c);
            du[j] = eps;
            let plus = system.step(t, x, &(u + &du), h, p, None);
            let minus = system.step(t, x, &(u - &du), h, p, None);
            let column =
                (manifold.difference(&nominal, &plus) - manifold.difference(&nominal, &minus))
                    / (2.0 * eps);
            worst = worst.max((column - jac.b.column(j)).amax());
        }
        for j in 0..np {
            let mut dp = DVector::zeros(np);
            dp[j] = eps;
            let plus = system.step(t, x, u, h, &(p + &dp), None);
            let minus = system.step(t, x, u, h, &(p - &dp), None);
            let column =
                (manifold.difference(&nominal, &plus) - manifold.difference(&nominal, &minus))
                    / (2.0 * eps);
            worst = worst.max((column - jac.c.column(j)).amax());
        }
        worst
    }
}
